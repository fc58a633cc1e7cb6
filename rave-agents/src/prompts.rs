//! Prompt templates for every agent action.
//!
//! Rendered with `render_strict`, so a missing variable is an error rather
//! than a literal `{name}` sent to a vendor.

use rave_llm::PromptTemplate;

pub const CURATOR_SYSTEM: &str = "You are an expert curator for a techno music knowledge base. \
     Answer with a single JSON object and nothing else.";

pub const DATA_ARCHITECT_SYSTEM: &str = "You are a database architect reviewing the data layer of \
     a techno music knowledge base. Answer with a single JSON object and nothing else.";

pub const ANALYST_SYSTEM: &str = "You are a product analyst for a gamified sharing feature. \
     Answer with a single JSON object and nothing else.";

pub const LIBRARIAN_SYSTEM: &str = "You are a research librarian specialised in books about \
     electronic music. Answer with a single JSON object and nothing else.";

pub const STRATEGIST_SYSTEM: &str = "You are the editorial strategist of a techno music knowledge \
     base. Answer with a single JSON object and nothing else.";

pub fn schema_health() -> PromptTemplate {
    PromptTemplate::new(
        r#"Review these table row counts:
{table_stats}

Assess overall schema health. Reply with:
{"recommendation": "healthy" | "needs_attention" | "critical", "confidence": 0.0-1.0, "summary": "...", "issues": ["..."], "recommendations": ["..."]}"#,
    )
}

pub fn same_artist() -> PromptTemplate {
    PromptTemplate::new(
        r#"Two artist records came from different sources.

Canonical record:
{left}

DJ directory record:
{right}

Are they the same artist? Reply with:
{"same_artist": true | false, "confidence": 0.0-1.0, "reasoning": "..."}"#,
    )
}

pub fn doggy_analysis() -> PromptTemplate {
    PromptTemplate::new(
        r#"Daily stats for the last {days} days, oldest first:
{stats}

Issues already detected:
{issues}

Judge the feature's health. Reply with:
{"recommendation": "healthy" | "watch" | "act", "confidence": 0.0-1.0, "summary": "...", "actions": ["..."]}"#,
    )
}

pub fn daily_summary() -> PromptTemplate {
    PromptTemplate::new(
        r#"Stats for the most recent {days} day(s):
{stats}

Write a short summary for the team. Reply with:
{"summary": "...", "highlights": ["..."], "confidence": 0.0-1.0}"#,
    )
}

pub fn book_metadata() -> PromptTemplate {
    PromptTemplate::new(
        r#"Find bibliographic metadata for this book.
Title: {title}
Author: {author}

Reply with:
{"title": "...", "author": "...", "year": 0, "publisher": "...", "isbn": "...", "description": "...", "confidence": 0.0-1.0}
Use null for anything you are not sure about."#,
    )
}

pub fn channel_evaluation() -> PromptTemplate {
    PromptTemplate::new(
        r#"Should this YouTube channel be listed in the knowledge base?
Title: {channel_title}
URL: {channel_url}
Description: {description}
Recent videos:
{recent_videos}

Reply with:
{"recommendation": "approve" | "reject" | "review", "confidence": 0.0-1.0, "pros": ["..."], "cons": ["..."]}"#,
    )
}

pub fn playbook() -> PromptTemplate {
    PromptTemplate::new(
        r#"Draft a {horizon_days}-day playbook for this goal.
Goal: {goal}
Audience: {audience}
Constraints:
{constraints}

Current content volume per table:
{table_stats}

Reply with:
{"priority": "high" | "medium" | "low", "confidence": 0.0-1.0, "summary": "...", "steps": ["..."], "risks": ["..."], "metrics": ["..."]}"#,
    )
}
