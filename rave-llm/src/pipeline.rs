//! Fan-out, extract, merge
//!
//! Turns each completion into an [`Opinion`] according to an
//! [`OpinionSpec`] and merges the opinions. A reply that cannot be turned
//! into an opinion counts as that provider failing.

use crate::consensus::{merge, Consensus, Opinion, TieBreak};
use crate::extract::{extract_object, ParseResult};
use crate::fanout::FanOut;
use crate::{ChatRequest, Completion};
use rave_core::{LlmError, ProviderFailure, RaveResult};
use serde_json::Value;

/// Where the voting label comes from.
#[derive(Clone, Copy)]
pub enum LabelSource {
    /// A string field of the reply object.
    Field(&'static str),
    /// Computed from the whole reply object.
    Derived(fn(&Value) -> String),
}

impl std::fmt::Debug for LabelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelSource::Field(name) => write!(f, "Field({})", name),
            LabelSource::Derived(_) => f.write_str("Derived"),
        }
    }
}

/// How to read an opinion out of a reply object.
#[derive(Debug, Clone)]
pub struct OpinionSpec {
    pub label: LabelSource,
    pub confidence_field: &'static str,
    /// String-array fields unioned across providers.
    pub list_fields: Vec<&'static str>,
}

impl OpinionSpec {
    pub fn field(label: &'static str) -> Self {
        Self {
            label: LabelSource::Field(label),
            confidence_field: "confidence",
            list_fields: Vec::new(),
        }
    }

    pub fn derived(label: fn(&Value) -> String) -> Self {
        Self {
            label: LabelSource::Derived(label),
            confidence_field: "confidence",
            list_fields: Vec::new(),
        }
    }

    pub fn with_lists(mut self, fields: &[&'static str]) -> Self {
        self.list_fields = fields.to_vec();
        self
    }
}

/// Read a confidence that may arrive as a number or a numeric string.
/// Missing or unreadable counts as 0.
pub fn read_confidence(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// String items of an array field; other item types are skipped.
pub fn read_strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build an opinion from one completion. The error is a human-readable
/// reason suitable for a `ProviderFailure`.
pub fn opinion_from_completion(completion: &Completion, spec: &OpinionSpec) -> Result<Opinion, String> {
    let object = match extract_object(&completion.text) {
        ParseResult::Ok(object) => object,
        ParseResult::NotFound => return Err("no JSON object in reply".to_string()),
        ParseResult::Malformed { reason, .. } => {
            return Err(format!("malformed JSON in reply: {}", reason))
        }
    };
    let payload = Value::Object(object);

    let label = match spec.label {
        LabelSource::Field(name) => match payload.get(name).and_then(Value::as_str) {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => return Err(format!("reply is missing string field '{}'", name)),
        },
        LabelSource::Derived(derive) => derive(&payload),
    };

    let confidence = read_confidence(payload.get(spec.confidence_field));
    let mut opinion = Opinion::new(completion.provider, &completion.model, label, confidence);
    for field in &spec.list_fields {
        opinion = opinion.with_list(*field, read_strings(payload.get(*field)));
    }
    Ok(opinion.with_payload(payload))
}

/// Fan out, extract every reply, and merge.
///
/// Transport and extraction failures are reported together in
/// `Consensus::failures`; if no opinion survives the result is
/// `AllProvidersFailed` listing all of them.
pub async fn ask_for_consensus(
    fanout: &FanOut,
    request: &ChatRequest,
    spec: &OpinionSpec,
) -> RaveResult<Consensus> {
    let order = fanout.providers();
    let report = fanout.run(request).await;

    let mut failures = report.failures;
    let mut opinions = Vec::with_capacity(report.completions.len());
    for completion in &report.completions {
        match opinion_from_completion(completion, spec) {
            Ok(opinion) => opinions.push(opinion),
            Err(reason) => {
                tracing::warn!(provider = %completion.provider, %reason, "reply rejected");
                failures.push(ProviderFailure::new(completion.provider, reason));
            }
        }
    }
    failures.sort_by_key(|f| order.iter().position(|k| *k == f.provider));

    match merge(&opinions, TieBreak::FirstListed) {
        Some(consensus) => Ok(consensus.with_failures(failures)),
        None => Err(LlmError::AllProvidersFailed { failures }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Scripted;
    use rave_core::{ProviderKind, RaveError};
    use serde_json::json;
    use std::time::Duration;

    fn verdict_spec() -> OpinionSpec {
        OpinionSpec::field("recommendation").with_lists(&["pros", "cons"])
    }

    fn completion(provider: ProviderKind, text: &str) -> Completion {
        Completion {
            provider,
            model: provider.default_model().to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_opinion_reads_label_confidence_and_lists() {
        let c = completion(
            ProviderKind::OpenAi,
            r#"Verdict: {"recommendation": "approve", "confidence": "0.75", "pros": ["a", 3, "b"]}"#,
        );
        let opinion = opinion_from_completion(&c, &verdict_spec()).unwrap();
        assert_eq!(opinion.recommendation, "approve");
        assert_eq!(opinion.confidence, 0.75);
        assert_eq!(opinion.supplementary["pros"], vec!["a".to_string(), "b".to_string()]);
        assert!(opinion.supplementary["cons"].is_empty());
        assert_eq!(opinion.payload["confidence"], json!("0.75"));
    }

    #[test]
    fn test_opinion_missing_confidence_is_zero() {
        let c = completion(ProviderKind::Groq, r#"{"recommendation": "review"}"#);
        assert_eq!(opinion_from_completion(&c, &verdict_spec()).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_opinion_rejects_missing_label_and_missing_json() {
        let c = completion(ProviderKind::Groq, r#"{"confidence": 0.4}"#);
        assert!(opinion_from_completion(&c, &verdict_spec())
            .unwrap_err()
            .contains("recommendation"));
        let c = completion(ProviderKind::Groq, "I cannot help with that.");
        assert_eq!(
            opinion_from_completion(&c, &verdict_spec()).unwrap_err(),
            "no JSON object in reply"
        );
    }

    #[test]
    fn test_derived_label() {
        fn shout(v: &Value) -> String {
            v["name"].as_str().unwrap_or("none").to_uppercase()
        }
        let c = completion(ProviderKind::Gemini, r#"{"name": "tresor"}"#);
        let opinion = opinion_from_completion(&c, &OpinionSpec::derived(shout)).unwrap();
        assert_eq!(opinion.recommendation, "TRESOR");
    }

    #[tokio::test]
    async fn test_one_rejects_two_agree() {
        let fanout = FanOut::new(
            vec![
                Scripted::reply(
                    ProviderKind::OpenAi,
                    r#"{"recommendation": "approve", "confidence": 0.7, "pros": ["techno"]}"#,
                ),
                Scripted::fail(
                    ProviderKind::Anthropic,
                    LlmError::Http {
                        provider: ProviderKind::Anthropic,
                        status: 429,
                        body: "rate limited".into(),
                    },
                ),
                Scripted::reply(
                    ProviderKind::Gemini,
                    r#"Sure! {"recommendation": "approve", "confidence": 0.9, "pros": ["Techno", "sets"]}"#,
                ),
            ],
            Duration::from_secs(5),
        );
        let consensus = ask_for_consensus(&fanout, &ChatRequest::new("s", "u"), &verdict_spec())
            .await
            .unwrap();
        assert_eq!(consensus.recommendation, "approve");
        assert!((consensus.confidence - 0.8).abs() < 1e-9);
        assert_eq!(
            consensus.contributors,
            vec![ProviderKind::OpenAi, ProviderKind::Gemini]
        );
        assert_eq!(consensus.failures.len(), 1);
        assert_eq!(consensus.failures[0].provider, ProviderKind::Anthropic);
        assert_eq!(
            consensus.supplementary["pros"],
            vec!["techno".to_string(), "sets".to_string()]
        );
    }

    #[tokio::test]
    async fn test_all_reject_enumerates_errors() {
        let fanout = FanOut::new(
            vec![
                Scripted::reply(ProviderKind::OpenAi, "no json here"),
                Scripted::fail(
                    ProviderKind::Anthropic,
                    LlmError::CredentialMissing {
                        provider: ProviderKind::Anthropic,
                    },
                ),
                Scripted::reply(ProviderKind::Groq, r#"{"recommendation": "approve""#),
            ],
            Duration::from_secs(5),
        );
        match ask_for_consensus(&fanout, &ChatRequest::new("s", "u"), &verdict_spec()).await {
            Err(RaveError::Llm(LlmError::AllProvidersFailed { failures })) => {
                let providers: Vec<_> = failures.iter().map(|f| f.provider).collect();
                assert_eq!(
                    providers,
                    vec![ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Groq]
                );
                assert!(failures[0].message.contains("no JSON"));
                assert!(failures[1].message.contains("No API key"));
                assert!(failures[2].message.contains("malformed"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
