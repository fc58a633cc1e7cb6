//! Consensus across provider opinions
//!
//! Majority of successful responses, with a confidence tiebreak:
//!
//! 1. Labels are compared case-insensitively after trimming.
//! 2. All agree: that label, confidence is the mean.
//! 3. A label held by a strict majority: that label, confidence is the mean
//!    over the agreeing opinions.
//! 4. Otherwise the single most confident opinion wins outright. Equal
//!    confidence is settled by [`TieBreak`].
//!
//! Supplementary lists are unioned per key, duplicates removed
//! case-insensitively with the first spelling kept.

use rave_core::{clamp_confidence, ProviderFailure, ProviderKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// INPUT
// ============================================================================

/// One provider's structured answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub provider: ProviderKind,
    pub model: String,
    /// Categorical answer used for voting.
    pub recommendation: String,
    pub confidence: f64,
    /// Free lists (pros, cons, ...) that are unioned, never voted on.
    #[serde(default)]
    pub supplementary: BTreeMap<String, Vec<String>>,
    /// The full extracted value.
    #[serde(default)]
    pub payload: Value,
}

impl Opinion {
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        recommendation: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            recommendation: recommendation.into(),
            confidence: clamp_confidence(confidence),
            supplementary: BTreeMap::new(),
            payload: Value::Null,
        }
    }

    pub fn with_list(mut self, key: impl Into<String>, items: Vec<String>) -> Self {
        self.supplementary.insert(key.into(), items);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Voting key.
    pub fn label(&self) -> String {
        self.recommendation.trim().to_lowercase()
    }
}

/// How equal-confidence opinions are ordered when no majority exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The opinion listed first wins. Callers list opinions in configured
    /// provider order.
    #[default]
    FirstListed,
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Which rule produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    Unanimous,
    Majority,
    HighestConfidence,
}

/// Merged answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub recommendation: String,
    pub confidence: f64,
    pub agreement: Agreement,
    /// Provider whose payload was chosen.
    pub chosen: ProviderKind,
    pub chosen_model: String,
    pub payload: Value,
    pub supplementary: BTreeMap<String, Vec<String>>,
    /// Providers that produced an opinion, in input order.
    pub contributors: Vec<ProviderKind>,
    pub models: Vec<String>,
    /// Providers that failed before an opinion could be formed.
    #[serde(default)]
    pub failures: Vec<ProviderFailure>,
}

impl Consensus {
    pub fn is_unanimous(&self) -> bool {
        self.agreement == Agreement::Unanimous
    }

    /// Model name for persistence: the single model, or `consensus(a+b)`.
    pub fn model_label(&self) -> String {
        match self.models.as_slice() {
            [single] => single.clone(),
            many => format!("consensus({})", many.join("+")),
        }
    }

    pub fn with_failures(mut self, failures: Vec<ProviderFailure>) -> Self {
        self.failures = failures;
        self
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge opinions. `None` when there is nothing to merge.
pub fn merge(opinions: &[Opinion], tie: TieBreak) -> Option<Consensus> {
    if opinions.is_empty() {
        return None;
    }

    // label -> indices, labels kept in first-seen order
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, opinion) in opinions.iter().enumerate() {
        let label = opinion.label();
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(idx),
            None => groups.push((label, vec![idx])),
        }
    }

    let total = opinions.len();
    let (agreement, members, confidence) = if groups.len() == 1 {
        let members = groups.swap_remove(0).1;
        let mean = mean_confidence(opinions, &members);
        (Agreement::Unanimous, members, mean)
    } else if let Some(pos) = groups.iter().position(|(_, m)| m.len() * 2 > total) {
        let members = groups.swap_remove(pos).1;
        let mean = mean_confidence(opinions, &members);
        (Agreement::Majority, members, mean)
    } else {
        let all: Vec<usize> = (0..total).collect();
        let best = most_confident(opinions, &all, tie);
        (
            Agreement::HighestConfidence,
            vec![best],
            clamp_confidence(opinions[best].confidence),
        )
    };

    let chosen_idx = most_confident(opinions, &members, tie);
    let chosen = &opinions[chosen_idx];
    let first = &opinions[members[0]];

    let mut models: Vec<String> = Vec::new();
    for opinion in opinions {
        if !models.contains(&opinion.model) {
            models.push(opinion.model.clone());
        }
    }

    Some(Consensus {
        recommendation: first.recommendation.trim().to_string(),
        confidence,
        agreement,
        chosen: chosen.provider,
        chosen_model: chosen.model.clone(),
        payload: chosen.payload.clone(),
        supplementary: union_lists(opinions),
        contributors: opinions.iter().map(|o| o.provider).collect(),
        models,
        failures: Vec::new(),
    })
}

fn mean_confidence(opinions: &[Opinion], members: &[usize]) -> f64 {
    let sum: f64 = members
        .iter()
        .map(|&i| clamp_confidence(opinions[i].confidence))
        .sum();
    clamp_confidence(sum / members.len() as f64)
}

fn most_confident(opinions: &[Opinion], members: &[usize], tie: TieBreak) -> usize {
    let mut best = members[0];
    for &idx in &members[1..] {
        let candidate = clamp_confidence(opinions[idx].confidence);
        let current = clamp_confidence(opinions[best].confidence);
        match tie {
            // strictly greater keeps the earlier opinion on ties
            TieBreak::FirstListed => {
                if candidate > current {
                    best = idx;
                }
            }
        }
    }
    best
}

fn union_lists(opinions: &[Opinion]) -> BTreeMap<String, Vec<String>> {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for opinion in opinions {
        for (key, items) in &opinion.supplementary {
            let entry = merged.entry(key.clone()).or_default();
            for item in items {
                let trimmed = item.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let folded = trimmed.to_lowercase();
                if !entry.iter().any(|existing| existing.to_lowercase() == folded) {
                    entry.push(trimmed.to_string());
                }
            }
        }
    }
    merged
}
