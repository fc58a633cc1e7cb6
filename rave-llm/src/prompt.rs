//! Prompt templating
//!
//! Placeholders are `{identifier}`. Any other brace sequence (JSON examples
//! embedded in instructions, for instance) is left alone.

use once_cell::sync::Lazy;
use rave_core::{PromptError, RaveResult};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
});

/// Substitution values for a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVars {
    values: BTreeMap<String, String>,
}

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a literal string value.
    pub fn text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert a value rendered as pretty-printed JSON.
    pub fn json<T: Serialize + ?Sized>(self, key: impl Into<String>, value: &T) -> RaveResult<Self> {
        let key = key.into();
        let rendered = serde_json::to_string_pretty(value).map_err(|e| PromptError::Serialization {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.text(key, rendered))
    }

    /// Insert a bullet list, one item per line. An empty list renders as `- none`.
    pub fn list<I, S>(self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<String> = items
            .into_iter()
            .map(|item| format!("- {}", item.as_ref()))
            .collect();
        let rendered = if lines.is_empty() {
            "- none".to_string()
        } else {
            lines.join("\n")
        };
        self.text(key, rendered)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for PromptVars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// An instruction template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Distinct placeholder names, in order of first use.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.template) {
            let name = &caps[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Replace every known placeholder; unknown ones are left verbatim.
    pub fn render(&self, vars: &PromptVars) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Like `render`, but fails listing every placeholder without a value.
    pub fn render_strict(&self, vars: &PromptVars) -> RaveResult<String> {
        let missing: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| vars.get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingPlaceholders { names: missing }.into());
        }
        Ok(self.render(vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rave_core::RaveError;

    #[test]
    fn test_render_substitutes_placeholder() {
        let template = PromptTemplate::new("Count: {n}");
        let vars = PromptVars::new().text("n", "42");
        assert_eq!(template.render(&vars), "Count: 42");
    }

    #[test]
    fn test_lenient_render_leaves_unknown_placeholders() {
        let template = PromptTemplate::new("{known} and {unknown}");
        let vars = PromptVars::new().text("known", "yes");
        assert_eq!(template.render(&vars), "yes and {unknown}");
    }

    #[test]
    fn test_strict_render_lists_missing_names() {
        let template = PromptTemplate::new("{a} {b} {a} {c}");
        let vars = PromptVars::new().text("b", "x");
        match template.render_strict(&vars) {
            Err(RaveError::Prompt(PromptError::MissingPlaceholders { names })) => {
                assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_json_braces_are_not_placeholders() {
        let template =
            PromptTemplate::new("Reply as {\"recommendation\": \"...\"} using {stats}");
        assert_eq!(template.placeholders(), vec!["stats".to_string()]);
        let vars = PromptVars::new().text("stats", "3 rows");
        assert_eq!(
            template.render_strict(&vars).unwrap(),
            "Reply as {\"recommendation\": \"...\"} using 3 rows"
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let template = PromptTemplate::new("{a}");
        let vars = PromptVars::new().text("a", "{b}").text("b", "nope");
        assert_eq!(template.render(&vars), "{b}");
    }

    #[test]
    fn test_json_and_list_helpers() {
        let vars = PromptVars::new()
            .json("stats", &serde_json::json!({"artists": 3}))
            .unwrap()
            .list("issues", ["low share rate", "no downloads"])
            .list("empty", Vec::<String>::new());
        assert_eq!(vars.get("stats"), Some("{\n  \"artists\": 3\n}"));
        assert_eq!(vars.get("issues"), Some("- low share rate\n- no downloads"));
        assert_eq!(vars.get("empty"), Some("- none"));
    }
}
