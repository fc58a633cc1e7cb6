//! Enum types for RAVE entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing an enum from its database/wire string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_db_str`, `from_db_str`, `Display` and `FromStr` from a
/// single variant <-> string table.
macro_rules! db_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Convert to database string representation.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }

            /// Parse from database string representation.
            pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
                match s.trim() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(EnumParseError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_db_str())
            }
        }

        impl FromStr for $ty {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }
    };
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// AI vendor behind a chat-completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
}

db_enum!(ProviderKind, "provider", {
    OpenAi => "openai",
    Anthropic => "anthropic",
    Gemini => "gemini",
    Groq => "groq",
});

impl ProviderKind {
    /// Environment variable holding this vendor's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
        }
    }

    /// Public API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

// ============================================================================
// AGENT FUNCTIONS
// ============================================================================

/// Edge function exposed over HTTP. Each owns a fixed set of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentFunction {
    ArtistDbArchitect,
    DoggyAnalyticsInsights,
    PlaybookAgent,
    ResearchBookMetadata,
    YoutubeChannelCurator,
    AgentRuns,
}

db_enum!(AgentFunction, "agent function", {
    ArtistDbArchitect => "artist-db-architect",
    DoggyAnalyticsInsights => "doggy-analytics-insights",
    PlaybookAgent => "playbook-agent",
    ResearchBookMetadata => "research-book-metadata",
    YoutubeChannelCurator => "youtube-channel-curator",
    AgentRuns => "agent-runs",
});

// ============================================================================
// RUN / INSIGHT / ISSUE / MERGE STATUS
// ============================================================================

/// Stored status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

db_enum!(RunStatus, "run status", {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Status as observed by readers: a `running` row past its staleness
/// timeout is reported as `stale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRunStatus {
    Running,
    Completed,
    Failed,
    Stale,
}

db_enum!(EffectiveRunStatus, "effective run status", {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Stale => "stale",
});

/// What an insight row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Analysis,
    DailySummary,
    ChannelEvaluation,
    BookMetadata,
    Playbook,
}

db_enum!(InsightKind, "insight kind", {
    Analysis => "analysis",
    DailySummary => "daily_summary",
    ChannelEvaluation => "channel_evaluation",
    BookMetadata => "book_metadata",
    Playbook => "playbook",
});

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

db_enum!(IssueSeverity, "issue severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Resolution state of a merge candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Pending,
    AutoMerged,
    Approved,
    Rejected,
}

db_enum!(MergeStatus, "merge status", {
    Pending => "pending",
    AutoMerged => "auto_merged",
    Approved => "approved",
    Rejected => "rejected",
});

/// Where an artist record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistSource {
    Canonical,
    DjDirectory,
}

db_enum!(ArtistSource, "artist source", {
    Canonical => "canonical",
    DjDirectory => "dj_directory",
});

impl ArtistSource {
    /// Table backing this source.
    pub fn table_name(&self) -> &'static str {
        match self {
            ArtistSource::Canonical => "canonical_artists",
            ArtistSource::DjDirectory => "dj_artists",
        }
    }
}

/// Entity discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Run,
    Insight,
    Issue,
    MergeCandidate,
}

db_enum!(EntityKind, "entity kind", {
    Run => "agent_run",
    Insight => "insight",
    Issue => "issue",
    MergeCandidate => "merge_candidate",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_db_str(kind.as_db_str()), Ok(*kind));
        }
    }

    #[test]
    fn test_agent_function_parses_kebab_names() {
        assert_eq!(
            "youtube-channel-curator".parse::<AgentFunction>(),
            Ok(AgentFunction::YoutubeChannelCurator)
        );
        assert_eq!(
            "playbook-agent".parse::<AgentFunction>(),
            Ok(AgentFunction::PlaybookAgent)
        );
        let err = "playlist-dj".parse::<AgentFunction>().unwrap_err();
        assert_eq!(err.value, "playlist-dj");
        assert!(err.to_string().contains("agent function"));
    }

    #[test]
    fn test_serde_matches_db_strings() {
        let json = serde_json::to_string(&MergeStatus::AutoMerged).unwrap();
        assert_eq!(json, "\"auto_merged\"");
        let json = serde_json::to_string(&AgentFunction::DoggyAnalyticsInsights).unwrap();
        assert_eq!(json, "\"doggy-analytics-insights\"");
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(IssueSeverity::Critical > IssueSeverity::High);
        assert!(IssueSeverity::Low < IssueSeverity::Medium);
    }
}
