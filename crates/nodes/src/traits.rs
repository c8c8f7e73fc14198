//! The `StepTransform` trait: the contract every step executor must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Position of a step in its workflow chain.
///
/// Defined here (in the nodes crate) so both the engine and transform
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepRole {
    Start,
    Normal,
    End,
}

impl StepRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Normal => "NORMAL",
            Self::End => "END",
        }
    }
}

impl std::fmt::Display for StepRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START"  => Ok(Self::Start),
            "NORMAL" => Ok(Self::Normal),
            "END"    => Ok(Self::End),
            other    => Err(format!("unknown step role: {other}")),
        }
    }
}

/// Everything a transform needs to execute one step.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub step_name: &'a str,
    /// Free-text instruction describing what the step does to its input.
    pub description: &'a str,
    /// Output of the previous step, or the run input for the first step.
    pub input: &'a str,
    pub role: StepRole,
}

/// Result of one transform call.
///
/// `error` is `None` on success. On failure `output` may still carry
/// whatever partial text the backend produced (usually empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub output: String,
    pub error: Option<String>,
}

impl TransformOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self { output: output.into(), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { output: String::new(), error: Some(error.into()) }
    }

    /// A failure that still produced some text.
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self { output: output.into(), error: Some(error.into()) }
    }
}

/// The core transform trait.
///
/// Implementations must not fail past this boundary: every problem is
/// reported through [`TransformOutcome::error`].
#[async_trait]
pub trait StepTransform: Send + Sync {
    async fn transform(&self, request: TransformRequest<'_>) -> TransformOutcome;

    /// Whether a real backend is configured (reported by health checks).
    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in [StepRole::Start, StepRole::Normal, StepRole::End] {
            assert_eq!(role.as_str().parse::<StepRole>(), Ok(role));
        }
        assert!("start".parse::<StepRole>().is_err());
    }

    #[test]
    fn role_serialises_uppercase() {
        let json = serde_json::to_string(&StepRole::Normal).unwrap();
        assert_eq!(json, "\"NORMAL\"");
        let role: StepRole = serde_json::from_str("\"END\"").unwrap();
        assert_eq!(role, StepRole::End);
    }

    #[test]
    fn outcome_constructors() {
        assert_eq!(TransformOutcome::success("x").error, None);
        let failed = TransformOutcome::failure("boom");
        assert_eq!(failed.output, "");
        assert_eq!(failed.error.as_deref(), Some("boom"));
        let partial = TransformOutcome::partial("half", "cut off");
        assert_eq!(partial.output, "half");
        assert_eq!(partial.error.as_deref(), Some("cut off"));
    }
}
