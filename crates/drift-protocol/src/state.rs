//! Raw status pulses from the remote service and the derived session state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Low-level status reported by the remote service.
///
/// Persisted as its integer code so that codes introduced by newer services
/// survive a round trip as [`PulseStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PulseStatus {
    StartingUp,
    Planning,
    InProgress,
    Paused,
    AwaitingFeedback,
    AwaitingPlanApproval,
    Completed,
    Abandoned,
    Failed,
    /// A code outside the known range.
    Other(i64),
}

impl PulseStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::StartingUp,
            1 => Self::Planning,
            2 => Self::InProgress,
            3 => Self::Paused,
            4 => Self::AwaitingFeedback,
            5 => Self::AwaitingPlanApproval,
            6 => Self::Completed,
            7 => Self::Abandoned,
            8 => Self::Failed,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::StartingUp => 0,
            Self::Planning => 1,
            Self::InProgress => 2,
            Self::Paused => 3,
            Self::AwaitingFeedback => 4,
            Self::AwaitingPlanApproval => 5,
            Self::Completed => 6,
            Self::Abandoned => 7,
            Self::Failed => 8,
            Self::Other(code) => code,
        }
    }
}

impl From<i64> for PulseStatus {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<PulseStatus> for i64 {
    fn from(status: PulseStatus) -> Self {
        status.code()
    }
}

impl FromStr for PulseStatus {
    type Err = String;

    /// Accepts snake_case names (`in_progress`), their upper-case remote spelling
    /// (`IN_PROGRESS`), or an integer code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i64>() {
            return Ok(Self::from_code(code));
        }
        let status = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "starting_up" | "queued" => Self::StartingUp,
            "planning" => Self::Planning,
            "in_progress" => Self::InProgress,
            "paused" => Self::Paused,
            "awaiting_feedback" | "awaiting_user_feedback" => Self::AwaitingFeedback,
            "awaiting_plan_approval" => Self::AwaitingPlanApproval,
            "completed" => Self::Completed,
            "abandoned" => Self::Abandoned,
            "failed" => Self::Failed,
            other => return Err(format!("unknown pulse status `{other}`")),
        };
        Ok(status)
    }
}

/// The raw status signal for a session at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPulse {
    pub status: PulseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SessionPulse {
    pub fn new(status: PulseStatus) -> Self {
        Self {
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// User-facing session state. Always derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Queued,
    Planning,
    Working,
    Paused,
    AwaitingFeedback,
    AwaitingPlanApproval,
    Idle,
    Broken,
    Unknown,
}

impl SessionState {
    /// The session will not make further progress on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Broken)
    }

    /// The session is blocked on the user.
    pub fn needs_attention(self) -> bool {
        matches!(self, Self::AwaitingFeedback | Self::AwaitingPlanApproval)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::AwaitingFeedback => "awaiting feedback",
            Self::AwaitingPlanApproval => "awaiting plan approval",
            Self::Idle => "idle",
            Self::Broken => "broken",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 0..=8 {
            assert_eq!(PulseStatus::from_code(code).code(), code);
        }
        assert_eq!(PulseStatus::from_code(999), PulseStatus::Other(999));
    }

    #[test]
    fn pulse_serializes_status_as_code() {
        let pulse = SessionPulse::new(PulseStatus::Completed);
        assert_eq!(serde_json::to_string(&pulse).unwrap(), r#"{"status":6}"#);
        let back: SessionPulse = serde_json::from_str(r#"{"status":999,"detail":"x"}"#).unwrap();
        assert_eq!(back.status, PulseStatus::Other(999));
        assert_eq!(back.detail.as_deref(), Some("x"));
    }

    #[test]
    fn parse_names_and_codes() {
        assert_eq!("in_progress".parse::<PulseStatus>(), Ok(PulseStatus::InProgress));
        assert_eq!("AWAITING_PLAN_APPROVAL".parse::<PulseStatus>(), Ok(PulseStatus::AwaitingPlanApproval));
        assert_eq!("completed".parse::<PulseStatus>(), Ok(PulseStatus::Completed));
        assert_eq!("42".parse::<PulseStatus>(), Ok(PulseStatus::Other(42)));
        assert!("nope".parse::<PulseStatus>().is_err());
    }

    #[test]
    fn state_helpers() {
        assert!(SessionState::Broken.is_terminal());
        assert!(!SessionState::Working.is_terminal());
        assert!(SessionState::AwaitingPlanApproval.needs_attention());
        assert_eq!(SessionState::AwaitingPlanApproval.to_string(), "awaiting plan approval");
    }
}
