use drift_protocol::{
    Activity, ProtocolError, ProtocolResult, PulseStatus, SessionPulse, SessionState,
};

/// Reduces the raw status, the activity history, and the delivered flag into
/// one [`SessionState`].
///
/// Implementations must be pure: identical inputs give identical outputs.
pub trait SessionStatePolicy: Send + Sync {
    /// `pulse` and `history` are required; `None` is a caller defect and fails
    /// with `InvalidArgument` rather than being read as empty.
    fn evaluate(
        &self,
        pulse: Option<&SessionPulse>,
        history: Option<&[Activity]>,
        is_delivered: bool,
    ) -> ProtocolResult<SessionState>;
}

/// Fixed mapping from the remote status to the state shown before any override.
pub fn baseline_state(status: PulseStatus) -> SessionState {
    match status {
        PulseStatus::StartingUp => SessionState::Queued,
        PulseStatus::Planning => SessionState::Planning,
        PulseStatus::InProgress => SessionState::Working,
        PulseStatus::Paused => SessionState::Paused,
        PulseStatus::AwaitingFeedback => SessionState::AwaitingFeedback,
        PulseStatus::AwaitingPlanApproval => SessionState::AwaitingPlanApproval,
        PulseStatus::Completed | PulseStatus::Abandoned => SessionState::Idle,
        PulseStatus::Failed => SessionState::Broken,
        PulseStatus::Other(_) => SessionState::Unknown,
    }
}

/// Most recent significant activity by timestamp.
///
/// History order is arrival order and is not assumed to be sorted. When several
/// significant activities share the latest timestamp, the one that arrived last
/// wins.
pub fn latest_significant(history: &[Activity]) -> Option<&Activity> {
    history
        .iter()
        .filter(|activity| activity.is_significant())
        .fold(None, |latest: Option<&Activity>, candidate| match latest {
            Some(current) if current.timestamp > candidate.timestamp => Some(current),
            _ => Some(candidate),
        })
}

/// The standard policy.
///
/// A session whose baseline is `Idle` and that has not delivered anything is
/// reported as `AwaitingPlanApproval` when its most recent significant activity
/// is a plan proposal.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSessionStatePolicy;

impl DefaultSessionStatePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl SessionStatePolicy for DefaultSessionStatePolicy {
    fn evaluate(
        &self,
        pulse: Option<&SessionPulse>,
        history: Option<&[Activity]>,
        is_delivered: bool,
    ) -> ProtocolResult<SessionState> {
        let pulse =
            pulse.ok_or_else(|| ProtocolError::InvalidArgument("pulse is required".to_owned()))?;
        let history = history
            .ok_or_else(|| ProtocolError::InvalidArgument("history is required".to_owned()))?;

        let baseline = baseline_state(pulse.status);
        if baseline != SessionState::Idle || is_delivered {
            return Ok(baseline);
        }

        match latest_significant(history) {
            Some(activity) if activity.is_plan_proposal() => Ok(SessionState::AwaitingPlanApproval),
            _ => Ok(baseline),
        }
    }
}
