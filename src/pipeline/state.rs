use std::fmt;

/// Lifecycle states of a single clip run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    WorkspaceAcquired,
    Fetching,
    Fetched,
    RangeValidated,
    Transcoding,
    Succeeded,
    Failed,
    Released,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::WorkspaceAcquired => "workspace_acquired",
            PipelineState::Fetching => "fetching",
            PipelineState::Fetched => "fetched",
            PipelineState::RangeValidated => "range_validated",
            PipelineState::Transcoding => "transcoding",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
            PipelineState::Released => "released",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Idle, WorkspaceAcquired) => true,
            (WorkspaceAcquired, Fetching) => true,
            (Fetching, Fetched) => true,
            (Fetched, RangeValidated) => true,
            (RangeValidated, Transcoding) => true,
            (Transcoding, Succeeded) => true,
            (Succeeded | Failed, Released) => true,
            (Idle | WorkspaceAcquired | Fetching | Fetched | RangeValidated | Transcoding, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the states a run passes through
#[derive(Debug)]
pub(crate) struct StateTracker {
    history: Vec<PipelineState>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            history: vec![PipelineState::Idle],
        }
    }

    pub(crate) fn current(&self) -> PipelineState {
        self.history.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub(crate) fn enter(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal pipeline transition {} -> {}",
            current,
            next
        );
        tracing::debug!("Pipeline state {} -> {}", current, next);
        self.history.push(next);
    }

    pub(crate) fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}
