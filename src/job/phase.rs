use std::fmt;

/// Phases of one job run, as driven by the host scheduler.
///
/// INITIALIZING → DISPATCHED → EXECUTING → AGGREGATING → COMPLETED_SUCCESS | COMPLETED_WITH_ERRORS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Initializing,
    Dispatched,
    PerTaskExecuting,
    Aggregating,
    CompletedSuccess,
    CompletedWithErrors,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Initializing => write!(f, "INITIALIZING"),
            JobPhase::Dispatched => write!(f, "DISPATCHED"),
            JobPhase::PerTaskExecuting => write!(f, "EXECUTING"),
            JobPhase::Aggregating => write!(f, "AGGREGATING"),
            JobPhase::CompletedSuccess => write!(f, "COMPLETED_SUCCESS"),
            JobPhase::CompletedWithErrors => write!(f, "COMPLETED_WITH_ERRORS"),
        }
    }
}

impl JobPhase {
    pub fn can_advance_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        matches!(
            (self, next),
            (Initializing, Dispatched)
                | (Dispatched, PerTaskExecuting)
                | (PerTaskExecuting, Aggregating)
                | (Aggregating, CompletedSuccess)
                | (Aggregating, CompletedWithErrors)
        )
    }

    /// Move to `next`, logging the transition. Illegal transitions are logged
    /// and leave the phase unchanged.
    pub fn advance(&mut self, next: JobPhase) {
        if !self.can_advance_to(next) {
            tracing::error!(from = %self, to = %next, "Illegal job phase transition");
            return;
        }
        tracing::info!(from = %self, to = %next, "Job phase transition");
        *self = next;
    }
}
