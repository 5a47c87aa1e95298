//! Lifecycle states of a resource during the crawl
use std::fmt;

/// Represents the current state of a resource in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    // ===== Active States =====
    /// Admitted by the dedup tracker and waiting for a concurrency slot
    Queued,

    /// Payload is being fetched
    Fetching,

    /// Kind-specific extraction is running
    Processing,

    /// Payload is being written to the mirror
    Saving,

    // ===== Terminal States =====
    /// Fetched, processed and saved
    Completed,

    /// Fetch, processing or save failed
    Failed,
}

impl ResourceState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the transition `self -> next` is allowed
    ///
    /// Every active state may fail; otherwise states only move forward one step.
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        use ResourceState::*;
        match (self, next) {
            (Queued, Fetching)
            | (Fetching, Processing)
            | (Processing, Saving)
            | (Saving, Completed) => true,
            (Queued | Fetching | Processing | Saving, Failed) => true,
            _ => false,
        }
    }

    /// Converts the state to its report string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its report string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "processing" => Some(Self::Processing),
            "saving" => Some(Self::Saving),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!ResourceState::Queued.is_terminal());
        assert!(!ResourceState::Fetching.is_terminal());
        assert!(!ResourceState::Processing.is_terminal());
        assert!(!ResourceState::Saving.is_terminal());
        assert!(ResourceState::Completed.is_terminal());
        assert!(ResourceState::Failed.is_terminal());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(ResourceState::Queued.can_transition_to(ResourceState::Fetching));
        assert!(ResourceState::Fetching.can_transition_to(ResourceState::Processing));
        assert!(ResourceState::Processing.can_transition_to(ResourceState::Saving));
        assert!(ResourceState::Saving.can_transition_to(ResourceState::Completed));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in [
            ResourceState::Queued,
            ResourceState::Fetching,
            ResourceState::Processing,
            ResourceState::Saving,
        ] {
            assert!(state.can_transition_to(ResourceState::Failed));
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!ResourceState::Queued.can_transition_to(ResourceState::Completed));
        assert!(!ResourceState::Fetching.can_transition_to(ResourceState::Saving));
        assert!(!ResourceState::Completed.can_transition_to(ResourceState::Failed));
        assert!(!ResourceState::Failed.can_transition_to(ResourceState::Queued));
        assert!(!ResourceState::Saving.can_transition_to(ResourceState::Queued));
    }

    #[test]
    fn test_db_string_round_trip() {
        for state in [
            ResourceState::Queued,
            ResourceState::Fetching,
            ResourceState::Processing,
            ResourceState::Saving,
            ResourceState::Completed,
            ResourceState::Failed,
        ] {
            assert_eq!(ResourceState::from_db_string(state.as_str()), Some(state));
        }
        assert_eq!(ResourceState::from_db_string("bogus"), None);
    }
}
