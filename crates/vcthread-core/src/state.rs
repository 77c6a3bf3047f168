//! Virtual core and user thread state types

/// Allocation state of a virtual core
///
/// `Free` cores are parked at their entry gate. A requester claims a core
/// by moving it `Free -> Reserved` with a compare-exchange, then publishes
/// it as `Allocated` before waking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VcoreState {
    /// Parked at the entry gate, available to requesters
    Free = 0,

    /// Claimed by a requester, not yet handed its wakeup
    Reserved = 1,

    /// Running vcore-context code or a user thread
    Allocated = 2,
}

impl VcoreState {
    #[inline]
    pub const fn is_allocated(&self) -> bool {
        matches!(self, VcoreState::Allocated)
    }
}

impl From<u8> for VcoreState {
    fn from(v: u8) -> Self {
        match v {
            0 => VcoreState::Free,
            1 => VcoreState::Reserved,
            _ => VcoreState::Allocated,
        }
    }
}

impl From<VcoreState> for u8 {
    fn from(state: VcoreState) -> u8 {
        state as u8
    }
}

/// State of a user thread
///
/// Legal transitions:
/// `NotRunning -> Running` (run), `Running -> NotRunning` (yield),
/// `Running -> Hijacked` (another thread took over its execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UthreadState {
    /// Executing on some virtual core
    Running = 1,

    /// Suspended; the saved context is valid to resume
    NotRunning = 2,

    /// Retired by a hijack; never resumed
    Hijacked = 3,
}

impl UthreadState {
    /// Whether the saved context may be restored
    #[inline]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, UthreadState::NotRunning)
    }

    /// Check a transition against the user thread state machine
    #[inline]
    pub const fn can_transition_to(&self, next: UthreadState) -> bool {
        matches!(
            (*self, next),
            (UthreadState::NotRunning, UthreadState::Running)
                | (UthreadState::Running, UthreadState::NotRunning)
                | (UthreadState::Running, UthreadState::Hijacked)
        )
    }
}

impl From<u8> for UthreadState {
    fn from(v: u8) -> Self {
        match v {
            1 => UthreadState::Running,
            3 => UthreadState::Hijacked,
            _ => UthreadState::NotRunning,
        }
    }
}

impl From<UthreadState> for u8 {
    fn from(state: UthreadState) -> u8 {
        state as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcore_state_roundtrip() {
        for s in [VcoreState::Free, VcoreState::Reserved, VcoreState::Allocated] {
            assert_eq!(VcoreState::from(u8::from(s)), s);
        }
        assert!(VcoreState::Allocated.is_allocated());
        assert!(!VcoreState::Reserved.is_allocated());
    }

    #[test]
    fn test_uthread_transitions() {
        use UthreadState::*;
        assert!(NotRunning.can_transition_to(Running));
        assert!(Running.can_transition_to(NotRunning));
        assert!(Running.can_transition_to(Hijacked));

        assert!(!NotRunning.can_transition_to(Hijacked));
        assert!(!Running.can_transition_to(Running));
        assert!(!Hijacked.can_transition_to(Running));
        assert!(!Hijacked.can_transition_to(NotRunning));
    }

    #[test]
    fn test_only_not_running_is_resumable() {
        assert!(UthreadState::NotRunning.is_resumable());
        assert!(!UthreadState::Running.is_resumable());
        assert!(!UthreadState::Hijacked.is_resumable());
    }
}
