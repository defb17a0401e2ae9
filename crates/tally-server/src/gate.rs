// Readiness gate: blocks counter-mutating operations until the first
// successful rebuild, so incremental state never diverges from the log.
//
// Once Ready, the gate never re-closes within a process lifetime; a
// later manual rebuild flips through "rebuilding" internally but keeps
// ingestion open.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Readiness {
    Uninitialized = 0,
    Rebuilding = 1,
    Ready = 2,
    Failed = 3,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Uninitialized => "uninitialized",
            Readiness::Rebuilding => "rebuilding",
            Readiness::Ready => "ready",
            Readiness::Failed => "failed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Readiness::Rebuilding,
            2 => Readiness::Ready,
            3 => Readiness::Failed,
            _ => Readiness::Uninitialized,
        }
    }
}

pub struct ReadinessGate {
    state: AtomicU8,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Readiness::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> Readiness {
        Readiness::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once the first rebuild has succeeded (or a permissive
    /// startup opened the gate). Checked synchronously before every
    /// mutating operation.
    pub fn is_ready(&self) -> bool {
        self.state() == Readiness::Ready
    }

    /// Mark a rebuild as running. Does not demote an open gate.
    pub fn begin_rebuild(&self) {
        let _ = self.state.compare_exchange(
            Readiness::Uninitialized as u8,
            Readiness::Rebuilding as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            Readiness::Failed as u8,
            Readiness::Rebuilding as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn open(&self) {
        self.state.store(Readiness::Ready as u8, Ordering::SeqCst);
    }

    /// Record a rebuild failure. A gate that is already open stays open.
    pub fn fail(&self) {
        let _ = self.state.compare_exchange(
            Readiness::Rebuilding as u8,
            Readiness::Failed as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            Readiness::Uninitialized as u8,
            Readiness::Failed as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_and_closed() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), Readiness::Uninitialized);
        assert!(!gate.is_ready());
    }

    #[test]
    fn follows_the_startup_state_machine() {
        let gate = ReadinessGate::new();
        gate.begin_rebuild();
        assert_eq!(gate.state(), Readiness::Rebuilding);
        gate.open();
        assert!(gate.is_ready());
    }

    #[test]
    fn failure_before_first_success_closes_the_gate() {
        let gate = ReadinessGate::new();
        gate.begin_rebuild();
        gate.fail();
        assert_eq!(gate.state(), Readiness::Failed);
        assert!(!gate.is_ready());

        // A later retry can still open it.
        gate.begin_rebuild();
        assert_eq!(gate.state(), Readiness::Rebuilding);
        gate.open();
        assert!(gate.is_ready());
    }

    #[test]
    fn open_gate_never_recloses() {
        let gate = ReadinessGate::new();
        gate.begin_rebuild();
        gate.open();

        // Manual rebuild runs while the gate stays open.
        gate.begin_rebuild();
        assert!(gate.is_ready());
        gate.fail();
        assert!(gate.is_ready());
    }
}
