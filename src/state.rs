//! Runtime state representation for the executor
//!
//! Non-local transfers are not implemented with host-level unwinding; an
//! opcode or native that leaves the straight-line path arms the shared
//! [`LongjmpState`] and returns the `Trap` sentinel. The executor loop
//! hands the armed state to the unwinder, which produces an
//! [`UnwindAction`].

use crate::value::Value;

use std::mem;

/// Kind of an in-flight non-local transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LjKind {
    /// No transfer in flight.
    Unknown = 0,
    /// A thrown error; `value1` is the error value.
    Throw = 1,
    /// Function return; `value1` is the return value.
    Return = 2,
    /// `break`; `value1` is the label id.
    Break = 3,
    /// `continue`; `value1` is the label id.
    Continue = 4,
    /// Coroutine yield; `value1` is the payload.
    Yield = 5,
    /// Coroutine resume; `value1` is the payload, `value2` the resumee
    /// thread object.
    Resume = 6,
    /// Normal completion code as stored by finally bookkeeping; never a
    /// live transfer.
    Normal = 7,
}

impl LjKind {
    /// Decode a completion code stored in a catcher's reserved register.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::Throw,
            2 => Self::Return,
            3 => Self::Break,
            4 => Self::Continue,
            5 => Self::Yield,
            6 => Self::Resume,
            7 => Self::Normal,
            _ => return None,
        })
    }
}

/// The shared slot through which every non-local transfer is communicated
/// to the unwinder. Owned by exactly one in-flight transfer at a time.
#[derive(Debug, Default)]
pub struct LongjmpState {
    pub kind: LjKind,
    pub value1: Value,
    pub value2: Value,
    /// A yield/resume that injects an error instead of a plain value.
    pub is_error: bool,
}

impl Default for LjKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl LongjmpState {
    /// Arm the state for a new transfer. The previous values are released
    /// only after the new ones are in place.
    pub fn arm(&mut self, kind: LjKind, value1: Value, value2: Value, is_error: bool) {
        debug_assert_eq!(
            self.kind,
            LjKind::Unknown,
            "longjmp state already owned by an in-flight transfer"
        );
        self.kind = kind;
        let old1 = mem::replace(&mut self.value1, value1);
        let old2 = mem::replace(&mut self.value2, value2);
        self.is_error = is_error;
        drop(old1);
        drop(old2);
    }

    /// Take both values out, leaving `undefined` behind.
    pub fn take_values(&mut self) -> (Value, Value) {
        (
            mem::take(&mut self.value1),
            mem::take(&mut self.value2),
        )
    }

    /// Reset to the quiescent state. Values are released first, then the
    /// kind, so a reentrant observer never sees a half-armed state.
    pub fn clear(&mut self) {
        let _ = self.take_values();
        self.is_error = false;
        self.kind = LjKind::Unknown;
    }
}

/// Unwinder decision.
#[derive(Debug, Clone, PartialEq)]
pub enum UnwindAction {
    /// Continue the main loop after re-deriving thread/activation state.
    Restart,
    /// The entry activation returned with this value.
    Finished(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_and_clear_round_trip() {
        let mut lj = LongjmpState::default();
        lj.arm(LjKind::Throw, Value::number(1.0), Value::Undefined, false);
        assert_eq!(lj.kind, LjKind::Throw);

        lj.clear();
        assert_eq!(lj.kind, LjKind::Unknown);
        assert!(lj.value1.is_undefined());
        assert!(lj.value2.is_undefined());
        assert!(!lj.is_error);
    }

    #[test]
    fn completion_codes_round_trip() {
        for kind in [
            LjKind::Unknown,
            LjKind::Throw,
            LjKind::Return,
            LjKind::Break,
            LjKind::Continue,
            LjKind::Yield,
            LjKind::Resume,
            LjKind::Normal,
        ] {
            assert_eq!(LjKind::from_code(kind as u8), Some(kind));
        }
        assert_eq!(LjKind::from_code(0xff), None);
    }
}
