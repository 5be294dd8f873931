//! Runtime interpreter error implementation

use crate::value::Value;

use std::fmt;
use thiserror::Error;

/// Interpreter error variants surfaced to the embedder.
#[derive(Debug, Error)]
pub enum VmError {
    /// A script error left the entry activation without being caught. The
    /// thrown value is carried verbatim.
    #[error("uncaught error: {0}")]
    Uncaught(Value),
    /// A host API call targeted a value that cannot be called.
    #[error("target value is not callable")]
    NotCallable,
    /// A host API call targeted a value that cannot be used as a coroutine
    /// body.
    #[error("coroutine body must be a compiled function")]
    NotThreadable,
}

impl VmError {
    /// The thrown value, if this error carries one.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Self::Uncaught(v) => Some(v),
            _ => None,
        }
    }
}

/// Internal taxonomy used to construct thrown error objects. These are not
/// source-level classes; they map onto the standard error names when an
/// error object is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum ErrorKind {
    /// Generic `Error`.
    Error = 0x00,
    /// `TypeError`: a value had the wrong type for an operation.
    Type = 0x01,
    /// `RangeError`: a resource limit was exceeded (interrupt hook,
    /// call-recursion depth, stack limits).
    Range = 0x02,
    /// `ReferenceError`: invalid left-hand side or unresolvable identifier.
    Reference = 0x03,
    /// `SyntaxError`: malformed input observed at run time.
    Syntax = 0x04,
    /// Invariant violation in the executor (impossible opcode, malformed
    /// indirect target, unknown longjmp kind). Raised as a throwable error
    /// and propagated through the normal throw path.
    Internal = 0x05,
}

impl ErrorKind {
    /// The `name` property value of the corresponding error object.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Type => "TypeError",
            Self::Range => "RangeError",
            Self::Reference => "ReferenceError",
            Self::Syntax => "SyntaxError",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sentinel marking that the shared longjmp state has been armed and control
/// must divert to the unwinder. Carries no payload; the longjmp state holds
/// the transfer kind and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap;

/// Result alias for operations that may initiate a non-local transfer.
pub type OpResult<T> = Result<T, Trap>;

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn error_kind_names_match_standard_classes() {
        for kind in ErrorKind::iter() {
            match kind {
                ErrorKind::Internal => assert_eq!(kind.name(), "InternalError"),
                _ => assert!(kind.name().ends_with("Error")),
            }
        }
    }
}
