//! Error Module - Runtime Error Types
//!
//! Defines all recoverable error types used in `vmrt`, plus the fatal-exit
//! helper for the error classes spec.md §7 declares unrecoverable at this
//! layer (stack overflow, full mailbox, heap exhaustion after collection,
//! unreachable tags).

use std::sync::PoisonError;
use thiserror::Error;

/// Main error type for all `vmrt` operations that can be recovered from
/// inside a single call (i.e. everything that isn't a spec §7 fatal class).
#[derive(Debug, Error)]
pub enum RtError {
    #[error("out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    #[error("heap initialization failed: {0}")]
    HeapInitialization(String),

    #[error("invalid pointer address: {address:#x}")]
    InvalidPointer { address: usize },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bounds check failed: index {index} out of bounds for length {length}")]
    BoundsCheckFailed { index: usize, length: usize },

    #[error("alignment error: address {address:#x} is not aligned to {alignment} bytes")]
    AlignmentError { address: usize, alignment: usize },
}

impl<T> From<PoisonError<T>> for RtError {
    fn from(err: PoisonError<T>) -> Self {
        RtError::LockPoisoned(err.to_string())
    }
}

/// Result type alias for `vmrt` operations.
pub type Result<T> = std::result::Result<T, RtError>;

/// Fatal error classes from spec.md §7. These never return to the caller:
/// the reference runtime prints a diagnostic to stderr and exits with a
/// non-zero status (`-1`), and this port preserves that contract exactly
/// rather than inventing a recoverable path the source doesn't have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    StackOverflow,
    InboxFull,
    NoMessagesWaiting,
    UnreachableTag,
    HeapExhausted,
}

impl FatalKind {
    fn diagnostic(self) -> &'static str {
        match self {
            FatalKind::StackOverflow => "Stack overflow",
            FatalKind::InboxFull => "Inbox full",
            FatalKind::NoMessagesWaiting => "No messages waiting",
            FatalKind::UnreachableTag => "Unreachable tag",
            FatalKind::HeapExhausted => "Heap exhausted after collection",
        }
    }
}

/// Print the spec-mandated diagnostic and terminate the process.
///
/// This never returns; the `!` return type lets callers use it as the tail
/// of any expression (`return fatal(...)`, `x.unwrap_or_else(|| fatal(...))`).
pub fn fatal(kind: FatalKind) -> ! {
    log::error!("{}", kind.diagnostic());
    eprintln!("{}", kind.diagnostic());
    std::process::exit(-1);
}

/// Same as [`fatal`] but appends caller-supplied context to the diagnostic
/// line, used where the reference message includes a value (e.g. the
/// requested size on heap exhaustion).
pub fn fatal_with(kind: FatalKind, context: &str) -> ! {
    log::error!("{}: {}", kind.diagnostic(), context);
    eprintln!("{}: {}", kind.diagnostic(), context);
    std::process::exit(-1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_match_spec_strings() {
        assert_eq!(FatalKind::StackOverflow.diagnostic(), "Stack overflow");
        assert_eq!(FatalKind::InboxFull.diagnostic(), "Inbox full");
        assert_eq!(
            FatalKind::NoMessagesWaiting.diagnostic(),
            "No messages waiting"
        );
    }

    #[test]
    fn out_of_memory_display() {
        let err = RtError::OutOfMemory {
            requested: 64,
            available: 16,
        };
        assert!(err.to_string().contains("64 bytes"));
    }
}
