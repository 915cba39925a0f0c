//! Sysinfo Module - process-wide `system_info` and argument vector
//!
//! Spec.md §4.9 groups this with the nullary table as the other half of
//! "process-wide state": a small fixed table of build/platform strings
//! indexed by an integer, and the program's argv, captured once and
//! shared read-only by every VM thread.

use std::sync::OnceLock;

/// `system_info(index)` — fixed platform/build facts, indexed the way the
/// reference RTS indexes them: 0 the target triple, 1 the OS name, 2 this
/// runtime's version string. Any other index yields `None`.
pub fn system_info(index: u32) -> Option<&'static str> {
    match index {
        0 => Some(env!("VMRT_TARGET_TRIPLE")),
        1 => Some(std::env::consts::OS),
        2 => Some(env!("CARGO_PKG_VERSION")),
        _ => None,
    }
}

static PROGRAM_ARGS: OnceLock<Vec<String>> = OnceLock::new();

/// Capture the program's argument vector exactly once. Later calls are
/// no-ops — by the time a VM is running, argv is a process-wide constant.
pub fn set_program_args(args: Vec<String>) {
    let _ = PROGRAM_ARGS.set(args);
}

fn args() -> &'static [String] {
    PROGRAM_ARGS
        .get_or_init(|| std::env::args().collect())
        .as_slice()
}

/// Number of program arguments (including argv[0]).
pub fn arg_count() -> usize {
    args().len()
}

/// The `i`th program argument, or `None` if out of range.
pub fn arg(i: usize) -> Option<&'static str> {
    args().get(i).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_info_os_matches_std() {
        assert_eq!(system_info(1), Some(std::env::consts::OS));
    }

    #[test]
    fn system_info_target_triple_is_nonempty() {
        assert!(!system_info(0).unwrap().is_empty());
    }

    #[test]
    fn system_info_out_of_range_is_none() {
        assert_eq!(system_info(999), None);
    }

    #[test]
    fn program_args_capture_is_idempotent() {
        set_program_args(vec!["prog".to_string(), "a".to_string()]);
        set_program_args(vec!["ignored".to_string()]);
        assert_eq!(arg_count(), 2);
        assert_eq!(arg(0), Some("prog"));
        assert_eq!(arg(1), Some("a"));
    }
}
