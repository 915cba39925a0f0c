//! Configuration Module - VM Tuning Parameters
//!
//! Mirrors the shape of a GC-tuning config: documented fields with sane
//! defaults, a `validate()` that rejects nonsensical combinations before
//! a VM is ever constructed, and an `from_env()` override path for
//! out-of-process tuning.

use thiserror::Error;

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

/// Configuration for a single VM context.
///
/// Every field here is a constructor argument to [`crate::vm::Vm::init`]
/// in spec.md §4.5 (`init_vm(stack_size, heap_size, max_threads)`), plus
/// the ambient tracing/statistics knobs every vmrt component reads.
/// `Serialize`/`Deserialize` let an embedder load this from a config file
/// or ship it across a `vmThread` spawn boundary as JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VmConfig {
    /// Maximum number of [`crate::value::Value`] stack slots.
    ///
    /// Default: 4096 slots.
    pub stack_size: usize,

    /// Size in bytes of *each* semi-space. The heap reserves `2 *
    /// heap_size` bytes total (active + reserve).
    ///
    /// Default: 8MB.
    pub heap_size: usize,

    /// Upper bound on concurrently live VM threads sharing this process's
    /// nullary table and argument vector. Only meaningful with the
    /// `concurrent` feature; single-threaded builds ignore it.
    ///
    /// Default: number of logical CPUs.
    pub max_threads: usize,

    /// Capacity of the mailbox (`concurrent` feature only) — number of
    /// `(sender, msg)` slots before `send_message` is fatal per spec.md §7.
    ///
    /// Default: 64.
    pub mailbox_capacity: usize,

    /// Enable verbose GC/VM tracing through the `log` crate at `debug`
    /// level. Spec.md's Non-goals exclude a metrics subsystem but never
    /// exclude this kind of structured tracing.
    ///
    /// Default: false.
    pub verbose: bool,

    /// Enable [`crate::stats::VmStats`] collection. Collection is nearly
    /// free (a handful of counters) so it defaults on.
    ///
    /// Default: true.
    pub stats_enabled: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 4096,
            heap_size: 8 * MB,
            max_threads: num_cpus::get(),
            mailbox_capacity: 64,
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl VmConfig {
    /// The reference `idris_vm()` convenience constructor's sizes.
    pub fn idris_defaults() -> Self {
        VmConfig {
            stack_size: 4096,
            heap_size: 4 * MB,
            ..Default::default()
        }
    }

    /// Validate configuration; rejects zero sizes and other degenerate
    /// combinations a real allocator could never satisfy.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.stack_size == 0 {
            return Err(ConfigError::InvalidStackSize(
                "stack_size must be > 0".to_string(),
            ));
        }
        if self.heap_size < 64 {
            return Err(ConfigError::InvalidHeapSize(
                "heap_size must be at least 64 bytes".to_string(),
            ));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::InvalidMaxThreads(
                "max_threads must be > 0".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::InvalidMailboxCapacity(
                "mailbox_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Override defaults from environment variables:
    /// - `VMRT_STACK_SIZE`
    /// - `VMRT_HEAP_SIZE`
    /// - `VMRT_MAX_THREADS`
    /// - `VMRT_VERBOSE`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("VMRT_STACK_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.stack_size = n;
            }
        }
        if let Ok(val) = std::env::var("VMRT_HEAP_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.heap_size = n;
            }
        }
        if let Ok(val) = std::env::var("VMRT_MAX_THREADS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_threads = n;
            }
        }
        if let Ok(val) = std::env::var("VMRT_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Errors from [`VmConfig::validate`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid stack size: {0}")]
    InvalidStackSize(String),
    #[error("invalid heap size: {0}")]
    InvalidHeapSize(String),
    #[error("invalid max threads: {0}")]
    InvalidMaxThreads(String),
    #[error("invalid mailbox capacity: {0}")]
    InvalidMailboxCapacity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(VmConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_heap_rejected() {
        let config = VmConfig {
            heap_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_stack_rejected() {
        let config = VmConfig {
            stack_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_region_constant_used() {
        assert_eq!(KB, 1024);
        assert_eq!(MB, 1024 * 1024);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = VmConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: VmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stack_size, config.stack_size);
        assert_eq!(back.heap_size, config.heap_size);
    }
}
