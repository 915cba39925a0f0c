//! vmrt - managed heap and messaging runtime for a compiled functional
//! language backend
//!
//! ```text
//!   ┌─────────────┐   send_message    ┌─────────────┐
//!   │   Vm  A     │ ────────────────► │   Vm  B     │
//!   │  stack      │   (deep-copy      │  stack      │
//!   │  registers  │    into B's heap, │  registers  │
//!   │  heap ──┐   │    under B's      │  heap ──┐   │
//!   │  active │   │    alloc lock)    │  active │   │
//!   │  reserve│   │                   │  reserve│   │
//!   └─────────┴───┘                   └─────────┴───┘
//! ```
//!
//! Every [`value::Value`] is either a small-integer immediate or a
//! pointer into its owning VM's active semi-space ([`heap::Heap`]).
//! Allocation ([`vm::Vm::alloc`]) is a bump of that space's cursor; when
//! it fills, [`gc::collect`] runs a stop-the-world Cheney copy into the
//! reserve half, relocating every live object reachable from the stack
//! and registers, then swaps which half is active. [`constructors`] is
//! the tag-aware layer everything else builds values through;
//! [`strings`], [`buffer`], [`simd`], [`cast`], and [`foreign`] are the
//! derived primitive families spec.md §6 groups under it.
//!
//! With the `concurrent` feature (on by default), each [`vm::Vm`] also
//! owns a [`mailbox::Mailbox`]: other VMs reach it by
//! [`vm::VmId`] through a process-wide registry and deep-copy messages
//! directly into its heap.
//!
//! [`nullary`] and [`sysinfo`] hold the two pieces of genuinely
//! process-wide state: the 256-slot table of zero-field constructors
//! shared by every VM, and the program's argument vector.

pub mod buffer;
pub mod cast;
pub mod config;
pub mod constructors;
pub mod error;
pub mod foreign;
pub mod gc;
pub mod heap;
#[cfg(feature = "concurrent")]
pub mod mailbox;
pub mod nullary;
pub mod object;
pub mod simd;
pub mod stack;
pub mod stats;
pub mod strings;
pub mod sysinfo;
pub mod value;
pub mod vm;

pub use config::VmConfig;
pub use error::{fatal, fatal_with, FatalKind, Result, RtError};
pub use value::{Tag, Value};
pub use vm::Vm;
#[cfg(feature = "concurrent")]
pub use vm::VmId;
