//! vmrt-ffi - C ABI shim over `vmrt`
//!
//! A thin `#[no_mangle] extern "C"` layer so a compiled-language code
//! generator can call into the managed heap and messaging runtime
//! without linking Rust directly. Kept in its own crate (rather than
//! folded into `vmrt`) so `vmrt` stays a plain `rlib` usable from Rust
//! embedders without paying for a C ABI they don't need — the same split
//! the teacher draws between `fgc` and `faxc-runtime`.

mod gc;

pub use gc::*;
