//! Nullary Module - the process-wide table of arity-0 constructors
//!
//! Spec.md §4.9: every nullary constructor (an enum-like `CON` with zero
//! fields) is allocated exactly once, in process-global memory outside any
//! VM's heap, and shared by every VM and every thread for the lifetime of
//! the process. 256 slots, indexed by the constructor's user tag byte.
//! Grounded on the teacher's `OnceLock<Runtime>` singleton in
//! `faxc-runtime/src/gc.rs`.

use crate::object::{con_size, init_con};
use std::sync::OnceLock;

/// Number of distinct nullary constructor tags a program may use.
pub const NULLARY_TABLE_SIZE: usize = 256;

struct NullaryTable {
    addrs: [usize; NULLARY_TABLE_SIZE],
    // Backing storage lives for the process's lifetime; leaking it is
    // intentional; there is no VM to trace these objects from, and no
    // point at which they could be collected.
    _storage: Vec<Box<[u8]>>,
}

// Safety: every slot is written once during `init()` and never mutated
// again; concurrent readers only ever observe fully-initialized addresses.
unsafe impl Sync for NullaryTable {}

static TABLE: OnceLock<NullaryTable> = OnceLock::new();

fn build_table() -> NullaryTable {
    let mut addrs = [0usize; NULLARY_TABLE_SIZE];
    let mut storage = Vec::with_capacity(NULLARY_TABLE_SIZE);
    for (tag, slot) in addrs.iter_mut().enumerate() {
        let size = con_size(0);
        let mut block = vec![0u8; size].into_boxed_slice();
        let addr = block.as_mut_ptr() as usize;
        unsafe {
            init_con(addr, tag as u32, 0);
        }
        *slot = addr;
        storage.push(block);
    }
    NullaryTable {
        addrs,
        _storage: storage,
    }
}

/// Look up the shared, process-wide address of nullary constructor
/// `tag`. Allocates the whole table lazily on first use.
///
/// # Panics
/// Panics if `tag >= 256`; the byte-sized tag field in an object header
/// (spec.md §3) makes a larger table meaningless.
pub fn nullary_con(tag: u32) -> crate::value::Value {
    assert!(
        (tag as usize) < NULLARY_TABLE_SIZE,
        "nullary constructor tag {} out of range",
        tag
    );
    let table = TABLE.get_or_init(build_table);
    crate::value::Value::from_addr(table.addrs[tag as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tag_returns_same_address() {
        let a = nullary_con(3);
        let b = nullary_con(3);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_tags_get_distinct_addresses() {
        let a = nullary_con(1);
        let b = nullary_con(2);
        assert_ne!(a.addr(), b.addr());
    }

    #[test]
    #[should_panic]
    fn out_of_range_tag_panics() {
        nullary_con(256);
    }
}
