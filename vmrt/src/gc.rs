//! GC Module - stop-the-world semi-space copying collector
//!
//! Cheney's algorithm: swap the active and reserve halves, relocate every
//! root, then scan the newly-copied region in address order, relocating
//! each pointer field it finds, until the scan catches up with the bump
//! pointer. The new space's bump pointer doubles as the worklist boundary
//! — no separate queue is ever allocated.
//!
//! Grounded on `fgc::gc::GarbageCollector::execute_gc_cycle`'s phase
//! structure (mark → relocate → cleanup), collapsed to the single pass a
//! copying collector needs since there is no separate mark bitmap: a
//! pointer is "marked" the instant it's copied and forwarded.

use crate::error::{fatal, FatalKind};
use crate::heap::Heap;
use crate::object;
use crate::value::{Tag, Value};

/// Counters describing one completed collection cycle, surfaced through
/// [`crate::stats::VmStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionStats {
    pub objects_copied: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Run one full collection cycle over `heap`, relocating every value
/// reachable from `roots` (and transitively from them). Each root is a
/// raw pointer to a stack slot, register, or mailbox entry holding a
/// [`Value`]; it is updated in place to point at the relocated copy.
///
/// # Safety
/// Every pointer in `roots` must be valid for the duration of the call and
/// must not alias the heap's own storage.
pub unsafe fn collect(heap: &mut Heap, roots: &mut [*mut Value]) -> CollectionStats {
    let from_base = heap.active_base();
    let from_end = heap.active_end();
    let bytes_before = heap.bytes_used();

    heap.swap_spaces();
    let to_base = heap.active_base();

    for root in roots.iter().copied() {
        scavenge_value(heap, from_base, from_end, &mut *root);
    }

    let mut scan = to_base;
    let mut objects_copied = 0usize;
    while scan < heap.bump() {
        let size = object::chunk_size(scan);
        let tag = object::tag(scan);
        match tag {
            Tag::Con => {
                let arity = object::con_arity(scan);
                for i in 0..arity {
                    let mut field = object::con_field(scan, i);
                    scavenge_value(heap, from_base, from_end, &mut field);
                    object::set_con_field(scan, i, field);
                }
            }
            Tag::StrOffset => {
                let mut root_addr = object::stroffset_root(scan);
                scavenge_addr(heap, from_base, from_end, &mut root_addr);
                object::set_stroffset_root(scan, root_addr);
            }
            // FLOAT/STRING/BIGINT/PTR/MANAGEDPTR/BITS*/BUFFER payloads hold
            // no Value or heap-address fields; nothing to relocate.
            _ => {}
        }
        objects_copied += 1;
        scan += size;
    }

    CollectionStats {
        objects_copied,
        bytes_before,
        bytes_after: heap.bytes_used(),
    }
}

/// Relocate a single [`Value`] if it points into the from-space, leaving
/// immediates and already-relocated pointers untouched.
///
/// # Safety
/// `from_base..from_end` must describe the collector's from-space and
/// must not overlap the current active half.
unsafe fn scavenge_value(heap: &mut Heap, from_base: usize, from_end: usize, v: &mut Value) {
    if v.is_int() {
        return;
    }
    let mut addr = v.addr();
    scavenge_addr(heap, from_base, from_end, &mut addr);
    *v = Value::from_addr(addr);
}

/// Relocate a raw heap address (used for STROFFSET's untagged root
/// pointer, which carries no immediate/pointer distinction of its own).
///
/// # Safety
/// See [`scavenge_value`].
unsafe fn scavenge_addr(heap: &mut Heap, from_base: usize, from_end: usize, addr: &mut usize) {
    if *addr < from_base || *addr >= from_end {
        // Already outside from-space: either a foreign/unmanaged address
        // (PTR payloads are never roots-of-roots) or already relocated.
        return;
    }
    if object::is_forwarded(*addr) {
        *addr = object::forwarding_target(*addr);
        return;
    }
    let new_addr = copy_object(heap, *addr);
    object::set_forwarded(*addr, new_addr);
    *addr = new_addr;
}

/// Copy one object out of from-space into the (already-swapped) active
/// half, preserving its tag-required alignment.
///
/// # Safety
/// `from_addr` must point at a live, not-yet-forwarded object header.
unsafe fn copy_object(heap: &mut Heap, from_addr: usize) -> usize {
    let size = object::chunk_size(from_addr);
    let tag = object::tag(from_addr);
    let align = vector_align(tag);
    let new_addr = heap
        .try_alloc(size, align)
        .unwrap_or_else(|| fatal(FatalKind::HeapExhausted));
    std::ptr::copy_nonoverlapping(from_addr as *const u8, new_addr as *mut u8, size);
    new_addr
}

#[inline]
fn vector_align(tag: Tag) -> usize {
    match tag {
        Tag::Bits8x16 | Tag::Bits16x8 | Tag::Bits32x4 | Tag::Bits64x2 => 16,
        _ => 8,
    }
}

/// Allocate `size` bytes (aligned to `align`), running a collection and
/// retrying once if the active half has no room. Fatal per spec.md §7 if
/// the collection doesn't free enough space — by the copying invariant
/// live data never exceeds the active half's capacity, so this path only
/// fires when a single request genuinely exceeds total heap capacity.
///
/// # Safety
/// See [`collect`].
pub unsafe fn alloc_or_collect(
    heap: &mut Heap,
    roots: &mut [*mut Value],
    size: usize,
    align: usize,
) -> usize {
    if let Some(addr) = heap.try_alloc(size, align) {
        return addr;
    }
    collect(heap, roots);
    heap.try_alloc(size, align)
        .unwrap_or_else(|| fatal(FatalKind::HeapExhausted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{con_field, con_size, init_con, init_string, string_bytes};

    #[test]
    fn live_con_survives_collection_and_moves() {
        let mut heap = Heap::new(4096);
        unsafe {
            let addr = heap.try_alloc(con_size(1), 8).unwrap();
            init_con(addr, 1, 1);
            crate::object::set_con_field(addr, 0, Value::int(42));

            let mut root = Value::from_addr(addr);
            let mut roots = [&mut root as *mut Value];
            collect(&mut heap, &mut roots);

            assert_ne!(root.addr(), addr, "live object should have moved");
            assert_eq!(con_field(root.addr(), 0).as_int(), 42);
        }
    }

    #[test]
    fn dead_object_is_reclaimed() {
        let mut heap = Heap::new(4096);
        unsafe {
            let _dead = heap.try_alloc(con_size(0), 8).unwrap();
            init_con(_dead, 9, 0);
        }
        let used_before = heap.bytes_used();
        unsafe {
            collect(&mut heap, &mut []);
        }
        assert!(heap.bytes_used() < used_before);
        assert_eq!(heap.bytes_used(), 0);
    }

    #[test]
    fn nested_con_graph_relocates_transitively() {
        let mut heap = Heap::new(4096);
        unsafe {
            let leaf = heap.try_alloc(con_size(0), 8).unwrap();
            init_con(leaf, 1, 0);

            let parent = heap.try_alloc(con_size(1), 8).unwrap();
            init_con(parent, 2, 1);
            crate::object::set_con_field(parent, 0, Value::from_addr(leaf));

            let mut root = Value::from_addr(parent);
            let mut roots = [&mut root as *mut Value];
            collect(&mut heap, &mut roots);

            let new_parent = root.addr();
            let new_leaf = con_field(new_parent, 0);
            assert!(!new_leaf.is_int());
            assert_eq!(object::con_user_tag(new_leaf.addr()), 1);
        }
    }

    #[test]
    fn shared_string_is_copied_once() {
        let mut heap = Heap::new(4096);
        unsafe {
            let s = heap.try_alloc(crate::object::string_size(5), 8).unwrap();
            init_string(s, b"hello");

            let mut a = Value::from_addr(s);
            let mut b = Value::from_addr(s);
            let mut roots = [&mut a as *mut Value, &mut b as *mut Value];
            collect(&mut heap, &mut roots);

            assert_eq!(a.addr(), b.addr(), "both roots must forward to the same copy");
            assert_eq!(string_bytes(a.addr()), b"hello");
        }
    }
}
