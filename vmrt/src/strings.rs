//! Strings Module - the string primitive family (spec.md §6)
//!
//! Everything here operates on a [`Value`] that resolves (through at most
//! one `STROFFSET` hop) to UTF-8 bytes, and returns either a scalar or a
//! freshly-allocated [`Value`] via [`crate::constructors`]. Kept separate
//! from `constructors.rs` because these are all *derived* operations —
//! they never touch a raw header field directly, only `mk_str`/`str_bytes`.

use crate::constructors::{mk_str, mk_str_offset, str_bytes, str_offset};
use crate::object;
use crate::value::Value;
use crate::vm::Vm;
use std::io::BufRead;

fn bytes_of(value: Value) -> &'static [u8] {
    let full = str_bytes(value);
    &full[str_offset(value)..]
}

/// `streq(a, b)`.
pub fn str_eq(a: Value, b: Value) -> bool {
    bytes_of(a) == bytes_of(b)
}

/// `strlt(a, b)` — byte-lexicographic order, matching the reference RTS
/// (this runtime never assumes a particular text encoding beyond UTF-8
/// validity at construction time).
pub fn str_lt(a: Value, b: Value) -> bool {
    bytes_of(a) < bytes_of(b)
}

/// `strlen(s)` — length in Unicode scalar values, not bytes.
pub fn str_len(s: Value) -> usize {
    std::str::from_utf8(bytes_of(s))
        .map(|s| s.chars().count())
        .unwrap_or_else(|_| bytes_of(s).len())
}

/// `strHead(s)` — the first character.
///
/// # Panics
/// Panics if `s` is the empty string; the caller is expected to have
/// checked `strlen(s) > 0` first, matching the reference RTS's contract.
pub fn str_head(s: Value) -> char {
    std::str::from_utf8(bytes_of(s))
        .ok()
        .and_then(|s| s.chars().next())
        .expect("strHead on empty string")
}

/// `strTail(s)` — a view skipping the first character, built as a
/// `STROFFSET` when the heap has room; otherwise a fresh copy of the tail
/// bytes, matching the reference RTS's fallback for a near-exhausted heap.
pub fn str_tail(vm: &Vm, s: Value) -> Value {
    let first_len = str_head(s).len_utf8();
    if vm.heap_bytes_free() >= object::STROFFSET_SIZE {
        mk_str_offset(vm, s, first_len)
    } else {
        // Copy out before allocating: a collection inside `mk_str` could
        // relocate or overwrite `s`'s backing memory since it isn't rooted
        // from this function's perspective.
        let tail: Vec<u8> = bytes_of(s)[first_len..].to_vec();
        mk_str(vm, &tail)
    }
}

/// `strCons(c, s)` — prepend a character; always a fresh allocation since
/// there is no room before `s`'s existing bytes to grow into.
pub fn str_cons(vm: &Vm, c: char, s: Value) -> Value {
    let mut buf = [0u8; 4];
    let head = c.encode_utf8(&mut buf).as_bytes();
    let tail = bytes_of(s);
    let mut out = Vec::with_capacity(head.len() + tail.len());
    out.extend_from_slice(head);
    out.extend_from_slice(tail);
    mk_str(vm, &out)
}

/// `strIndex(s, i)` — the `i`th character (Unicode scalar value indexed,
/// matching `strlen`/`strHead`).
pub fn str_index(s: Value, i: usize) -> char {
    std::str::from_utf8(bytes_of(s))
        .ok()
        .and_then(|s| s.chars().nth(i))
        .expect("strIndex out of bounds")
}

/// `strRev(s)` — reverse by Unicode scalar value, not by byte.
pub fn str_rev(vm: &Vm, s: Value) -> Value {
    let reversed: String = std::str::from_utf8(bytes_of(s))
        .unwrap_or("")
        .chars()
        .rev()
        .collect();
    mk_str(vm, reversed.as_bytes())
}

/// `readStr()` — read one line from stdin, trimming the trailing newline,
/// matching the reference RTS's `getLine`-style primitive.
pub fn read_str(vm: &Vm) -> Value {
    let mut line = String::new();
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    let _ = lock.read_line(&mut line);
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    mk_str(vm, line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn test_vm() -> Vm {
        Vm::init(VmConfig::default()).unwrap()
    }

    #[test]
    fn eq_and_lt() {
        let vm = test_vm();
        let a = mk_str(&vm, b"abc");
        let b = mk_str(&vm, b"abd");
        assert!(str_eq(a, mk_str(&vm, b"abc")));
        assert!(str_lt(a, b));
        assert!(!str_lt(b, a));
    }

    #[test]
    fn len_counts_chars_not_bytes() {
        let vm = test_vm();
        let s = mk_str(&vm, "héllo".as_bytes());
        assert_eq!(str_len(s), 5);
    }

    #[test]
    fn head_and_tail_roundtrip_through_cons() {
        let vm = test_vm();
        let s = mk_str(&vm, b"hello");
        let head = str_head(s);
        let tail = str_tail(&vm, s);
        assert_eq!(head, 'h');
        let rebuilt = str_cons(&vm, head, tail);
        assert!(str_eq(rebuilt, s));
    }

    #[test]
    fn tail_falls_back_to_copy_when_heap_is_full() {
        let vm = Vm::init(VmConfig {
            heap_size: 256,
            ..VmConfig::default()
        })
        .unwrap();
        let s = mk_str(&vm, b"hello");
        // Exhaust headroom so a STROFFSET allocation (object::STROFFSET_SIZE
        // bytes) can no longer fit.
        while vm.heap_bytes_free() >= crate::object::STROFFSET_SIZE {
            let addr = vm.alloc(crate::object::con_size(0), 8);
            unsafe { crate::object::init_con(addr, 999, 0) };
        }
        let tail = str_tail(&vm, s);
        assert!(str_eq(tail, mk_str(&vm, b"ello")));
    }

    #[test]
    fn index_and_reverse() {
        let vm = test_vm();
        let s = mk_str(&vm, b"abcde");
        assert_eq!(str_index(s, 2), 'c');
        let rev = str_rev(&vm, s);
        assert!(str_eq(rev, mk_str(&vm, b"edcba")));
    }
}
