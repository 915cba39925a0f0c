//! Value Module - the uniform tagged word
//!
//! Every stack slot, register, and object field is a [`Value`]: either a
//! small-integer immediate or a pointer into the owning VM's active
//! semi-space. Spec.md §3 requires an immediate range of at least ±2^30;
//! the `(n << 1) | 1` encoding used here gives a full word minus one bit,
//! a strict superset.
//!
//! `Value` wraps a `usize` address rather than a raw pointer, following the
//! teacher's own choice (`fgc::heap::Heap` hands out `usize` addresses, not
//! `*mut u8`) — it keeps `Value` `Send`, which a type that crosses VM
//! threads inside a mailbox message must be.

use std::fmt;

/// Least-significant-bit tag: set means immediate small integer, clear
/// means heap pointer.
const IMMEDIATE_TAG: usize = 1;

/// A tagged reference: small integer immediate, or pointer to an [`Object`](crate::object::Object).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(usize);

impl Value {
    /// Wrap a small integer as an immediate `Value`.
    #[inline]
    pub fn int(n: i64) -> Self {
        Value(((n as usize) << 1) | IMMEDIATE_TAG)
    }

    /// Wrap a heap address as a pointer `Value`. `addr` must be 8-byte
    /// aligned, which every allocation in `vmrt::heap` guarantees.
    #[inline]
    pub fn from_addr(addr: usize) -> Self {
        debug_assert_eq!(addr & IMMEDIATE_TAG, 0, "heap addresses must be even");
        Value(addr)
    }

    /// True if this value is a small-integer immediate rather than a
    /// pointer.
    #[inline]
    pub fn is_int(self) -> bool {
        self.0 & IMMEDIATE_TAG != 0
    }

    /// Decode the immediate integer. Caller must have checked [`Value::is_int`].
    #[inline]
    pub fn as_int(self) -> i64 {
        debug_assert!(self.is_int());
        (self.0 as isize >> 1) as i64
    }

    /// Raw heap address this value points to. Caller must have checked
    /// `!self.is_int()`.
    #[inline]
    pub fn addr(self) -> usize {
        debug_assert!(!self.is_int());
        self.0
    }

    /// Raw bit pattern, used when a value must be stored verbatim (mailbox
    /// entries, stack slots) without interpretation.
    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }

    /// Reconstruct a `Value` from a raw bit pattern previously obtained
    /// from [`Value::raw`].
    #[inline]
    pub fn from_raw(raw: usize) -> Self {
        Value(raw)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "Value::Int({})", self.as_int())
        } else {
            write!(f, "Value::Ptr({:#x})", self.0)
        }
    }
}

/// `ClosureType` — the exhaustive tag set for heap objects, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Con = 0,
    Float = 1,
    Str = 2,
    StrOffset = 3,
    BigInt = 4,
    Ptr = 5,
    ManagedPtr = 6,
    Bits8 = 7,
    Bits16 = 8,
    Bits32 = 9,
    Bits64 = 10,
    Bits8x16 = 11,
    Bits16x8 = 12,
    Bits32x4 = 13,
    Bits64x2 = 14,
    Buffer = 15,
    Fwd = 16,
}

impl Tag {
    /// Decode a tag byte written into an object header.
    ///
    /// # Panics
    /// Panics via [`crate::error::fatal`] if the byte is not a valid tag —
    /// spec.md §7 classifies this as an "unreachable tag" condition.
    pub fn from_u8(byte: u8) -> Tag {
        match byte {
            0 => Tag::Con,
            1 => Tag::Float,
            2 => Tag::Str,
            3 => Tag::StrOffset,
            4 => Tag::BigInt,
            5 => Tag::Ptr,
            6 => Tag::ManagedPtr,
            7 => Tag::Bits8,
            8 => Tag::Bits16,
            9 => Tag::Bits32,
            10 => Tag::Bits64,
            11 => Tag::Bits8x16,
            12 => Tag::Bits16x8,
            13 => Tag::Bits32x4,
            14 => Tag::Bits64x2,
            15 => Tag::Buffer,
            16 => Tag::Fwd,
            other => crate::error::fatal_with(
                crate::error::FatalKind::UnreachableTag,
                &format!("tag byte {}", other),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        for n in [-1_000_000_000i64, -1, 0, 1, 1_000_000_000] {
            let v = Value::int(n);
            assert!(v.is_int());
            assert_eq!(v.as_int(), n);
        }
    }

    #[test]
    fn ptr_roundtrip() {
        let v = Value::from_addr(0x1000);
        assert!(!v.is_int());
        assert_eq!(v.addr(), 0x1000);
    }

    #[test]
    fn raw_roundtrip() {
        let v = Value::int(42);
        assert_eq!(Value::from_raw(v.raw()), v);
    }

    #[test]
    fn tag_roundtrip() {
        for byte in 0u8..=16 {
            let tag = Tag::from_u8(byte);
            assert_eq!(tag as u8, byte);
        }
    }
}
