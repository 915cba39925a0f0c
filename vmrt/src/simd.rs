//! SIMD Module - fixed-width vector lane constructors
//!
//! `BITS8X16`/`BITS16X8`/`BITS32X4`/`BITS64X2` are 128-bit objects holding
//! 16/8/4/2 lanes respectively, each allocated 16-byte aligned
//! (spec.md §3). The collector copies their 16 payload bytes verbatim —
//! lane width only matters here, at construction and read time.

use crate::object;
use crate::value::{Tag, Value};
use crate::vm::Vm;

fn alloc_vector(vm: &Vm, tag: Tag, lanes: [u8; 16]) -> Value {
    let addr = vm.alloc(object::VECTOR_SIZE, 16);
    unsafe { object::init_vector(addr, tag, lanes) };
    Value::from_addr(addr)
}

fn lanes_of(value: Value) -> [u8; 16] {
    unsafe { *object::vector_bytes(value.addr()) }
}

/// `MKB8X16`.
pub fn mk_bits8x16(vm: &Vm, lanes: [u8; 16]) -> Value {
    alloc_vector(vm, Tag::Bits8x16, lanes)
}

/// `MKB16X8`.
pub fn mk_bits16x8(vm: &Vm, lanes: [u16; 8]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&lane.to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits16x8, bytes)
}

/// `MKB32X4`.
pub fn mk_bits32x4(vm: &Vm, lanes: [u32; 4]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&lane.to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits32x4, bytes)
}

/// `MKB64X2`.
pub fn mk_bits64x2(vm: &Vm, lanes: [u64; 2]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 8..i * 8 + 8].copy_from_slice(&lane.to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits64x2, bytes)
}

pub fn bits8x16_lanes(value: Value) -> [u8; 16] {
    lanes_of(value)
}

pub fn bits16x8_lanes(value: Value) -> [u16; 8] {
    let bytes = lanes_of(value);
    std::array::from_fn(|i| u16::from_ne_bytes([bytes[i * 2], bytes[i * 2 + 1]]))
}

pub fn bits32x4_lanes(value: Value) -> [u32; 4] {
    let bytes = lanes_of(value);
    std::array::from_fn(|i| {
        u32::from_ne_bytes([
            bytes[i * 4],
            bytes[i * 4 + 1],
            bytes[i * 4 + 2],
            bytes[i * 4 + 3],
        ])
    })
}

pub fn bits64x2_lanes(value: Value) -> [u64; 2] {
    let bytes = lanes_of(value);
    std::array::from_fn(|i| {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
        u64::from_ne_bytes(word)
    })
}

fn bits8_lane(value: Value) -> u8 {
    match unsafe { object::tag(value.addr()) } {
        Tag::Bits8 => unsafe { object::bits8_value(value.addr()) },
        other => object::unreachable_tag("bits8_lane", other),
    }
}

fn bits16_lane(value: Value) -> u16 {
    match unsafe { object::tag(value.addr()) } {
        Tag::Bits16 => unsafe { object::bits16_value(value.addr()) },
        other => object::unreachable_tag("bits16_lane", other),
    }
}

fn bits32_lane(value: Value) -> u32 {
    match unsafe { object::tag(value.addr()) } {
        Tag::Bits32 => unsafe { object::bits32_value(value.addr()) },
        other => object::unreachable_tag("bits32_lane", other),
    }
}

fn bits64_lane(value: Value) -> u64 {
    match unsafe { object::tag(value.addr()) } {
        Tag::Bits64 => unsafe { object::bits64_value(value.addr()) },
        other => object::unreachable_tag("bits64_lane", other),
    }
}

/// `MKB8X16`, alternate form — 16 tagged `BITS8` `Value`s instead of a raw
/// byte array, for callers that only have boxed lane values on hand.
pub fn mk_bits8x16_values(vm: &Vm, lanes: &[Value; 16]) -> Value {
    let bytes: [u8; 16] = std::array::from_fn(|i| bits8_lane(lanes[i]));
    alloc_vector(vm, Tag::Bits8x16, bytes)
}

/// `MKB16X8`, alternate form — 8 tagged `BITS16` `Value`s.
pub fn mk_bits16x8_values(vm: &Vm, lanes: &[Value; 8]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&bits16_lane(*lane).to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits16x8, bytes)
}

/// `MKB32X4`, alternate form — 4 tagged `BITS32` `Value`s.
pub fn mk_bits32x4_values(vm: &Vm, lanes: &[Value; 4]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&bits32_lane(*lane).to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits32x4, bytes)
}

/// `MKB64X2`, alternate form — 2 tagged `BITS64` `Value`s.
pub fn mk_bits64x2_values(vm: &Vm, lanes: &[Value; 2]) -> Value {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 8..i * 8 + 8].copy_from_slice(&bits64_lane(*lane).to_ne_bytes());
    }
    alloc_vector(vm, Tag::Bits64x2, bytes)
}

/// Extract a single lane's tag to check a value is in fact a vector
/// before an unsafe lane accessor is used elsewhere in the interpreter.
pub fn is_vector(value: Value) -> bool {
    matches!(
        unsafe { object::tag(value.addr()) },
        Tag::Bits8x16 | Tag::Bits16x8 | Tag::Bits32x4 | Tag::Bits64x2
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn test_vm() -> Vm {
        Vm::init(VmConfig::default()).unwrap()
    }

    #[test]
    fn b8x16_roundtrip() {
        let vm = test_vm();
        let lanes: [u8; 16] = std::array::from_fn(|i| i as u8);
        let v = mk_bits8x16(&vm, lanes);
        assert_eq!(bits8x16_lanes(v), lanes);
        assert!(is_vector(v));
    }

    #[test]
    fn b32x4_roundtrip() {
        let vm = test_vm();
        let lanes = [1u32, 2, 3, 4];
        let v = mk_bits32x4(&vm, lanes);
        assert_eq!(bits32x4_lanes(v), lanes);
    }

    #[test]
    fn b64x2_roundtrip() {
        let vm = test_vm();
        let lanes = [u64::MAX, 0];
        let v = mk_bits64x2(&vm, lanes);
        assert_eq!(bits64x2_lanes(v), lanes);
    }

    #[test]
    fn b8x16_values_form_matches_raw_array_form() {
        use crate::constructors::mk_bits8;

        let vm = test_vm();
        let raw: [u8; 16] = std::array::from_fn(|i| i as u8);
        let boxed: [Value; 16] = std::array::from_fn(|i| mk_bits8(&vm, raw[i]));
        let v = mk_bits8x16_values(&vm, &boxed);
        assert_eq!(bits8x16_lanes(v), raw);
    }

    #[test]
    fn b32x4_values_form_matches_raw_array_form() {
        use crate::constructors::mk_bits32;

        let vm = test_vm();
        let raw = [10u32, 20, 30, 40];
        let boxed: [Value; 4] = std::array::from_fn(|i| mk_bits32(&vm, raw[i]));
        let v = mk_bits32x4_values(&vm, &boxed);
        assert_eq!(bits32x4_lanes(v), raw);
    }

    #[test]
    fn vector_alloc_is_16_byte_aligned() {
        let vm = test_vm();
        let v = mk_bits8x16(&vm, [0; 16]);
        assert_eq!(v.addr() % 16, 0);
    }
}
