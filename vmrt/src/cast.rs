//! Cast Module - numeric/string conversions (spec.md §6)
//!
//! The widths below are the maximum decimal digit counts of each unsigned
//! bit width (`2^8-1` is 3 digits, `2^64-1` is 20), used to size a
//! stack-local format buffer the way the reference RTS sizes its `char
//! buf[]` before `snprintf` — so `cast_bitsN_to_str` never needs a heap
//! scratch allocation before the final `mk_str`.

use crate::constructors::{bigint_handle, bits16_value, bits32_value, bits64_value, bits8_value};
use crate::constructors::{float_value, mk_bigint, mk_bits16, mk_bits32, mk_bits64, mk_bits8};
use crate::constructors::{mk_float, mk_str, str_bytes};
use crate::value::Value;
use crate::vm::Vm;
use std::io::Write as _;

/// Max decimal digits for a `u8` (255).
pub const BITS8_STR_WIDTH: usize = 3;
/// Max decimal digits for a `u16` (65535).
pub const BITS16_STR_WIDTH: usize = 5;
/// Max decimal digits for a `u32` (4294967295).
pub const BITS32_STR_WIDTH: usize = 10;
/// Max decimal digits for a `u64` (18446744073709551615).
pub const BITS64_STR_WIDTH: usize = 20;

fn format_into_str<const N: usize>(vm: &Vm, value: impl std::fmt::Display) -> Value {
    let mut buf = [0u8; N];
    let mut cursor = &mut buf[..];
    write!(cursor, "{}", value).expect("formatted width fits the reserved buffer");
    let written = N - cursor.len();
    mk_str(vm, &buf[..written])
}

/// `cast_bits8_str`.
pub fn cast_bits8_str(vm: &Vm, v: Value) -> Value {
    format_into_str::<BITS8_STR_WIDTH>(vm, bits8_value(v))
}
/// `cast_bits16_str`.
pub fn cast_bits16_str(vm: &Vm, v: Value) -> Value {
    format_into_str::<BITS16_STR_WIDTH>(vm, bits16_value(v))
}
/// `cast_bits32_str`.
pub fn cast_bits32_str(vm: &Vm, v: Value) -> Value {
    format_into_str::<BITS32_STR_WIDTH>(vm, bits32_value(v))
}
/// `cast_bits64_str`.
pub fn cast_bits64_str(vm: &Vm, v: Value) -> Value {
    format_into_str::<BITS64_STR_WIDTH>(vm, bits64_value(v))
}

fn parse_str(v: Value) -> &'static str {
    std::str::from_utf8(str_bytes(v)).unwrap_or("")
}

/// `cast_str_bits8` — best-effort parse, `0` on failure (matching the
/// reference RTS's non-panicking numeric casts).
pub fn cast_str_bits8(vm: &Vm, v: Value) -> Value {
    mk_bits8(vm, parse_str(v).trim().parse().unwrap_or(0))
}
pub fn cast_str_bits16(vm: &Vm, v: Value) -> Value {
    mk_bits16(vm, parse_str(v).trim().parse().unwrap_or(0))
}
pub fn cast_str_bits32(vm: &Vm, v: Value) -> Value {
    mk_bits32(vm, parse_str(v).trim().parse().unwrap_or(0))
}
pub fn cast_str_bits64(vm: &Vm, v: Value) -> Value {
    mk_bits64(vm, parse_str(v).trim().parse().unwrap_or(0))
}

/// `cast_int_float` — small-integer immediate to FLOAT.
pub fn cast_int_float(vm: &Vm, v: Value) -> Value {
    mk_float(vm, v.as_int() as f64)
}

/// `cast_float_int` — FLOAT to small-integer immediate, truncating
/// toward zero.
pub fn cast_float_int(v: Value) -> Value {
    Value::int(float_value(v) as i64)
}

/// `cast_int_str`.
pub fn cast_int_str(vm: &Vm, v: Value) -> Value {
    mk_str(vm, v.as_int().to_string().as_bytes())
}

/// `cast_str_int` — `0` on a malformed string.
pub fn cast_str_int(v: Value) -> Value {
    Value::int(parse_str(v).trim().parse().unwrap_or(0))
}

/// `cast_float_str`.
pub fn cast_float_str(vm: &Vm, v: Value) -> Value {
    mk_str(vm, float_value(v).to_string().as_bytes())
}

/// `cast_str_float` — `0.0` on a malformed string.
pub fn cast_str_float(vm: &Vm, v: Value) -> Value {
    mk_float(vm, parse_str(v).trim().parse().unwrap_or(0.0))
}

/// `cast_bigint_str` — delegates formatting to the external bigint arena
/// via its opaque handle; out of scope beyond the handle pass-through
/// (spec.md §1's Non-goals exclude arbitrary-precision arithmetic).
pub fn cast_bigint_handle(v: Value) -> usize {
    bigint_handle(v)
}

pub fn mk_bigint_from_handle(vm: &Vm, handle: usize) -> Value {
    mk_bigint(vm, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn test_vm() -> Vm {
        Vm::init(VmConfig::default()).unwrap()
    }

    #[test]
    fn bits_to_str_roundtrips_through_parse() {
        let vm = test_vm();
        let s = cast_bits32_str(&vm, mk_bits32(&vm, 123456));
        assert_eq!(parse_str(s), "123456");
    }

    #[test]
    fn str_to_bits_parses() {
        let vm = test_vm();
        let s = mk_str(&vm, b"200");
        assert_eq!(bits8_value(cast_str_bits8(&vm, s)), 200);
    }

    #[test]
    fn int_float_roundtrip() {
        let vm = test_vm();
        let f = cast_int_float(&vm, Value::int(7));
        assert_eq!(float_value(f), 7.0);
        assert_eq!(cast_float_int(f).as_int(), 7);
    }

    #[test]
    fn malformed_str_to_int_is_zero() {
        let vm = test_vm();
        let s = mk_str(&vm, b"not a number");
        assert_eq!(cast_str_int(s).as_int(), 0);
    }
}
