//! Buffer Module - mutable byte buffers with explicit endianness
//!
//! A BUFFER is a fixed-capacity byte array with a `fill` cursor
//! (spec.md §6). `append*` writes at `fill` and advances it; `peek*`
//! reads without moving anything. Every width has `Native`/`LE`/`BE`
//! variants because foreign-memory interop (the other half of this
//! module, spec.md §6's foreign memory ops) routinely needs an explicit
//! byte order regardless of the host's own.

use crate::error::{fatal_with, FatalKind};
use crate::object;
use crate::value::Value;
use crate::vm::Vm;

/// Byte order for a buffer read/write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Native,
    Little,
    Big,
}

fn data(value: Value) -> *mut u8 {
    unsafe { object::buffer_data_ptr(value.addr()) }
}

pub fn cap(value: Value) -> usize {
    unsafe { object::buffer_cap(value.addr()) }
}

pub fn fill(value: Value) -> usize {
    unsafe { object::buffer_fill(value.addr()) }
}

/// Fatal "out of bounds" for a read that would run past `cap` — growth
/// only ever applies to `append`, which is free to make more room; a
/// `peek` past the buffer's capacity is a genuine caller bug.
fn bounds_check(value: Value, offset: usize, width: usize) {
    if offset + width > cap(value) {
        fatal_with(
            FatalKind::UnreachableTag,
            &format!(
                "buffer access out of bounds: offset {} width {} cap {}",
                offset,
                width,
                cap(value)
            ),
        );
    }
}

/// Replace `value` with a freshly-allocated BUFFER big enough to hold
/// `needed` bytes, copying over everything written so far. Capacity
/// always grows to the next power of two so repeated appends amortize
/// to O(1), matching the doubling-buffer idiom spec.md §4.3 describes.
fn grow(vm: &Vm, value: Value, needed: usize) -> Value {
    let new_cap = needed.next_power_of_two();
    let new_buf = crate::constructors::mk_buffer(vm, new_cap);
    let fill_len = fill(value);
    unsafe {
        std::ptr::copy_nonoverlapping(data(value), data(new_buf), fill_len);
        object::set_buffer_fill(new_buf.addr(), fill_len);
    }
    new_buf
}

macro_rules! buffer_width {
    ($append:ident, $peek:ident, $ty:ty) => {
        /// Append a value at the current fill cursor, advancing it. Grows
        /// the buffer (a new, bigger BUFFER object) first if the write
        /// would overflow `cap` — the caller must keep using the returned
        /// `Value`, which is `value` unchanged unless a grow happened.
        pub fn $append(vm: &Vm, value: Value, v: $ty, endian: Endian) -> Value {
            let width = std::mem::size_of::<$ty>();
            let offset = fill(value);
            let value = if offset + width > cap(value) {
                grow(vm, value, offset + width)
            } else {
                value
            };
            let bytes = match endian {
                Endian::Native => v.to_ne_bytes(),
                Endian::Little => v.to_le_bytes(),
                Endian::Big => v.to_be_bytes(),
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    data(value).add(offset),
                    bytes.len(),
                );
                object::set_buffer_fill(value.addr(), offset + bytes.len());
            }
            value
        }

        /// Read a value at `offset` without moving the fill cursor.
        pub fn $peek(value: Value, offset: usize, endian: Endian) -> $ty {
            bounds_check(value, offset, std::mem::size_of::<$ty>());
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data(value).add(offset),
                    bytes.as_mut_ptr(),
                    bytes.len(),
                );
            }
            match endian {
                Endian::Native => <$ty>::from_ne_bytes(bytes),
                Endian::Little => <$ty>::from_le_bytes(bytes),
                Endian::Big => <$ty>::from_be_bytes(bytes),
            }
        }
    };
}

buffer_width!(append_b8, peek_b8, u8);
buffer_width!(append_b16, peek_b16, u16);
buffer_width!(append_b32, peek_b32, u32);
buffer_width!(append_b64, peek_b64, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::constructors::mk_buffer;
    use crate::vm::Vm;

    fn test_vm() -> Vm {
        Vm::init(VmConfig::default()).unwrap()
    }

    #[test]
    fn append_advances_fill_and_peek_reads_back() {
        let vm = test_vm();
        let buf = mk_buffer(&vm, 16);
        let buf = append_b32(&vm, buf, 0xdead_beef, Endian::Little);
        assert_eq!(fill(buf), 4);
        assert_eq!(peek_b32(buf, 0, Endian::Little), 0xdead_beef);
    }

    #[test]
    fn little_and_big_endian_disagree_on_byte_order() {
        let vm = test_vm();
        let buf = mk_buffer(&vm, 16);
        let buf = append_b16(&vm, buf, 0x1234, Endian::Little);
        assert_eq!(peek_b16(buf, 0, Endian::Big), 0x3412);
    }

    #[test]
    fn mixed_widths_pack_sequentially() {
        let vm = test_vm();
        let buf = mk_buffer(&vm, 16);
        let buf = append_b8(&vm, buf, 1, Endian::Native);
        let buf = append_b32(&vm, buf, 2, Endian::Native);
        assert_eq!(fill(buf), 5);
        assert_eq!(peek_b8(buf, 0, Endian::Native), 1);
        assert_eq!(peek_b32(buf, 1, Endian::Native), 2);
    }

    #[test]
    fn append_past_capacity_grows_and_preserves_contents() {
        let vm = test_vm();
        let buf = mk_buffer(&vm, 2);
        let buf = append_b8(&vm, buf, 0xaa, Endian::Native);
        let buf = append_b8(&vm, buf, 0xbb, Endian::Native);
        // a third byte overflows the original capacity of 2
        let buf = append_b8(&vm, buf, 0xcc, Endian::Native);
        assert!(cap(buf) >= 3);
        assert_eq!(fill(buf), 3);
        assert_eq!(peek_b8(buf, 0, Endian::Native), 0xaa);
        assert_eq!(peek_b8(buf, 1, Endian::Native), 0xbb);
        assert_eq!(peek_b8(buf, 2, Endian::Native), 0xcc);
    }
}
