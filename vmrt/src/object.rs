//! Object Module - raw heap object layout and accessors
//!
//! Every non-immediate [`crate::value::Value`] points at an `Object`: a
//! machine-word chunk size, then a machine-word tag, then tag-specific
//! payload (spec.md §3). Unlike the teacher's `object::header` (a 24-byte
//! mark-word/class-pointer/size header built for a concurrent colored-
//! pointer collector), this header carries no mark bits or age — this
//! collector is strictly stop-the-world copying, so liveness is implicit
//! in "did the scavenge reach it", not a per-object bit.
//!
//! Layout (24-byte header, 8-byte aligned; 16-byte aligned for vector
//! tags):
//!
//! ```text
//! offset 0:  chunk_size: usize   (total bytes, header included)
//! offset 8:  tag:        usize   (low byte is a valid Tag; FWD during GC)
//! offset 16: payload...          (first payload word doubles as the
//!                                 forwarding-pointer slot once tag==Fwd,
//!                                 so relocation never needs to grow an
//!                                 object to record where it moved)
//! ```

use crate::error::{fatal_with, FatalKind};
use crate::value::{Tag, Value};

/// Header size in bytes: chunk_size word + tag word.
pub const HEADER_SIZE: usize = 16;

/// Minimum total object size: header plus one payload word, which is the
/// slot every tag variant reserves for a forwarding pointer.
pub const MIN_CHUNK_SIZE: usize = HEADER_SIZE + 8;

/// Round `n` up to the next multiple of 8.
#[inline]
pub fn round8(n: usize) -> usize {
    (n + 7) & !7
}

/// Round `n` up to the next multiple of 16, for vector-lane allocations.
#[inline]
pub fn round16(n: usize) -> usize {
    (n + 15) & !15
}

#[inline]
unsafe fn read_usize(addr: usize, offset: usize) -> usize {
    std::ptr::read((addr + offset) as *const usize)
}

#[inline]
unsafe fn write_usize(addr: usize, offset: usize, value: usize) {
    std::ptr::write((addr + offset) as *mut usize, value)
}

/// Read the chunk size (total bytes, header included) at `addr`.
///
/// # Safety
/// `addr` must point at a live object header inside some VM's heap.
pub unsafe fn chunk_size(addr: usize) -> usize {
    read_usize(addr, 0)
}

/// Write the chunk size at `addr`.
///
/// # Safety
/// See [`chunk_size`].
pub unsafe fn set_chunk_size(addr: usize, size: usize) {
    write_usize(addr, 0, size)
}

/// Read the tag at `addr`.
///
/// # Safety
/// See [`chunk_size`].
pub unsafe fn tag(addr: usize) -> Tag {
    Tag::from_u8(read_usize(addr, 8) as u8)
}

/// Write the tag at `addr`.
///
/// # Safety
/// See [`chunk_size`].
pub unsafe fn set_tag(addr: usize, t: Tag) {
    write_usize(addr, 8, t as usize)
}

/// True if `addr` currently carries a forwarding tag (only valid mid-GC,
/// per spec.md §3's "a FWD tag never appears outside a collection cycle").
///
/// # Safety
/// See [`chunk_size`].
pub unsafe fn is_forwarded(addr: usize) -> bool {
    matches!(tag(addr), Tag::Fwd)
}

/// Read the forwarding target stamped over `addr`'s first payload word.
///
/// # Safety
/// Caller must have checked [`is_forwarded`].
pub unsafe fn forwarding_target(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// Stamp `addr`'s header with a FWD tag pointing at `new_addr`. This is
/// the collector's `copy(); overwrite header with FWD` step (spec.md §4.2).
///
/// # Safety
/// See [`chunk_size`]. `addr` must have at least [`MIN_CHUNK_SIZE`] bytes
/// reserved, which every allocator entry point in [`crate::heap`]
/// guarantees.
pub unsafe fn set_forwarded(addr: usize, new_addr: usize) {
    set_tag(addr, Tag::Fwd);
    write_usize(addr, HEADER_SIZE, new_addr);
}

// ---------------------------------------------------------------------
// CON: packed (tag << 8 | arity) then `arity` Values
// ---------------------------------------------------------------------

/// Pack a constructor's user-level tag and field count into the 32-bit
/// word spec.md §3 describes.
#[inline]
pub fn pack_con(con_tag: u32, arity: u32) -> u32 {
    (con_tag << 8) | (arity & 0xff)
}

/// Unpack `(con_tag, arity)` from a packed CON word.
#[inline]
pub fn unpack_con(packed: u32) -> (u32, u32) {
    (packed >> 8, packed & 0xff)
}

/// Total bytes a CON of the given arity occupies.
#[inline]
pub fn con_size(arity: u32) -> usize {
    round8(HEADER_SIZE + 8 + arity as usize * 8)
}

/// # Safety
/// `addr` must be a live CON object.
pub unsafe fn con_packed(addr: usize) -> u32 {
    read_usize(addr, HEADER_SIZE) as u32
}

/// # Safety
/// See [`con_packed`].
pub unsafe fn con_arity(addr: usize) -> u32 {
    unpack_con(con_packed(addr)).1
}

/// # Safety
/// See [`con_packed`].
pub unsafe fn con_user_tag(addr: usize) -> u32 {
    unpack_con(con_packed(addr)).0
}

/// Address of CON field `i` (0-based), `addr + HEADER + 8 + 8*i`.
///
/// # Safety
/// `i` must be `< con_arity(addr)`.
#[inline]
pub unsafe fn con_field_addr(addr: usize, i: u32) -> usize {
    addr + HEADER_SIZE + 8 + i as usize * 8
}

/// # Safety
/// See [`con_field_addr`].
pub unsafe fn con_field(addr: usize, i: u32) -> Value {
    Value::from_raw(read_usize(addr, HEADER_SIZE + 8 + i as usize * 8))
}

/// # Safety
/// See [`con_field_addr`].
pub unsafe fn set_con_field(addr: usize, i: u32, v: Value) {
    write_usize(addr, HEADER_SIZE + 8 + i as usize * 8, v.raw())
}

/// Initialize a freshly-allocated CON's header and packed word. Fields are
/// left zeroed (the allocator zero-fills) until the caller sets them.
///
/// # Safety
/// `addr` must own at least `con_size(arity)` bytes.
pub unsafe fn init_con(addr: usize, con_tag: u32, arity: u32) {
    set_chunk_size(addr, con_size(arity));
    set_tag(addr, Tag::Con);
    write_usize(addr, HEADER_SIZE, pack_con(con_tag, arity) as usize);
}

// ---------------------------------------------------------------------
// FLOAT
// ---------------------------------------------------------------------

pub const FLOAT_SIZE: usize = HEADER_SIZE + 8;

/// # Safety
/// `addr` must be a live FLOAT object.
pub unsafe fn float_value(addr: usize) -> f64 {
    f64::from_bits(read_usize(addr, HEADER_SIZE) as u64)
}

/// # Safety
/// `addr` must own at least [`FLOAT_SIZE`] bytes.
pub unsafe fn init_float(addr: usize, value: f64) {
    set_chunk_size(addr, FLOAT_SIZE);
    set_tag(addr, Tag::Float);
    write_usize(addr, HEADER_SIZE, value.to_bits() as usize);
}

// ---------------------------------------------------------------------
// STRING: inline NUL-terminated bytes immediately after the header
// ---------------------------------------------------------------------

/// Total bytes a string of `len` bytes (excluding the NUL) occupies.
#[inline]
pub fn string_size(len: usize) -> usize {
    round8(HEADER_SIZE.max(MIN_CHUNK_SIZE) + len + 1)
}

/// # Safety
/// `addr` must be a live STRING object.
pub unsafe fn string_len(addr: usize) -> usize {
    let data = (addr + HEADER_SIZE) as *const u8;
    let mut len = 0usize;
    while *data.add(len) != 0 {
        len += 1;
    }
    len
}

/// # Safety
/// See [`string_len`].
pub unsafe fn string_bytes<'a>(addr: usize) -> &'a [u8] {
    let len = string_len(addr);
    std::slice::from_raw_parts((addr + HEADER_SIZE) as *const u8, len)
}

/// # Safety
/// `addr` must own at least `string_size(bytes.len())` bytes.
pub unsafe fn init_string(addr: usize, bytes: &[u8]) {
    set_chunk_size(addr, string_size(bytes.len()));
    set_tag(addr, Tag::Str);
    let data = (addr + HEADER_SIZE) as *mut u8;
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
    *data.add(bytes.len()) = 0;
}

// ---------------------------------------------------------------------
// STROFFSET: (root: Object*, offset: usize)
// ---------------------------------------------------------------------

pub const STROFFSET_SIZE: usize = HEADER_SIZE + 16;

/// # Safety
/// `addr` must be a live STROFFSET object.
pub unsafe fn stroffset_root(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// # Safety
/// See [`stroffset_root`].
pub unsafe fn stroffset_offset(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE + 8)
}

/// Update a STROFFSET's root pointer in place, used by the collector once
/// it has relocated the root string (spec.md §4.6).
///
/// # Safety
/// `addr` must be a live STROFFSET object.
pub unsafe fn set_stroffset_root(addr: usize, root: usize) {
    write_usize(addr, HEADER_SIZE, root)
}

/// # Safety
/// `addr` must own at least [`STROFFSET_SIZE`] bytes. `root` must already
/// be flattened (spec.md §4.6: chains collapse to depth 1), i.e. `root`
/// must itself be a STRING, never another STROFFSET.
pub unsafe fn init_stroffset(addr: usize, root: usize, offset: usize) {
    set_chunk_size(addr, STROFFSET_SIZE);
    set_tag(addr, Tag::StrOffset);
    write_usize(addr, HEADER_SIZE, root);
    write_usize(addr, HEADER_SIZE + 8, offset);
}

// ---------------------------------------------------------------------
// BIGINT: opaque handle into an external arena (out of scope, spec.md §1)
// ---------------------------------------------------------------------

pub const BIGINT_SIZE: usize = HEADER_SIZE + 8;

/// # Safety
/// `addr` must be a live BIGINT object.
pub unsafe fn bigint_handle(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// # Safety
/// `addr` must own at least [`BIGINT_SIZE`] bytes.
pub unsafe fn init_bigint(addr: usize, handle: usize) {
    set_chunk_size(addr, BIGINT_SIZE);
    set_tag(addr, Tag::BigInt);
    write_usize(addr, HEADER_SIZE, handle);
}

// ---------------------------------------------------------------------
// PTR: raw foreign pointer, unmanaged payload
// ---------------------------------------------------------------------

pub const PTR_SIZE: usize = HEADER_SIZE + 8;

/// # Safety
/// `addr` must be a live PTR object.
pub unsafe fn ptr_value(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// # Safety
/// `addr` must own at least [`PTR_SIZE`] bytes.
pub unsafe fn init_ptr(addr: usize, raw: usize) {
    set_chunk_size(addr, PTR_SIZE);
    set_tag(addr, Tag::Ptr);
    write_usize(addr, HEADER_SIZE, raw);
}

// ---------------------------------------------------------------------
// MANAGEDPTR: inline-owned byte block with size
// ---------------------------------------------------------------------

#[inline]
pub fn managed_ptr_size(len: usize) -> usize {
    round8(HEADER_SIZE + 8 + len)
}

/// # Safety
/// `addr` must be a live MANAGEDPTR object.
pub unsafe fn managed_ptr_len(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// # Safety
/// See [`managed_ptr_len`].
pub unsafe fn managed_ptr_bytes<'a>(addr: usize) -> &'a [u8] {
    let len = managed_ptr_len(addr);
    std::slice::from_raw_parts((addr + HEADER_SIZE + 8) as *const u8, len)
}

/// # Safety
/// `addr` must own at least `managed_ptr_size(bytes.len())` bytes.
pub unsafe fn init_managed_ptr(addr: usize, bytes: &[u8]) {
    set_chunk_size(addr, managed_ptr_size(bytes.len()));
    set_tag(addr, Tag::ManagedPtr);
    write_usize(addr, HEADER_SIZE, bytes.len());
    std::ptr::copy_nonoverlapping(
        bytes.as_ptr(),
        (addr + HEADER_SIZE + 8) as *mut u8,
        bytes.len(),
    );
}

// ---------------------------------------------------------------------
// BITS8 / BITS16 / BITS32 / BITS64
// ---------------------------------------------------------------------

macro_rules! bits_scalar {
    ($read:ident, $write:ident, $init:ident, $ty:ty, $tag:expr) => {
        /// # Safety
        /// `addr` must be a live object of the matching tag.
        pub unsafe fn $read(addr: usize) -> $ty {
            std::ptr::read((addr + HEADER_SIZE) as *const $ty)
        }

        /// # Safety
        /// See [`$read`].
        pub unsafe fn $write(addr: usize, value: $ty) {
            std::ptr::write((addr + HEADER_SIZE) as *mut $ty, value)
        }

        /// # Safety
        /// `addr` must own at least `HEADER_SIZE + 8` bytes.
        pub unsafe fn $init(addr: usize, value: $ty) {
            set_chunk_size(addr, round8(HEADER_SIZE + std::mem::size_of::<$ty>()));
            set_tag(addr, $tag);
            $write(addr, value);
        }
    };
}

bits_scalar!(bits8_value, set_bits8_value, init_bits8, u8, Tag::Bits8);
bits_scalar!(bits16_value, set_bits16_value, init_bits16, u16, Tag::Bits16);
bits_scalar!(bits32_value, set_bits32_value, init_bits32, u32, Tag::Bits32);
bits_scalar!(bits64_value, set_bits64_value, init_bits64, u64, Tag::Bits64);

// ---------------------------------------------------------------------
// Vector lanes: BITS8X16, BITS16X8, BITS32X4, BITS64X2 (16-byte aligned)
// ---------------------------------------------------------------------

pub const VECTOR_SIZE: usize = HEADER_SIZE + 16;

/// # Safety
/// `addr` must be a live vector object and `addr` itself must be 16-byte
/// aligned (spec.md §3: "128-bit vector allocations are 16-byte aligned").
pub unsafe fn vector_bytes<'a>(addr: usize) -> &'a [u8; 16] {
    &*((addr + HEADER_SIZE) as *const [u8; 16])
}

/// # Safety
/// See [`vector_bytes`].
pub unsafe fn vector_bytes_mut<'a>(addr: usize) -> &'a mut [u8; 16] {
    &mut *((addr + HEADER_SIZE) as *mut [u8; 16])
}

/// # Safety
/// `addr` must own [`VECTOR_SIZE`] bytes and be 16-byte aligned.
pub unsafe fn init_vector(addr: usize, tag: Tag, lanes: [u8; 16]) {
    debug_assert!(matches!(
        tag,
        Tag::Bits8x16 | Tag::Bits16x8 | Tag::Bits32x4 | Tag::Bits64x2
    ));
    set_chunk_size(addr, VECTOR_SIZE);
    set_tag(addr, tag);
    *vector_bytes_mut(addr) = lanes;
}

// ---------------------------------------------------------------------
// BUFFER: (cap, fill) then `cap` bytes
// ---------------------------------------------------------------------

#[inline]
pub fn buffer_size(cap: usize) -> usize {
    round8(HEADER_SIZE + 16 + cap)
}

/// # Safety
/// `addr` must be a live BUFFER object.
pub unsafe fn buffer_cap(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE)
}

/// # Safety
/// See [`buffer_cap`].
pub unsafe fn buffer_fill(addr: usize) -> usize {
    read_usize(addr, HEADER_SIZE + 8)
}

/// # Safety
/// See [`buffer_cap`].
pub unsafe fn set_buffer_fill(addr: usize, fill: usize) {
    write_usize(addr, HEADER_SIZE + 8, fill)
}

/// # Safety
/// See [`buffer_cap`].
pub unsafe fn buffer_data_ptr(addr: usize) -> *mut u8 {
    (addr + HEADER_SIZE + 16) as *mut u8
}

/// # Safety
/// `addr` must own at least `buffer_size(cap)` bytes.
pub unsafe fn init_buffer(addr: usize, cap: usize) {
    set_chunk_size(addr, buffer_size(cap));
    set_tag(addr, Tag::Buffer);
    write_usize(addr, HEADER_SIZE, cap);
    write_usize(addr, HEADER_SIZE + 8, 0);
}

/// Raise a fatal "unreachable tag" error for a cast/copy site that hit a
/// tag it doesn't know how to handle. Spec.md §7: "Unreachable tag in copy
/// or cast — assertion / diagnostic, fatal exit."
pub fn unreachable_tag(site: &str, t: Tag) -> ! {
    fatal_with(FatalKind::UnreachableTag, &format!("{}: {:?}", site, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc_scratch(size: usize) -> usize {
        let buf = vec![0u8; size].into_boxed_slice();
        let addr = Box::leak(buf).as_mut_ptr() as usize;
        addr
    }

    #[test]
    fn con_pack_unpack_roundtrip() {
        let packed = pack_con(200, 3);
        assert_eq!(unpack_con(packed), (200, 3));
    }

    #[test]
    fn con_header_roundtrip() {
        let addr = alloc_scratch(con_size(2));
        unsafe {
            init_con(addr, 7, 2);
            set_con_field(addr, 0, Value::int(1));
            set_con_field(addr, 1, Value::int(2));

            assert_eq!(con_user_tag(addr), 7);
            assert_eq!(con_arity(addr), 2);
            assert_eq!(con_field(addr, 0).as_int(), 1);
            assert_eq!(con_field(addr, 1).as_int(), 2);
        }
    }

    #[test]
    fn float_roundtrip() {
        let addr = alloc_scratch(FLOAT_SIZE);
        unsafe {
            init_float(addr, 3.5);
            assert_eq!(float_value(addr), 3.5);
        }
    }

    #[test]
    fn string_roundtrip() {
        let addr = alloc_scratch(string_size(5));
        unsafe {
            init_string(addr, b"hello");
            assert_eq!(string_len(addr), 5);
            assert_eq!(string_bytes(addr), b"hello");
        }
    }

    #[test]
    fn forwarding_reuses_first_payload_word() {
        let addr = alloc_scratch(con_size(0));
        unsafe {
            init_con(addr, 1, 0);
            assert!(!is_forwarded(addr));
            set_forwarded(addr, 0xdead_beef);
            assert!(is_forwarded(addr));
            assert_eq!(forwarding_target(addr), 0xdead_beef);
        }
    }

    #[test]
    fn buffer_roundtrip() {
        let addr = alloc_scratch(buffer_size(8));
        unsafe {
            init_buffer(addr, 8);
            assert_eq!(buffer_cap(addr), 8);
            assert_eq!(buffer_fill(addr), 0);
            set_buffer_fill(addr, 4);
            assert_eq!(buffer_fill(addr), 4);
        }
    }
}
