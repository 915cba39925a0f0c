//! C ABI Module - the `extern "C"` surface over `vmrt`
//!
//! Every function here is a thin, panic-free wrapper: unwrap a raw
//! pointer, call into `vmrt`, hand back a raw `Value` bit pattern or a
//! raw VM pointer. Grounded on `faxc-runtime::gc`'s `fax_gc_*`/
//! `fax_string_*` wrapper style (one `#[no_mangle] extern "C" fn` per
//! primitive, raw pointers in and out, no panics crossing the FFI
//! boundary), adapted from Fax's NUL-terminated-pointer string
//! convention to `vmrt`'s tagged `Value` words — a C caller holds a
//! `usize` Value bit pattern the same way it would hold any other
//! opaque handle, never a typed pointer into the heap.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use vmrt::constructors;
use vmrt::value::Value;
use vmrt::vm::Vm;

fn raw_in(v: usize) -> Value {
    Value::from_raw(v)
}

fn raw_out(v: Value) -> usize {
    v.raw()
}

fn vm_ref<'a>(vm: *const Vm) -> &'a Vm {
    assert!(!vm.is_null(), "null VM handle passed across FFI boundary");
    unsafe { &*vm }
}

/// `init_vm(stack_size, heap_size, max_threads)`. Returns a heap-owned
/// `Vm*` the caller must eventually pass to `vmrt_terminate`.
#[no_mangle]
pub extern "C" fn vmrt_init_vm(stack_size: usize, heap_size: usize, max_threads: usize) -> *mut Vm {
    let config = vmrt::VmConfig {
        stack_size,
        heap_size,
        max_threads,
        ..vmrt::VmConfig::default()
    };
    match Vm::init(config) {
        Ok(vm) => Box::into_raw(Box::new(vm)),
        Err(e) => {
            log::error!("vmrt_init_vm failed: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// `idris_vm()` — the reference RTS's zero-argument convenience
/// constructor.
#[no_mangle]
pub extern "C" fn vmrt_idris_vm() -> *mut Vm {
    match Vm::idris_vm() {
        Ok(vm) => Box::into_raw(Box::new(vm)),
        Err(e) => {
            log::error!("vmrt_idris_vm failed: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// `terminate(vm)`. `vm` must not be used again after this call.
///
/// # Safety
/// `vm` must be a pointer previously returned by `vmrt_init_vm` or
/// `vmrt_idris_vm`, not already terminated.
#[no_mangle]
pub unsafe extern "C" fn vmrt_terminate(vm: *mut Vm) {
    if vm.is_null() {
        return;
    }
    Box::from_raw(vm).terminate();
}

/// `MKCON(vm, tag, arity)`.
///
/// # Safety
/// `vm` must be a live `Vm*`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_mk_con(vm: *const Vm, tag: u32, arity: u32) -> usize {
    raw_out(constructors::mk_con(vm_ref(vm), tag, arity))
}

/// # Safety
/// `value` must be a CON `Value`, `i < arity`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_con_field(value: usize, i: u32) -> usize {
    raw_out(constructors::con_field(raw_in(value), i))
}

/// # Safety
/// `value` must be a CON `Value`, `i < arity`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_set_con_field(value: usize, i: u32, field: usize) {
    constructors::set_con_field(raw_in(value), i, raw_in(field));
}

#[no_mangle]
pub extern "C" fn vmrt_mk_int(n: i64) -> usize {
    raw_out(Value::int(n))
}

#[no_mangle]
pub extern "C" fn vmrt_as_int(value: usize) -> i64 {
    raw_in(value).as_int()
}

/// # Safety
/// `vm` must be a live `Vm*`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_mk_float(vm: *const Vm, d: f64) -> usize {
    raw_out(constructors::mk_float(vm_ref(vm), d))
}

/// # Safety
/// `value` must be a FLOAT `Value`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_float_value(value: usize) -> f64 {
    constructors::float_value(raw_in(value))
}

/// `MKSTR(vm, bytes, len)`.
///
/// # Safety
/// `vm` must be live; `bytes` must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn vmrt_mk_str(vm: *const Vm, bytes: *const u8, len: usize) -> usize {
    let slice = std::slice::from_raw_parts(bytes, len);
    raw_out(constructors::mk_str(vm_ref(vm), slice))
}

/// # Safety
/// `value` must resolve to a STRING through at most one STROFFSET hop.
#[no_mangle]
pub unsafe extern "C" fn vmrt_str_len(value: usize) -> usize {
    vmrt::strings::str_len(raw_in(value))
}

/// Pointer to the first byte this string value reads from (already
/// offset-adjusted). Valid only until `value`'s VM performs its next
/// allocation (a collection may relocate the backing object).
///
/// # Safety
/// See [`vmrt_str_len`].
#[no_mangle]
pub unsafe extern "C" fn vmrt_str_ptr(value: usize) -> *const u8 {
    let v = raw_in(value);
    let full = constructors::str_bytes(v);
    let offset = constructors::str_offset(v);
    full[offset..].as_ptr()
}

/// # Safety
/// `vm` must be live.
#[no_mangle]
pub unsafe extern "C" fn vmrt_mk_buffer(vm: *const Vm, cap: usize) -> usize {
    raw_out(constructors::mk_buffer(vm_ref(vm), cap))
}

#[no_mangle]
pub extern "C" fn vmrt_buffer_cap(value: usize) -> usize {
    vmrt::buffer::cap(raw_in(value))
}

#[no_mangle]
pub extern "C" fn vmrt_buffer_fill(value: usize) -> usize {
    vmrt::buffer::fill(raw_in(value))
}

fn endian_of(code: c_int) -> vmrt::buffer::Endian {
    match code {
        1 => vmrt::buffer::Endian::Little,
        2 => vmrt::buffer::Endian::Big,
        _ => vmrt::buffer::Endian::Native,
    }
}

/// `appendB32(buffer, value, endian)`. `endian`: 0 native, 1 LE, 2 BE.
/// Returns the buffer `Value` to keep using — appending past capacity
/// allocates a bigger replacement, so the caller must rebind to this.
///
/// # Safety
/// `vm` must be a live `Vm*`.
#[no_mangle]
pub unsafe extern "C" fn vmrt_buffer_append_b32(vm: *const Vm, value: usize, v: u32, endian: c_int) -> usize {
    raw_out(vmrt::buffer::append_b32(vm_ref(vm), raw_in(value), v, endian_of(endian)))
}

/// `peekB32(buffer, offset, endian)`.
#[no_mangle]
pub extern "C" fn vmrt_buffer_peek_b32(value: usize, offset: usize, endian: c_int) -> u32 {
    vmrt::buffer::peek_b32(raw_in(value), offset, endian_of(endian))
}

/// `system_info(index)` as an owned, NUL-terminated C string the caller
/// must release with `vmrt_free_cstring`. Returns null for an
/// out-of-range index.
#[no_mangle]
pub extern "C" fn vmrt_system_info(index: u32) -> *mut c_char {
    match vmrt::sysinfo::system_info(index) {
        Some(s) => CString::new(s)
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

/// Release a string returned by [`vmrt_system_info`].
///
/// # Safety
/// `s` must be a pointer previously returned by `vmrt_system_info`, not
/// already freed.
#[no_mangle]
pub unsafe extern "C" fn vmrt_free_cstring(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_and_terminate_roundtrip() {
        let vm = vmrt_init_vm(4096, 8192, 1);
        assert!(!vm.is_null());
        unsafe { vmrt_terminate(vm) };
    }

    #[test]
    fn con_field_roundtrip_through_ffi() {
        let vm = vmrt_init_vm(4096, 8192, 1);
        unsafe {
            let con = vmrt_mk_con(vm, 3, 1);
            vmrt_set_con_field(con, 0, vmrt_mk_int(42));
            assert_eq!(vmrt_as_int(vmrt_con_field(con, 0)), 42);
            vmrt_terminate(vm);
        }
    }

    #[test]
    fn string_ptr_matches_bytes() {
        let vm = vmrt_init_vm(4096, 8192, 1);
        unsafe {
            let s = vmrt_mk_str(vm, b"hi".as_ptr(), 2);
            assert_eq!(vmrt_str_len(s), 2);
            let ptr = vmrt_str_ptr(s);
            let bytes = std::slice::from_raw_parts(ptr, 2);
            assert_eq!(bytes, b"hi");
            vmrt_terminate(vm);
        }
    }
}
