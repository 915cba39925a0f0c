//! Constructors Module - safe value-building entry points
//!
//! Thin, tag-aware wrappers around [`crate::object`]'s raw accessors and
//! [`crate::vm::Vm::alloc`]: each function reserves the right number of
//! bytes for its tag, writes the header and payload, and hands back a
//! [`Value`]. Everything above this layer (the interpreter loop, the FFI
//! shim) builds values exclusively through these, never by poking
//! `crate::object` directly.

use crate::object;
use crate::value::{Tag, Value};
use crate::vm::{AllocTicket, Vm};

/// `MKCON(vm, tag, arity)` — allocate a constructor; fields start at
/// `Value::int(0)` and must be set with [`set_con_field`] before the
/// object is reachable from any root (the allocator does not zero-init
/// CON fields beyond what the underlying zeroed semispace happens to
/// already hold).
///
/// Arity-0 constructors with `con_tag < 256` never allocate: they alias
/// the process-wide nullary table (spec.md §4.7), so every VM and every
/// message carrying e.g. `Nil` shares one immutable address.
pub fn mk_con(vm: &Vm, con_tag: u32, arity: u32) -> Value {
    if arity == 0 && (con_tag as usize) < crate::nullary::NULLARY_TABLE_SIZE {
        return crate::nullary::nullary_con(con_tag);
    }
    let addr = vm.alloc(object::con_size(arity), 8);
    unsafe { object::init_con(addr, con_tag, arity) };
    Value::from_addr(addr)
}

/// `mk_con`'s outer-lock counterpart: allocates under an already-held
/// [`AllocTicket`] instead of taking its own lock, for callers building a
/// multi-step graph that must not be interrupted by an intervening
/// collection. Still aliases the nullary table for arity-0/tag<256 CONs.
pub fn mk_con_under(vm: &Vm, ticket: &mut AllocTicket<'_>, con_tag: u32, arity: u32) -> Value {
    if arity == 0 && (con_tag as usize) < crate::nullary::NULLARY_TABLE_SIZE {
        return crate::nullary::nullary_con(con_tag);
    }
    let addr = vm.alloc_under(ticket, object::con_size(arity), 8);
    unsafe { object::init_con(addr, con_tag, arity) };
    Value::from_addr(addr)
}

/// Read CON field `i`. Panics (via the same bounds the stack uses) if `i`
/// is out of range for `value`'s arity in debug builds.
pub fn con_field(value: Value, i: u32) -> Value {
    debug_assert!(!value.is_int());
    debug_assert!(i < con_arity(value));
    unsafe { object::con_field(value.addr(), i) }
}

pub fn set_con_field(value: Value, i: u32, field: Value) {
    debug_assert!(!value.is_int());
    unsafe { object::set_con_field(value.addr(), i, field) }
}

pub fn con_arity(value: Value) -> u32 {
    unsafe { object::con_arity(value.addr()) }
}

pub fn con_user_tag(value: Value) -> u32 {
    unsafe { object::con_user_tag(value.addr()) }
}

/// `MKFLOAT(vm, d)`.
pub fn mk_float(vm: &Vm, d: f64) -> Value {
    let addr = vm.alloc(object::FLOAT_SIZE, 8);
    unsafe { object::init_float(addr, d) };
    Value::from_addr(addr)
}

pub fn mk_float_under(vm: &Vm, ticket: &mut AllocTicket<'_>, d: f64) -> Value {
    let addr = vm.alloc_under(ticket, object::FLOAT_SIZE, 8);
    unsafe { object::init_float(addr, d) };
    Value::from_addr(addr)
}

pub fn float_value(value: Value) -> f64 {
    unsafe { object::float_value(value.addr()) }
}

/// `MKSTR(vm, s)` — copy `s` into a freshly-allocated, NUL-terminated
/// string object. An empty slice produces the empty-string object (the
/// reference RTS's "null internal pointer" sentinel collapses to a
/// zero-length allocation here — there is no null pointer to distinguish
/// since every `Value` is always a valid tagged word).
pub fn mk_str(vm: &Vm, s: &[u8]) -> Value {
    let addr = vm.alloc(object::string_size(s.len()), 8);
    unsafe { object::init_string(addr, s) };
    Value::from_addr(addr)
}

pub fn mk_str_under(vm: &Vm, ticket: &mut AllocTicket<'_>, s: &[u8]) -> Value {
    let addr = vm.alloc_under(ticket, object::string_size(s.len()), 8);
    unsafe { object::init_string(addr, s) };
    Value::from_addr(addr)
}

/// Read a string object's bytes. `value` must resolve (after following at
/// most one STROFFSET hop) to a STRING.
pub fn str_bytes(value: Value) -> &'static [u8] {
    let addr = resolve_string_root(value);
    unsafe { object::string_bytes(addr) }
}

/// `MKSTROFFSET(vm, root, offset)` — a view into `root` starting at byte
/// `offset`. Chains collapse to depth 1 (spec.md §4.6): if `root` is
/// itself a STROFFSET, this re-bases onto *its* root and adds the offsets
/// rather than nesting.
pub fn mk_str_offset(vm: &Vm, root: Value, offset: usize) -> Value {
    let (root_addr, base_offset) = match unsafe { object::tag(root.addr()) } {
        Tag::StrOffset => unsafe {
            (
                object::stroffset_root(root.addr()),
                object::stroffset_offset(root.addr()),
            )
        },
        Tag::Str => (root.addr(), 0),
        other => object::unreachable_tag("mk_str_offset", other),
    };
    let addr = vm.alloc(object::STROFFSET_SIZE, 8);
    unsafe { object::init_stroffset(addr, root_addr, base_offset + offset) };
    Value::from_addr(addr)
}

pub fn mk_str_offset_under(vm: &Vm, ticket: &mut AllocTicket<'_>, root: Value, offset: usize) -> Value {
    let (root_addr, base_offset) = match unsafe { object::tag(root.addr()) } {
        Tag::StrOffset => unsafe {
            (
                object::stroffset_root(root.addr()),
                object::stroffset_offset(root.addr()),
            )
        },
        Tag::Str => (root.addr(), 0),
        other => object::unreachable_tag("mk_str_offset_under", other),
    };
    let addr = vm.alloc_under(ticket, object::STROFFSET_SIZE, 8);
    unsafe { object::init_stroffset(addr, root_addr, base_offset + offset) };
    Value::from_addr(addr)
}

/// Follow a STROFFSET (if any) to the underlying STRING object's address.
fn resolve_string_root(value: Value) -> usize {
    match unsafe { object::tag(value.addr()) } {
        Tag::Str => value.addr(),
        Tag::StrOffset => unsafe { object::stroffset_root(value.addr()) },
        other => object::unreachable_tag("resolve_string_root", other),
    }
}

/// The byte offset a (possibly STROFFSET) string value starts reading at.
pub fn str_offset(value: Value) -> usize {
    match unsafe { object::tag(value.addr()) } {
        Tag::Str => 0,
        Tag::StrOffset => unsafe { object::stroffset_offset(value.addr()) },
        other => object::unreachable_tag("str_offset", other),
    }
}

/// `MKB8`/`MKB16`/`MKB32`/`MKB64`.
pub fn mk_bits8(vm: &Vm, v: u8) -> Value {
    let addr = vm.alloc(object::round8(object::HEADER_SIZE + 1), 8);
    unsafe { object::init_bits8(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits16(vm: &Vm, v: u16) -> Value {
    let addr = vm.alloc(object::round8(object::HEADER_SIZE + 2), 8);
    unsafe { object::init_bits16(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits32(vm: &Vm, v: u32) -> Value {
    let addr = vm.alloc(object::round8(object::HEADER_SIZE + 4), 8);
    unsafe { object::init_bits32(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits64(vm: &Vm, v: u64) -> Value {
    let addr = vm.alloc(object::round8(object::HEADER_SIZE + 8), 8);
    unsafe { object::init_bits64(addr, v) };
    Value::from_addr(addr)
}

pub fn mk_bits8_under(vm: &Vm, ticket: &mut AllocTicket<'_>, v: u8) -> Value {
    let addr = vm.alloc_under(ticket, object::round8(object::HEADER_SIZE + 1), 8);
    unsafe { object::init_bits8(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits16_under(vm: &Vm, ticket: &mut AllocTicket<'_>, v: u16) -> Value {
    let addr = vm.alloc_under(ticket, object::round8(object::HEADER_SIZE + 2), 8);
    unsafe { object::init_bits16(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits32_under(vm: &Vm, ticket: &mut AllocTicket<'_>, v: u32) -> Value {
    let addr = vm.alloc_under(ticket, object::round8(object::HEADER_SIZE + 4), 8);
    unsafe { object::init_bits32(addr, v) };
    Value::from_addr(addr)
}
pub fn mk_bits64_under(vm: &Vm, ticket: &mut AllocTicket<'_>, v: u64) -> Value {
    let addr = vm.alloc_under(ticket, object::round8(object::HEADER_SIZE + 8), 8);
    unsafe { object::init_bits64(addr, v) };
    Value::from_addr(addr)
}

pub fn bits8_value(value: Value) -> u8 {
    unsafe { object::bits8_value(value.addr()) }
}
pub fn bits16_value(value: Value) -> u16 {
    unsafe { object::bits16_value(value.addr()) }
}
pub fn bits32_value(value: Value) -> u32 {
    unsafe { object::bits32_value(value.addr()) }
}
pub fn bits64_value(value: Value) -> u64 {
    unsafe { object::bits64_value(value.addr()) }
}

/// `MKBUFFER(vm, cap)` — a mutable, fixed-capacity byte buffer.
pub fn mk_buffer(vm: &Vm, cap: usize) -> Value {
    let addr = vm.alloc(object::buffer_size(cap), 8);
    unsafe { object::init_buffer(addr, cap) };
    Value::from_addr(addr)
}

pub fn mk_buffer_under(vm: &Vm, ticket: &mut AllocTicket<'_>, cap: usize) -> Value {
    let addr = vm.alloc_under(ticket, object::buffer_size(cap), 8);
    unsafe { object::init_buffer(addr, cap) };
    Value::from_addr(addr)
}

/// `MKPTR(vm, raw)` — wrap a foreign pointer. The collector copies this
/// object's header (and therefore `raw` itself) verbatim; it never
/// dereferences or traces through it.
pub fn mk_ptr(vm: &Vm, raw: usize) -> Value {
    let addr = vm.alloc(object::PTR_SIZE, 8);
    unsafe { object::init_ptr(addr, raw) };
    Value::from_addr(addr)
}

pub fn mk_ptr_under(vm: &Vm, ticket: &mut AllocTicket<'_>, raw: usize) -> Value {
    let addr = vm.alloc_under(ticket, object::PTR_SIZE, 8);
    unsafe { object::init_ptr(addr, raw) };
    Value::from_addr(addr)
}

pub fn ptr_value(value: Value) -> usize {
    unsafe { object::ptr_value(value.addr()) }
}

/// `MKMANAGEDPTR(vm, bytes)` — an inline-owned, GC-relocated byte block
/// (as opposed to PTR's unmanaged foreign address).
pub fn mk_managed_ptr(vm: &Vm, bytes: &[u8]) -> Value {
    let addr = vm.alloc(object::managed_ptr_size(bytes.len()), 8);
    unsafe { object::init_managed_ptr(addr, bytes) };
    Value::from_addr(addr)
}

pub fn mk_managed_ptr_under(vm: &Vm, ticket: &mut AllocTicket<'_>, bytes: &[u8]) -> Value {
    let addr = vm.alloc_under(ticket, object::managed_ptr_size(bytes.len()), 8);
    unsafe { object::init_managed_ptr(addr, bytes) };
    Value::from_addr(addr)
}

pub fn managed_ptr_bytes(value: Value) -> &'static [u8] {
    unsafe { object::managed_ptr_bytes(value.addr()) }
}

/// `MKBIGINT(vm, handle)` — wraps an opaque handle into the external
/// arbitrary-precision arena (arbitrary-precision arithmetic itself is
/// out of scope, per spec.md §1's Non-goals).
pub fn mk_bigint(vm: &Vm, handle: usize) -> Value {
    let addr = vm.alloc(object::BIGINT_SIZE, 8);
    unsafe { object::init_bigint(addr, handle) };
    Value::from_addr(addr)
}

pub fn mk_bigint_under(vm: &Vm, ticket: &mut AllocTicket<'_>, handle: usize) -> Value {
    let addr = vm.alloc_under(ticket, object::BIGINT_SIZE, 8);
    unsafe { object::init_bigint(addr, handle) };
    Value::from_addr(addr)
}

pub fn bigint_handle(value: Value) -> usize {
    unsafe { object::bigint_handle(value.addr()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn test_vm() -> Vm {
        Vm::init(VmConfig::default()).unwrap()
    }

    #[test]
    fn con_field_roundtrip() {
        let vm = test_vm();
        let c = mk_con(&vm, 3, 2);
        set_con_field(c, 0, Value::int(1));
        set_con_field(c, 1, Value::int(2));
        assert_eq!(con_field(c, 0).as_int(), 1);
        assert_eq!(con_arity(c), 2);
        assert_eq!(con_user_tag(c), 3);
    }

    #[test]
    fn string_bytes_roundtrip() {
        let vm = test_vm();
        let s = mk_str(&vm, b"hi");
        assert_eq!(str_bytes(s), b"hi");
    }

    #[test]
    fn str_offset_collapses_chains() {
        let vm = test_vm();
        let s = mk_str(&vm, b"hello world");
        let first = mk_str_offset(&vm, s, 6);
        let second = mk_str_offset(&vm, first, 0);
        assert_eq!(str_offset(second), 6);
        assert_eq!(resolve_string_root(second), resolve_string_root(first));
    }

    #[test]
    fn bits_roundtrip() {
        let vm = test_vm();
        assert_eq!(bits8_value(mk_bits8(&vm, 200)), 200);
        assert_eq!(bits16_value(mk_bits16(&vm, 40000)), 40000);
        assert_eq!(bits32_value(mk_bits32(&vm, 3_000_000_000)), 3_000_000_000);
        assert_eq!(bits64_value(mk_bits64(&vm, u64::MAX)), u64::MAX);
    }

    #[test]
    fn nullary_con_aliases_shared_table() {
        let vm = test_vm();
        let a = mk_con(&vm, 5, 0);
        let b = mk_con(&vm, 5, 0);
        assert_eq!(a.addr(), b.addr());
    }

    #[test]
    fn con_under_ticket_matches_plain_constructor() {
        let vm = test_vm();
        let mut ticket = vm.require_alloc(object::con_size(1));
        let c = mk_con_under(&vm, &mut ticket, 9, 1);
        drop(ticket);
        set_con_field(c, 0, Value::int(42));
        assert_eq!(con_field(c, 0).as_int(), 42);
    }

    #[test]
    fn managed_ptr_roundtrip() {
        let vm = test_vm();
        let p = mk_managed_ptr(&vm, &[1, 2, 3, 4]);
        assert_eq!(managed_ptr_bytes(p), &[1, 2, 3, 4]);
    }
}
