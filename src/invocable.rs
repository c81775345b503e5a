//! Invocable Synthesis
//!
//! An [`Invocable`] binds a native address to one [`Signature`] through a
//! prepared libffi call interface. Arguments are marshaled into fixed-size
//! slots so that a slot is always large enough for whatever kind the call
//! interface reads from it.

use std::ffi::{c_char, c_void, CStr, CString};
use std::fmt;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use tracing::trace;

use crate::error::{DispatchError, DispatchResult};
use crate::narrow;
use crate::signature::Signature;
use crate::types::{Kind, Value};

/// One marshaled argument.
///
/// Every field starts at offset zero, so a value written through one field is
/// read back correctly through the same field on any endianness.
#[repr(C)]
#[derive(Clone, Copy)]
union ArgSlot {
    i8: i8,
    u8: u8,
    i16: i16,
    u16: u16,
    i32: i32,
    u32: u32,
    i64: i64,
    u64: u64,
    isize: isize,
    usize: usize,
    f32: f32,
    f64: f64,
    ptr: *const c_void,
}

impl ArgSlot {
    fn zeroed() -> Self {
        ArgSlot { u64: 0 }
    }
}

fn ffi_type(kind: Kind) -> Type {
    match kind {
        Kind::Void => Type::void(),
        Kind::Bool | Kind::I32 => Type::i32(),
        Kind::I8 => Type::i8(),
        Kind::U8 => Type::u8(),
        Kind::I16 => Type::i16(),
        Kind::U16 => Type::u16(),
        Kind::U32 => Type::u32(),
        Kind::I64 => Type::i64(),
        Kind::U64 => Type::u64(),
        Kind::Isize => Type::isize(),
        Kind::Usize => Type::usize(),
        Kind::F32 => Type::f32(),
        Kind::F64 => Type::f64(),
        Kind::Ptr | Kind::CStr | Kind::Bytes => Type::pointer(),
    }
}

/// A native function bound to one call shape
pub struct Invocable {
    address: usize,
    signature: Signature,
    cif: Cif,
}

// Safety: the call interface is fully prepared in `build` and only read by
// `ffi_call` afterwards; the address is plain data.
unsafe impl Send for Invocable {}
unsafe impl Sync for Invocable {}

impl Invocable {
    /// Synthesize a call interface for `signature` at `address`
    pub fn build(address: usize, signature: Signature) -> DispatchResult<Self> {
        signature.validate()?;
        let cif = Cif::new(
            signature.params.iter().map(|&kind| ffi_type(kind)),
            ffi_type(signature.ret),
        );
        Ok(Self {
            address,
            signature,
            cif,
        })
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Call the native function.
    ///
    /// Arguments are marshaled by their own kind into slots, which the call
    /// interface then reads according to the kinds it was built with. Returns
    /// `None` for a void return.
    ///
    /// # Safety
    ///
    /// The native function must actually have this invocable's signature and
    /// must be safe to call with the given arguments. Faults inside the
    /// callee are not caught.
    pub unsafe fn invoke(&self, args: &[Value]) -> DispatchResult<Option<Value>> {
        if args.len() != self.signature.arity() {
            return Err(DispatchError::ArityMismatch {
                expected: self.signature.arity(),
                got: args.len(),
            });
        }

        // Owned C strings live until the call returns
        let mut strings: Vec<CString> = Vec::new();
        let mut slots: Vec<ArgSlot> = Vec::with_capacity(args.len());
        for (index, value) in args.iter().enumerate() {
            slots.push(marshal(index, value, &mut strings)?);
        }
        let ffi_args: Vec<Arg> = slots.iter().map(Arg::new).collect();

        trace!(address = self.address, signature = %self.signature, "Invoking native function");
        let code = CodePtr::from_ptr(self.address as *const c_void);
        let cif = &self.cif;

        // Integer results narrower than a register are widened by libffi to a
        // full `ffi_arg`, so they are always read into a word and truncated.
        let result = match self.signature.ret {
            Kind::Void => {
                cif.call::<()>(code, &ffi_args);
                None
            }
            Kind::F32 => Some(Value::F32(cif.call::<f32>(code, &ffi_args))),
            Kind::F64 => Some(Value::F64(cif.call::<f64>(code, &ffi_args))),
            Kind::I64 => Some(Value::I64(cif.call::<i64>(code, &ffi_args))),
            Kind::U64 => Some(Value::U64(cif.call::<u64>(code, &ffi_args))),
            Kind::Bytes => {
                return Err(DispatchError::UnsupportedSignature {
                    signature: self.signature.to_string(),
                    reason: "bytes is not a supported return kind".to_string(),
                })
            }
            kind => {
                let word = cif.call::<usize>(code, &ffi_args);
                Some(unmarshal_word(kind, word))
            }
        };

        drop(strings);
        Ok(result)
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocable")
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", &self.signature)
            .finish()
    }
}

fn marshal(index: usize, value: &Value, strings: &mut Vec<CString>) -> DispatchResult<ArgSlot> {
    let mut slot = ArgSlot::zeroed();
    match value {
        Value::Null => slot.usize = 0,
        Value::Bool(v) => slot.i32 = *v as i32,
        Value::I8(v) => slot.i8 = *v,
        Value::U8(v) => slot.u8 = *v,
        Value::I16(v) => slot.i16 = *v,
        Value::U16(v) => slot.u16 = *v,
        Value::I32(v) => slot.i32 = *v,
        Value::U32(v) => slot.u32 = *v,
        Value::I64(v) => slot.i64 = *v,
        Value::U64(v) => slot.u64 = *v,
        Value::Isize(v) => slot.isize = *v,
        Value::Usize(v) => slot.usize = *v,
        Value::F32(v) => slot.f32 = *v,
        Value::F64(v) => slot.f64 = *v,
        Value::Pointer(p) => slot.usize = *p,
        Value::Str(s) => {
            let bytes = narrow::encode(s).ok_or(DispatchError::InvalidString { index })?;
            let c_string = CString::new(bytes).map_err(|_| DispatchError::InvalidString { index })?;
            slot.ptr = c_string.as_ptr() as *const c_void;
            strings.push(c_string);
        }
        Value::Bytes(b) => slot.ptr = b.as_ptr() as *const c_void,
    }
    Ok(slot)
}

/// Interpret a widened integer or pointer return register
unsafe fn unmarshal_word(kind: Kind, word: usize) -> Value {
    match kind {
        Kind::Bool => Value::Bool(word as i32 != 0),
        Kind::I8 => Value::I8(word as i8),
        Kind::U8 => Value::U8(word as u8),
        Kind::I16 => Value::I16(word as i16),
        Kind::U16 => Value::U16(word as u16),
        Kind::I32 => Value::I32(word as i32),
        Kind::U32 => Value::U32(word as u32),
        Kind::Isize => Value::Isize(word as isize),
        Kind::Usize => Value::Usize(word),
        Kind::CStr if word == 0 => Value::Null,
        Kind::CStr => Value::Str(narrow::decode(
            CStr::from_ptr(word as *const c_char).to_bytes(),
        )),
        _ => Value::Pointer(word),
    }
}
