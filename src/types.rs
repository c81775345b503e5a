//! Native Type System
//!
//! Kinds describe how one argument or return value is laid out at the native
//! boundary. Values carry the caller's data and infer their own kind.

use std::fmt;

use crate::error::{DispatchError, DispatchResult};
use crate::signature::ReturnSpec;

/// Native value kinds supported for parameters and return values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// No value (return position only)
    Void,
    /// Boolean-like integer, passed as a 32-bit int
    Bool,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// Pointer-width signed integer
    Isize,
    /// Pointer-width unsigned integer
    Usize,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Raw pointer or opaque handle
    Ptr,
    /// Null-terminated narrow string (const char*)
    CStr,
    /// Borrowed byte buffer (const uint8_t*)
    Bytes,
}

impl Kind {
    /// Whether this kind may appear as a parameter
    pub fn is_valid_param(&self) -> bool {
        !matches!(self, Kind::Void)
    }

    /// Whether this kind may appear as a return value.
    ///
    /// A returned byte buffer carries no length, so it cannot be copied out.
    pub fn is_valid_return(&self) -> bool {
        !matches!(self, Kind::Bytes)
    }

    /// Parse from a string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "void" => Some(Kind::Void),
            "bool" | "boolean" => Some(Kind::Bool),
            "i8" | "int8" | "int8_t" | "char" => Some(Kind::I8),
            "u8" | "uint8" | "uint8_t" | "byte" => Some(Kind::U8),
            "i16" | "int16" | "int16_t" | "short" => Some(Kind::I16),
            "u16" | "uint16" | "uint16_t" | "ushort" | "word" => Some(Kind::U16),
            "i32" | "int32" | "int32_t" | "int" => Some(Kind::I32),
            "u32" | "uint32" | "uint32_t" | "uint" | "dword" => Some(Kind::U32),
            "i64" | "int64" | "int64_t" | "long long" => Some(Kind::I64),
            "u64" | "uint64" | "uint64_t" | "qword" => Some(Kind::U64),
            "isize" | "intptr_t" | "ssize_t" => Some(Kind::Isize),
            "usize" | "uintptr_t" | "size_t" => Some(Kind::Usize),
            "f32" | "float" => Some(Kind::F32),
            "f64" | "double" => Some(Kind::F64),
            "ptr" | "pointer" | "void*" | "handle" => Some(Kind::Ptr),
            "cstr" | "str" | "string" | "char*" | "const char*" => Some(Kind::CStr),
            "bytes" | "buffer" => Some(Kind::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Void => "void",
            Kind::Bool => "bool",
            Kind::I8 => "i8",
            Kind::U8 => "u8",
            Kind::I16 => "i16",
            Kind::U16 => "u16",
            Kind::I32 => "i32",
            Kind::U32 => "u32",
            Kind::I64 => "i64",
            Kind::U64 => "u64",
            Kind::Isize => "isize",
            Kind::Usize => "usize",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Ptr => "ptr",
            Kind::CStr => "cstr",
            Kind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A value passed to or returned from a native function
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent argument, passed as a zero pointer-sized slot
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Isize(isize),
    Usize(usize),
    F32(f32),
    F64(f64),
    /// Raw pointer or handle value
    Pointer(usize),
    /// Owned string, marshaled as a NUL-terminated narrow string
    Str(String),
    /// Owned buffer, marshaled as a pointer to its first byte
    Bytes(Vec<u8>),
}

impl Value {
    /// Wrap a raw pointer
    pub fn ptr<T>(ptr: *const T) -> Self {
        Value::Pointer(ptr as usize)
    }

    /// Native kind of this value. Null takes the pointer kind, so a null
    /// argument and a zero pointer produce the same signature.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null | Value::Pointer(_) => Kind::Ptr,
            Value::Bool(_) => Kind::Bool,
            Value::I8(_) => Kind::I8,
            Value::U8(_) => Kind::U8,
            Value::I16(_) => Kind::I16,
            Value::U16(_) => Kind::U16,
            Value::I32(_) => Kind::I32,
            Value::U32(_) => Kind::U32,
            Value::I64(_) => Kind::I64,
            Value::U64(_) => Kind::U64,
            Value::Isize(_) => Kind::Isize,
            Value::Usize(_) => Kind::Usize,
            Value::F32(_) => Kind::F32,
            Value::F64(_) => Kind::F64,
            Value::Str(_) => Kind::CStr,
            Value::Bytes(_) => Kind::Bytes,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::Isize(v) => write!(f, "{}", v),
            Value::Usize(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Pointer(p) => write!(f, "{:#x}", p),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    isize => Isize,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => Str,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Rust types that can be requested as the result of a native call
pub trait NativeReturn: Sized {
    /// Return specification used for signature inference
    const RETURN: ReturnSpec;

    /// Convert the marshaled result
    fn from_returned(value: Option<Value>) -> DispatchResult<Self>;
}

impl NativeReturn for () {
    const RETURN: ReturnSpec = ReturnSpec::Discarded;

    fn from_returned(_value: Option<Value>) -> DispatchResult<Self> {
        Ok(())
    }
}

macro_rules! impl_native_return {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NativeReturn for $ty {
                const RETURN: ReturnSpec = ReturnSpec::Typed(Kind::$variant);

                fn from_returned(value: Option<Value>) -> DispatchResult<Self> {
                    match value {
                        Some(Value::$variant(v)) => Ok(v),
                        other => Err(DispatchError::ReturnMismatch {
                            expected: Kind::$variant,
                            got: other.map(|v| v.kind()).unwrap_or(Kind::Void),
                        }),
                    }
                }
            }
        )*
    };
}

impl_native_return! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    isize => Isize,
    usize => Usize,
    f32 => F32,
    f64 => F64,
}

impl NativeReturn for Option<String> {
    const RETURN: ReturnSpec = ReturnSpec::Typed(Kind::CStr);

    fn from_returned(value: Option<Value>) -> DispatchResult<Self> {
        match value {
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(Value::Null) => Ok(None),
            other => Err(DispatchError::ReturnMismatch {
                expected: Kind::CStr,
                got: other.map(|v| v.kind()).unwrap_or(Kind::Void),
            }),
        }
    }
}

impl<T> NativeReturn for *const T {
    const RETURN: ReturnSpec = ReturnSpec::Typed(Kind::Ptr);

    fn from_returned(value: Option<Value>) -> DispatchResult<Self> {
        match value {
            Some(Value::Pointer(p)) => Ok(p as *const T),
            other => Err(DispatchError::ReturnMismatch {
                expected: Kind::Ptr,
                got: other.map(|v| v.kind()).unwrap_or(Kind::Void),
            }),
        }
    }
}
