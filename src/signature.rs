//! Call Signatures
//!
//! A signature is the ordered list of parameter kinds plus one return kind.
//! Signatures are never declared up front: they are inferred from the values
//! at the call site and the return type the caller asks for.

use std::fmt;

use crate::error::{DispatchError, DispatchResult};
use crate::types::{Kind, Value};

/// How the caller wants the native return value interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnSpec {
    /// No type given and the result is not discarded
    Untyped,
    /// The result will not be used; the callee is treated as returning void
    Discarded,
    /// Interpret the result as this kind
    Typed(Kind),
}

impl ReturnSpec {
    /// Resolve to a concrete return kind.
    ///
    /// An untyped return cannot be dispatched: there is no reliable way to
    /// know how the native return register should be read.
    pub fn resolve(self, symbol: &str) -> DispatchResult<Kind> {
        match self {
            ReturnSpec::Typed(kind) => Ok(kind),
            ReturnSpec::Discarded => Ok(Kind::Void),
            ReturnSpec::Untyped => Err(DispatchError::AmbiguousReturnType {
                symbol: symbol.to_string(),
            }),
        }
    }
}

impl From<Kind> for ReturnSpec {
    fn from(kind: Kind) -> Self {
        ReturnSpec::Typed(kind)
    }
}

impl fmt::Display for ReturnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnSpec::Untyped => write!(f, "untyped"),
            ReturnSpec::Discarded => write!(f, "discarded"),
            ReturnSpec::Typed(kind) => write!(f, "{}", kind),
        }
    }
}

/// Parameter and return kinds of one native call shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter kinds in slot order
    pub params: Vec<Kind>,
    /// Return kind
    pub ret: Kind,
}

impl Signature {
    pub fn new(params: Vec<Kind>, ret: Kind) -> Self {
        Self { params, ret }
    }

    /// Infer the signature of a call.
    ///
    /// Null arguments take the pointer kind, matching the zero pointer-sized
    /// slot they are marshaled into. The return spec is resolved first so an ambiguous call
    /// fails before anything else happens.
    pub fn infer(symbol: &str, args: &[Value], ret: ReturnSpec) -> DispatchResult<Self> {
        let ret = ret.resolve(symbol)?;
        let params = args.iter().map(Value::kind).collect();
        Ok(Self { params, ret })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check that every kind can be synthesized into a native call
    pub fn validate(&self) -> DispatchResult<()> {
        if let Some(index) = self.params.iter().position(|k| !k.is_valid_param()) {
            return Err(DispatchError::UnsupportedSignature {
                signature: self.to_string(),
                reason: format!("parameter {} cannot be {}", index, self.params[index]),
            });
        }
        if !self.ret.is_valid_return() {
            return Err(DispatchError::UnsupportedSignature {
                signature: self.to_string(),
                reason: format!("{} is not a supported return kind", self.ret),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}
