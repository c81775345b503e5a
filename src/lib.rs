//! nativecall - Dynamic Native Call Dispatcher
//!
//! Calls exported functions of a shared library by name without declaring
//! their signatures at compile time. Each call's signature is inferred from
//! the runtime values of its arguments and the return type the caller asks
//! for; a matching native call interface is synthesized on first use and
//! cached per address.
//!
//! # Architecture
//!
//! ```text
//! dispatcher.call("strlen", &[Value::from("abc")], Kind::Usize.into())
//!       │
//!       ▼
//! Signature inference      (null -> pointer, return type required)
//!       │
//!       ▼
//! Symbol cache ──miss──▶ LibraryHandle::lookup (libloading)
//!       │
//!       ▼
//! Callable cache ──miss──▶ Invocable::build (libffi call interface)
//!       │
//!       ▼
//! Marshal arguments ▶ native call ▶ unmarshal result
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nativecall::{Dispatcher, Kind, ReturnSpec, Value};
//!
//! let libc = unsafe { Dispatcher::open("libc.so.6") }?;
//!
//! // Explicit return type
//! let len = unsafe { libc.call("strlen", &[Value::from("hello")], Kind::Usize.into()) }?;
//! assert_eq!(len, Some(Value::Usize(5)));
//!
//! // Discarded result, null passed as a null pointer
//! unsafe { libc.call("fflush", &[Value::Null], ReturnSpec::Discarded) }?;
//!
//! libc.close()?;
//! # Ok::<(), nativecall::DispatchError>(())
//! ```
//!
//! # Caller risk
//!
//! Loading a library runs its initialization code, and every call trusts the
//! inferred signature. Faults inside native code are not caught; they take
//! down the process.

#![warn(clippy::all)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod invocable;
pub mod library;
mod narrow;
pub mod signature;
pub mod types;

pub use config::{CallableKeyPolicy, ConfigError, ConfigResult, DispatcherConfig};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use invocable::Invocable;
pub use library::{LibraryHandle, NativeHandle};
pub use signature::{ReturnSpec, Signature};
pub use types::{Kind, NativeReturn, Value};
