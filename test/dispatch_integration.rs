//! Dispatch Integration Tests
//!
//! Calls real exported functions of the platform C library (or kernel32 and
//! user32 on Windows) through the dispatcher and checks the cache behavior
//! observable from outside.

use nativecall::{
    CallableKeyPolicy, DispatchError, Dispatcher, DispatcherConfig, Kind, ReturnSpec, Value,
};

#[cfg(target_os = "linux")]
const LIBC: &str = "libc.so.6";
#[cfg(target_os = "macos")]
const LIBC: &str = "/usr/lib/libSystem.B.dylib";

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn open_libc() -> Dispatcher {
    unsafe { Dispatcher::open(LIBC) }.expect("Failed to open C library")
}

// ============================================================================
// Library Lifecycle
// ============================================================================

#[test]
fn test_open_missing_library() {
    let result = unsafe { Dispatcher::open("nativecall_missing_library_42") };
    assert!(matches!(
        result,
        Err(DispatchError::LibraryNotFound { .. })
    ));
}

#[test]
fn test_adopt_null_handle() {
    let result = unsafe { Dispatcher::adopt(nativecall::NativeHandle::NULL) };
    assert!(matches!(result, Err(DispatchError::InvalidHandle)));
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_open_and_close() {
    let libc = open_libc();
    assert!(!libc.handle().is_null());
    assert_eq!(libc.library_name(), LIBC);
    libc.close().expect("Failed to close library");
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_adopt_dlopen_handle() {
    use std::ffi::CString;

    let name = CString::new(LIBC).unwrap();
    let raw = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW) };
    assert!(!raw.is_null());

    let dispatcher = unsafe { Dispatcher::adopt(nativecall::NativeHandle::from_ptr(raw)) }
        .expect("Failed to adopt handle");
    assert_eq!(dispatcher.handle().as_raw(), raw as usize);

    let pid: i32 = unsafe { dispatcher.call_as("getpid", &[]) }.unwrap();
    assert_eq!(pid as u32, std::process::id());

    dispatcher.close().expect("Failed to close adopted handle");
}

// ============================================================================
// Symbol Resolution
// ============================================================================

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_unknown_symbol_not_cached() {
    let libc = open_libc();

    for _ in 0..2 {
        let err = unsafe {
            libc.call(
                "nativecall_no_such_symbol",
                &[],
                ReturnSpec::Typed(Kind::I32),
            )
        }
        .unwrap_err();
        assert!(matches!(err, DispatchError::SymbolNotFound { .. }));
    }

    assert_eq!(libc.cached_symbols(), 0);
    assert_eq!(libc.cached_address("nativecall_no_such_symbol"), None);
    // Each attempt went back to the library
    assert_eq!(libc.stats().symbol_queries, 2);
    assert_eq!(libc.stats().invocations, 0);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_resolve_is_cached() {
    let libc = open_libc();

    let first = libc.resolve("strlen").unwrap();
    let second = libc.resolve("strlen").unwrap();

    assert_eq!(first, second);
    assert_eq!(libc.cached_address("strlen"), Some(first));
    let stats = libc.stats();
    assert_eq!(stats.symbol_queries, 1);
    assert_eq!(stats.symbol_hits, 1);
}

// ============================================================================
// Calls
// ============================================================================

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_call_getpid() {
    let libc = open_libc();
    let result = unsafe { libc.call("getpid", &[], ReturnSpec::Typed(Kind::I32)) }.unwrap();
    assert_eq!(result, Some(Value::I32(std::process::id() as i32)));
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_call_pthread_self_matches_thread() {
    let libc = open_libc();
    let native: usize = unsafe { libc.call_as("pthread_self", &[]) }.unwrap();
    assert_eq!(native, unsafe { libc::pthread_self() } as usize);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_call_string_argument() {
    let libc = open_libc();
    let len: usize = unsafe { libc.call_as("strlen", &[Value::from("dispatcher")]) }.unwrap();
    assert_eq!(len, 10);

    let cmp: i32 = unsafe { libc.call_as("strcmp", &[Value::from("abc"), Value::from("abc")]) }
        .unwrap();
    assert_eq!(cmp, 0);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_call_string_return() {
    let libc = open_libc();
    let expected = std::env::var("PATH").expect("PATH is set for test runs");

    let value: Option<String> =
        unsafe { libc.call_as("getenv", &[Value::from("PATH")]) }.unwrap();
    assert_eq!(value.as_deref(), Some(expected.as_str()));

    let missing: Option<String> =
        unsafe { libc.call_as("getenv", &[Value::from("NATIVECALL_TEST_UNSET_VALUE")]) }.unwrap();
    assert_eq!(missing, None);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_null_argument_is_null_pointer() {
    let libc = open_libc();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let from_null: i64 = unsafe { libc.call_as("time", &[Value::Null]) }.unwrap();
    let from_zero: i64 = unsafe { libc.call_as("time", &[Value::Pointer(0)]) }.unwrap();

    assert!((from_null - now).abs() <= 5);
    assert!((from_zero - from_null).abs() <= 5);
    // Both calls share one callable: null infers the pointer kind
    assert_eq!(libc.stats().callables_built, 1);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_untyped_return_is_ambiguous() {
    let libc = open_libc();
    let err = unsafe { libc.call("getpid", &[], ReturnSpec::Untyped) }.unwrap_err();

    assert_eq!(
        err,
        DispatchError::AmbiguousReturnType {
            symbol: "getpid".to_string()
        }
    );
    let stats = libc.stats();
    assert_eq!(stats.invocations, 0);
    assert_eq!(stats.symbol_queries, 0);
    assert_eq!(libc.cached_callables(), 0);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_discarded_return() {
    let libc = open_libc();
    let result = unsafe { libc.call("fflush", &[Value::Null], ReturnSpec::Discarded) }.unwrap();
    assert_eq!(result, None);

    unsafe { libc.call_as::<()>("fflush", &[Value::Null]) }.unwrap();
    assert_eq!(libc.stats().invocations, 2);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_unsupported_return_leaves_cache_unchanged() {
    let libc = open_libc();
    let err = unsafe { libc.call("abs", &[Value::I32(1)], ReturnSpec::Typed(Kind::Bytes)) }
        .unwrap_err();

    assert!(matches!(err, DispatchError::UnsupportedSignature { .. }));
    assert_eq!(libc.cached_callables(), 0);
    assert_eq!(libc.stats().invocations, 0);
}

// ============================================================================
// Callable Cache Policy
// ============================================================================

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_first_signature_wins_per_address() {
    let libc = open_libc();

    let first = unsafe { libc.call("abs", &[Value::I32(-5)], Kind::I32.into()) }.unwrap();
    assert_eq!(first, Some(Value::I32(5)));

    // Same address, different shape: the cached (i32) -> i32 callable is
    // reused, so the result still comes back as an i32.
    let second = unsafe { libc.call("abs", &[Value::from("ignored")], ReturnSpec::Discarded) }
        .unwrap();
    assert!(matches!(second, Some(Value::I32(_))));

    let stats = libc.stats();
    assert_eq!(stats.callables_built, 1);
    assert_eq!(stats.callable_hits, 1);
    assert_eq!(stats.callables_built + stats.callable_hits, stats.invocations);
    assert_eq!(libc.cached_callables(), 1);
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn test_cached_shape_enforces_arity() {
    let libc = open_libc();
    unsafe { libc.call("abs", &[Value::I32(-1)], Kind::I32.into()) }.unwrap();

    let err = unsafe { libc.call("abs", &[Value::I32(1), Value::I32(2)], Kind::I32.into()) }
        .unwrap_err();
    assert_eq!(err, DispatchError::ArityMismatch { expected: 1, got: 2 });
}

#[cfg(all(any(target_os = "linux", target_os = "macos"), target_pointer_width = "64"))]
#[test]
fn test_signature_keyed_policy() {
    let config = DispatcherConfig::default().with_callable_key(CallableKeyPolicy::Signature);
    let libc = unsafe { Dispatcher::open_with_config(LIBC, &config) }.unwrap();
    assert_eq!(libc.callable_key(), CallableKeyPolicy::Signature);

    let narrow = unsafe { libc.call("abs", &[Value::I32(-3)], Kind::I32.into()) }.unwrap();
    let wide = unsafe { libc.call("abs", &[Value::I64(-4)], Kind::I32.into()) }.unwrap();

    assert_eq!(narrow, Some(Value::I32(3)));
    assert_eq!(wide, Some(Value::I32(4)));
    assert_eq!(libc.cached_callables(), 2);
    assert_eq!(libc.cached_symbols(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn test_float_arguments() {
    let libm = unsafe { Dispatcher::open("libm.so.6") }.unwrap();

    let cos: f64 = unsafe { libm.call_as("cos", &[Value::F64(0.0)]) }.unwrap();
    assert_eq!(cos, 1.0);

    let root: f32 = unsafe { libm.call_as("sqrtf", &[Value::F32(16.0)]) }.unwrap();
    assert_eq!(root, 4.0);

    let power: f64 = unsafe { libm.call_as("pow", &[Value::F64(2.0), Value::F64(10.0)]) }.unwrap();
    assert_eq!(power, 1024.0);
}

// ============================================================================
// Windows
// ============================================================================

#[cfg(windows)]
#[test]
fn test_kernel32_current_thread_id() {
    let kernel32 = unsafe { Dispatcher::open("kernel32") }.unwrap();

    let id: u32 = unsafe { kernel32.call_as("GetCurrentThreadId", &[]) }.unwrap();
    let again: u32 = unsafe { kernel32.call_as("GetCurrentThreadId", &[]) }.unwrap();
    assert_ne!(id, 0);
    assert_eq!(id, again);

    let other = std::thread::scope(|s| {
        s.spawn(|| unsafe { kernel32.call_as::<u32>("GetCurrentThreadId", &[]) }.unwrap())
            .join()
            .unwrap()
    });
    assert_ne!(id, other);
}

#[cfg(windows)]
#[test]
fn test_user32_monitor_count() {
    const SM_CMONITORS: i32 = 0x50;
    let user32 = unsafe { Dispatcher::open("user32") }.unwrap();
    let monitors: i32 = unsafe { user32.call_as("GetSystemMetrics", &[Value::I32(SM_CMONITORS)]) }
        .unwrap();
    assert!(monitors >= 0);
}

#[cfg(windows)]
#[test]
fn test_kernel32_untyped_is_ambiguous() {
    let kernel32 = unsafe { Dispatcher::open("kernel32") }.unwrap();
    let err = unsafe { kernel32.call("GetTickCount", &[], ReturnSpec::Untyped) }.unwrap_err();
    assert!(matches!(err, DispatchError::AmbiguousReturnType { .. }));
}
