//! Dynamic Native Call Dispatcher
//!
//! Owns one library handle plus two lazily populated caches: symbol name to
//! address, and address to synthesized [`Invocable`]. Each cache has its own
//! lock, and neither lock is held while native code runs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{CallableKeyPolicy, DispatcherConfig};
use crate::error::DispatchResult;
use crate::invocable::Invocable;
use crate::library::{LibraryHandle, NativeHandle};
use crate::signature::{ReturnSpec, Signature};
use crate::types::{NativeReturn, Value};

/// Callable cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CallableKey {
    Address(usize),
    Shaped(usize, Signature),
}

#[derive(Debug, Default)]
struct Counters {
    symbol_queries: AtomicU64,
    symbol_hits: AtomicU64,
    callables_built: AtomicU64,
    callable_hits: AtomicU64,
    invocations: AtomicU64,
}

/// Snapshot of dispatcher activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Symbol lookups that went to the library
    pub symbol_queries: u64,
    /// Symbol lookups answered from the cache
    pub symbol_hits: u64,
    /// Invocables synthesized and cached
    pub callables_built: u64,
    /// Invocables reused from the cache; with `callables_built` this counts
    /// every callable lookup exactly once
    pub callable_hits: u64,
    /// Native calls performed
    pub invocations: u64,
}

/// Calls exported functions of one shared library by name, inferring each
/// call's signature from its arguments.
///
/// ```no_run
/// use nativecall::{Dispatcher, Value};
///
/// let libc = unsafe { Dispatcher::open("libc.so.6") }?;
/// let _pid: i32 = unsafe { libc.call_as("getpid", &[]) }?;
/// let len: usize = unsafe { libc.call_as("strlen", &[Value::from("four")]) }?;
/// assert_eq!(len, 4);
/// # Ok::<(), nativecall::DispatchError>(())
/// ```
pub struct Dispatcher {
    library: LibraryHandle,
    callable_key: CallableKeyPolicy,
    symbols: RwLock<HashMap<String, usize>>,
    callables: RwLock<HashMap<CallableKey, Arc<Invocable>>>,
    counters: Counters,
}

impl Dispatcher {
    /// Load a library by name with the default configuration.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialization code. See
    /// [`LibraryHandle::open`].
    pub unsafe fn open(name: &str) -> DispatchResult<Self> {
        Self::open_with_config(name, &DispatcherConfig::default())
    }

    /// Load a library by name.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialization code. See
    /// [`LibraryHandle::open`].
    pub unsafe fn open_with_config(name: &str, config: &DispatcherConfig) -> DispatchResult<Self> {
        let library = LibraryHandle::open(
            name,
            &config.loader.search_paths,
            config.loader.decorate_names,
        )?;
        Ok(Self::with_library(library, config))
    }

    /// Take ownership of a library handle loaded elsewhere.
    ///
    /// # Safety
    ///
    /// See [`LibraryHandle::adopt`].
    pub unsafe fn adopt(handle: NativeHandle) -> DispatchResult<Self> {
        Self::adopt_with_config(handle, &DispatcherConfig::default())
    }

    /// Take ownership of a library handle loaded elsewhere.
    ///
    /// # Safety
    ///
    /// See [`LibraryHandle::adopt`].
    pub unsafe fn adopt_with_config(
        handle: NativeHandle,
        config: &DispatcherConfig,
    ) -> DispatchResult<Self> {
        let library = LibraryHandle::adopt(handle)?;
        Ok(Self::with_library(library, config))
    }

    fn with_library(library: LibraryHandle, config: &DispatcherConfig) -> Self {
        Self {
            library,
            callable_key: config.cache.callable_key,
            symbols: RwLock::new(HashMap::new()),
            callables: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Raw handle of the owned library
    pub fn handle(&self) -> NativeHandle {
        self.library.raw()
    }

    pub fn library_name(&self) -> &str {
        self.library.name()
    }

    pub fn callable_key(&self) -> CallableKeyPolicy {
        self.callable_key
    }

    /// Resolve a symbol to its address, caching successful lookups.
    ///
    /// A failed lookup is not cached and may be retried.
    pub fn resolve(&self, name: &str) -> DispatchResult<usize> {
        if let Some(&address) = self.symbols.read().get(name) {
            self.counters.symbol_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(address);
        }

        self.counters.symbol_queries.fetch_add(1, Ordering::Relaxed);
        let address = self.library.lookup(name).map_err(|e| {
            debug!(symbol = name, error = %e, "Symbol lookup failed");
            e
        })?;

        // A concurrent resolver may have won the race; keep its entry
        let address = *self
            .symbols
            .write()
            .entry(name.to_string())
            .or_insert(address);
        debug!(symbol = name, address = format_args!("{:#x}", address), "Symbol resolved");
        Ok(address)
    }

    /// Address of an already resolved symbol, without querying the library
    pub fn cached_address(&self, name: &str) -> Option<usize> {
        self.symbols.read().get(name).copied()
    }

    /// Fetch the cached invocable for `address`, or synthesize one for
    /// `signature`.
    ///
    /// Under [`CallableKeyPolicy::Address`] a cached invocable is returned even
    /// when its signature differs from `signature`.
    pub fn callable(&self, address: usize, signature: &Signature) -> DispatchResult<Arc<Invocable>> {
        let key = match self.callable_key {
            CallableKeyPolicy::Address => CallableKey::Address(address),
            CallableKeyPolicy::Signature => CallableKey::Shaped(address, signature.clone()),
        };

        {
            let callables = self.callables.read();
            if let Some(invocable) = callables.get(&key) {
                self.counters.callable_hits.fetch_add(1, Ordering::Relaxed);
                if invocable.signature() != signature {
                    warn!(
                        address = format_args!("{:#x}", address),
                        cached = %invocable.signature(),
                        requested = %signature,
                        "Reusing callable built for a different signature"
                    );
                }
                return Ok(Arc::clone(invocable));
            }
        }

        let built = Arc::new(Invocable::build(address, signature.clone())?);
        let mut callables = self.callables.write();
        let invocable = match callables.entry(key) {
            // Another caller built this one first; ours is dropped
            Entry::Occupied(entry) => {
                self.counters.callable_hits.fetch_add(1, Ordering::Relaxed);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                self.counters.callables_built.fetch_add(1, Ordering::Relaxed);
                debug!(
                    address = format_args!("{:#x}", address),
                    signature = %signature,
                    "Callable synthesized"
                );
                Arc::clone(entry.insert(built))
            }
        };
        Ok(invocable)
    }

    /// Call an exported function by name.
    ///
    /// The signature is inferred from `args` and `ret`; `Value::Null` is
    /// passed as a null pointer. Returns `None` when the callable returns
    /// nothing.
    ///
    /// # Safety
    ///
    /// The exported function must be callable with the inferred signature
    /// (or, under the address keying policy, the signature of the first call
    /// to the same address). Faults inside native code are not caught. If the
    /// function is not reentrant, concurrent callers must serialize calls.
    pub unsafe fn call(
        &self,
        symbol: &str,
        args: &[Value],
        ret: ReturnSpec,
    ) -> DispatchResult<Option<Value>> {
        let signature = Signature::infer(symbol, args, ret)?;
        let address = self.resolve(symbol)?;
        let invocable = self.callable(address, &signature)?;
        let result = invocable.invoke(args)?;
        self.counters.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Call an exported function, converting the result to `R`.
    ///
    /// `()` discards the result.
    ///
    /// # Safety
    ///
    /// See [`Dispatcher::call`].
    pub unsafe fn call_as<R: NativeReturn>(&self, symbol: &str, args: &[Value]) -> DispatchResult<R> {
        let value = self.call(symbol, args, R::RETURN)?;
        R::from_returned(value)
    }

    pub fn cached_symbols(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn cached_callables(&self) -> usize {
        self.callables.read().len()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            symbol_queries: self.counters.symbol_queries.load(Ordering::Relaxed),
            symbol_hits: self.counters.symbol_hits.load(Ordering::Relaxed),
            callables_built: self.counters.callables_built.load(Ordering::Relaxed),
            callable_hits: self.counters.callable_hits.load(Ordering::Relaxed),
            invocations: self.counters.invocations.load(Ordering::Relaxed),
        }
    }

    /// Release the library handle.
    ///
    /// Consumes the dispatcher, so it cannot be used afterwards. Dropping a
    /// dispatcher without closing it also releases the handle.
    pub fn close(self) -> DispatchResult<()> {
        self.library.close()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("library", &self.library)
            .field("callable_key", &self.callable_key)
            .field("cached_symbols", &self.cached_symbols())
            .field("cached_callables", &self.cached_callables())
            .finish()
    }
}
