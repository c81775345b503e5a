//! Library Handle
//!
//! Owned wrapper around a loaded shared library. Loading, symbol lookup and
//! unloading are delegated to `libloading`; this module only adds name probing
//! and raw handle adoption.

use std::ffi::{c_void, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, trace};

#[cfg(unix)]
use libloading::os::unix as platform;
#[cfg(windows)]
use libloading::os::windows as platform;

use crate::error::{DispatchError, DispatchResult};

/// Raw native library handle (`void*` from dlopen, `HMODULE` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// The null sentinel
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A loaded shared library, released exactly once when closed or dropped
pub struct LibraryHandle {
    /// Name the library was opened under, or a placeholder for adopted handles
    name: String,
    /// Raw handle value, non-null for the lifetime of the object
    raw: NativeHandle,
    library: Library,
}

impl LibraryHandle {
    /// Load a library by name.
    ///
    /// Candidates are tried in order: the name as given (platform search
    /// rules), the platform decorated file name for bare names, then every
    /// search path joined with both.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialization routines, which may execute
    /// arbitrary code. The caller must trust the library being loaded.
    pub unsafe fn open(
        name: &str,
        search_paths: &[PathBuf],
        decorate: bool,
    ) -> DispatchResult<Self> {
        let mut last_error = String::from("no candidate paths");

        for candidate in candidate_names(name, search_paths, decorate) {
            trace!(library = name, candidate = ?candidate, "Trying library candidate");
            match Library::new(&candidate) {
                Ok(library) => {
                    let (library, raw) = split_raw(library);
                    debug!(library = name, candidate = ?candidate, handle = %raw, "Library loaded");
                    return Ok(Self {
                        name: name.to_string(),
                        raw,
                        library,
                    });
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(DispatchError::LibraryNotFound {
            name: name.to_string(),
            reason: last_error,
        })
    }

    /// Take ownership of an already-loaded library handle.
    ///
    /// # Safety
    ///
    /// `handle` must be a live handle returned by the platform loader
    /// (`dlopen`, `LoadLibrary`) whose reference the caller gives up: it is
    /// released when this object is closed or dropped.
    pub unsafe fn adopt(handle: NativeHandle) -> DispatchResult<Self> {
        if handle.is_null() {
            return Err(DispatchError::InvalidHandle);
        }
        let library: Library = platform::Library::from_raw(handle.as_raw() as _).into();
        debug!(handle = %handle, "Library handle adopted");
        Ok(Self {
            name: format!("<adopted {}>", handle),
            raw: handle,
            library,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    /// Query the library for an exported symbol address
    pub fn lookup(&self, symbol: &str) -> DispatchResult<usize> {
        // Safety: the symbol is read as an opaque address and never called
        // through a Rust type here.
        let result = unsafe { self.library.get::<*const c_void>(symbol.as_bytes()) };
        match result {
            Ok(sym) if !(*sym).is_null() => Ok(*sym as usize),
            Ok(_) => Err(DispatchError::SymbolNotFound {
                symbol: symbol.to_string(),
                reason: format!("'{}' resolves to a null address", self.name),
            }),
            Err(e) => Err(DispatchError::SymbolNotFound {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Release the native handle
    pub fn close(self) -> DispatchResult<()> {
        let name = self.name;
        self.library
            .close()
            .map_err(|e| DispatchError::CloseFailed(e.to_string()))?;
        debug!(library = %name, "Library closed");
        Ok(())
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("name", &self.name)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Recover the raw handle value of a loaded library without releasing it
fn split_raw(library: Library) -> (Library, NativeHandle) {
    let raw = platform::Library::from(library).into_raw();
    let handle = NativeHandle::from_raw(raw as usize);
    // Safety: `raw` was just produced by `into_raw`, so ownership moves back.
    let library = unsafe { platform::Library::from_raw(raw) }.into();
    (library, handle)
}

/// Library file names to try for `name`, in order
fn candidate_names(name: &str, search_paths: &[PathBuf], decorate: bool) -> Vec<OsString> {
    let path = Path::new(name);

    // Anything that already looks like a path is used verbatim
    if path.is_absolute() || path.components().count() > 1 {
        return vec![OsString::from(name)];
    }

    let mut names = vec![OsString::from(name)];
    if decorate && path.extension().is_none() {
        let decorated = libloading::library_filename(name);
        if decorated != names[0] {
            names.push(decorated);
        }
    }

    let mut candidates = names.clone();
    for dir in search_paths {
        for file in &names {
            candidates.push(dir.join(file).into_os_string());
        }
    }
    candidates
}
