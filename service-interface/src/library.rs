use crate::error::PluginError;
use log::debug;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// An opened native library. Dropping it closes the underlying OS handle.
pub trait LibraryHandle: Send + Sync {
    /// Address of `name`, or the loader's diagnostic if it cannot be found.
    fn symbol(&self, name: &str) -> Result<*mut c_void, String>;
}

/// Opens native libraries. [`NativeProvider`] is the real dynamic linker;
/// tests substitute their own to observe open/close calls.
pub trait LibraryProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, String>;
}

/// libloading-backed provider.
///
/// On Unix libraries are opened with `RTLD_LAZY | RTLD_GLOBAL` so that symbols
/// exported by one service can be resolved by services loaded after it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProvider;

struct NativeHandle(libloading::Library);

impl LibraryHandle for NativeHandle {
    fn symbol(&self, name: &str) -> Result<*mut c_void, String> {
        // Only the address is read; the caller decides how to interpret it.
        unsafe {
            self.0
                .get::<*mut c_void>(name.as_bytes())
                .map(|sym| *sym)
                .map_err(|e| e.to_string())
        }
    }
}

impl LibraryProvider for NativeProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, String> {
        let lib = open_native(path).map_err(|e| e.to_string())?;
        Ok(Box::new(NativeHandle(lib)))
    }
}

#[cfg(unix)]
fn open_native(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY};
    // Running library initialisers is inherent to loading a plugin.
    unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_GLOBAL) }.map(Into::into)
}

#[cfg(not(unix))]
fn open_native(path: &Path) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

/// Exclusive owner of one opened shared object.
///
/// The handle is released exactly once, when this value is dropped. Share it
/// through an `Arc` when code from the library must stay mapped elsewhere.
pub struct DynamicLibrary {
    path: PathBuf,
    handle: Box<dyn LibraryHandle>,
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .finish()
    }
}

impl DynamicLibrary {
    /// Open `path` with the system dynamic linker.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        Self::open_with(&NativeProvider, path)
    }

    pub fn open_with(
        provider: &dyn LibraryProvider,
        path: impl AsRef<Path>,
    ) -> Result<Self, PluginError> {
        let path = path.as_ref().to_path_buf();
        let handle = provider.open(&path).map_err(|reason| PluginError::Load {
            path: path.clone(),
            reason,
        })?;
        debug!("opened library {}", path.display());
        Ok(Self { path, handle })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `name` in this library. A null address counts as not found.
    pub fn resolve_symbol(&self, name: &str) -> Result<NonNull<c_void>, PluginError> {
        let not_found = |reason: String| PluginError::SymbolNotFound {
            path: self.path.clone(),
            symbol: name.to_string(),
            reason,
        };
        let address = self.handle.symbol(name).map_err(not_found)?;
        NonNull::new(address).ok_or_else(|| not_found("symbol resolved to null".to_string()))
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        debug!("closing library {}", self.path.display());
    }
}
