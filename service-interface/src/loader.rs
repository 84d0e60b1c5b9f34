use crate::error::PluginError;
use crate::handle::FactoryHandle;
use crate::library::{DynamicLibrary, LibraryProvider, NativeProvider};
use crate::{core_version, FactoryAccessor, ServiceDeclaration, ABI_VERSION, FACTORY_SYMBOL};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binds one opened service library to the `service_factory_instance` entry
/// point. The entry point is resolved on the first [`factory`](Self::factory)
/// call and the result is cached.
pub struct PluginLoader {
    path: PathBuf,
    library: Arc<DynamicLibrary>,
    factory: Option<FactoryHandle>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("path", &self.path)
            .field("factory_resolved", &self.factory.is_some())
            .finish()
    }
}

impl PluginLoader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        Self::with_provider(&NativeProvider, path)
    }

    pub fn with_provider(
        provider: &dyn LibraryProvider,
        path: impl AsRef<Path>,
    ) -> Result<Self, PluginError> {
        let library = DynamicLibrary::open_with(provider, path)?;
        let path = library.path().to_path_buf();
        debug!("service loader created for {}", path.display());
        Ok(Self {
            path,
            library: Arc::new(library),
            factory: None,
        })
    }

    /// File this loader was constructed from.
    pub fn service_file(&self) -> &Path {
        &self.path
    }

    pub fn library(&self) -> &Arc<DynamicLibrary> {
        &self.library
    }

    /// The plugin's factory, resolving and validating the entry point on first use.
    pub fn factory(&mut self) -> Result<FactoryHandle, PluginError> {
        if let Some(factory) = &self.factory {
            return Ok(factory.clone());
        }
        let factory = self.load_factory()?;
        self.factory = Some(factory.clone());
        Ok(factory)
    }

    fn load_factory(&self) -> Result<FactoryHandle, PluginError> {
        let address = self.library.resolve_symbol(FACTORY_SYMBOL)?;
        // The plugin contract fixes the signature of the exported entry point.
        let accessor: FactoryAccessor = unsafe { std::mem::transmute(address.as_ptr()) };
        let declaration = unsafe { accessor() };
        if declaration.is_null() {
            return Err(PluginError::NullDeclaration {
                path: self.path.clone(),
            });
        }
        // Declarations live in the plugin's static storage and the library is
        // kept open by the handle built below.
        let declaration: &'static ServiceDeclaration = unsafe { &*declaration };
        self.check_versions(declaration)?;

        let factory = FactoryHandle::from_library(declaration.factory, self.library.clone());
        debug!(
            "resolved factory for `{}` in {}",
            factory.service_name(),
            self.path.display()
        );
        Ok(factory)
    }

    fn check_versions(&self, declaration: &ServiceDeclaration) -> Result<(), PluginError> {
        let mismatch = |found_core: String| PluginError::AbiMismatch {
            path: self.path.clone(),
            found_abi: declaration.abi_version,
            found_core,
            expected_abi: ABI_VERSION,
            expected_core: core_version().to_string(),
        };
        // Nothing past `abi_version` may be read if the layout differs.
        if declaration.abi_version != ABI_VERSION {
            return Err(mismatch("?".to_string()));
        }
        match unsafe { declaration.core_version() } {
            Some(found) if found == core_version() => Ok(()),
            Some(found) => Err(mismatch(found.to_string())),
            None => Err(mismatch("<unreadable>".to_string())),
        }
    }
}
