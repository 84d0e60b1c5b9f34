use crate::error::RegistryError;
use crate::library::DynamicLibrary;
use crate::{AbstractService, ServiceFactory};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a registered factory came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryOrigin {
    /// Resolved from the `service_factory_instance` symbol of this library.
    Library(PathBuf),
    /// Linked into the running binary and collected through `inventory`.
    Linked,
    /// Handed to the registry builder by the application.
    Owned,
}

impl fmt::Display for FactoryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryOrigin::Library(path) => write!(f, "{}", path.display()),
            FactoryOrigin::Linked => f.write_str("<linked>"),
            FactoryOrigin::Owned => f.write_str("<owned>"),
        }
    }
}

#[derive(Clone)]
enum FactoryRef {
    Static(&'static dyn ServiceFactory),
    Shared(Arc<dyn ServiceFactory>),
}

/// A service factory together with whatever keeps its code loaded.
///
/// Factories resolved from a plugin point into the plugin's static storage, so
/// the handle holds the library open for as long as it exists.
#[derive(Clone)]
pub struct FactoryHandle {
    factory: FactoryRef,
    library: Option<Arc<DynamicLibrary>>,
}

impl FactoryHandle {
    /// Factory exported by `library`. The caller guarantees `factory` lives in
    /// that library's static storage.
    pub(crate) fn from_library(
        factory: &'static dyn ServiceFactory,
        library: Arc<DynamicLibrary>,
    ) -> Self {
        Self {
            factory: FactoryRef::Static(factory),
            library: Some(library),
        }
    }

    pub fn linked(factory: &'static dyn ServiceFactory) -> Self {
        Self {
            factory: FactoryRef::Static(factory),
            library: None,
        }
    }

    pub fn owned(factory: impl ServiceFactory + 'static) -> Self {
        Self {
            factory: FactoryRef::Shared(Arc::new(factory)),
            library: None,
        }
    }

    pub fn origin(&self) -> FactoryOrigin {
        match (&self.factory, &self.library) {
            (_, Some(lib)) => FactoryOrigin::Library(lib.path().to_path_buf()),
            (FactoryRef::Static(_), None) => FactoryOrigin::Linked,
            (FactoryRef::Shared(_), None) => FactoryOrigin::Owned,
        }
    }

    /// Run the factory and wrap the result in a shared [`ServiceRef`].
    pub(crate) fn instantiate(&self, name: &str) -> Result<ServiceRef, RegistryError> {
        let boxed = self
            .create()
            .map_err(|source| RegistryError::CreateFailed {
                name: name.to_string(),
                source,
            })?;
        Ok(ServiceRef {
            service: Arc::from(boxed),
            library: self.library.clone(),
        })
    }
}

impl Deref for FactoryHandle {
    type Target = dyn ServiceFactory;

    fn deref(&self) -> &Self::Target {
        match &self.factory {
            FactoryRef::Static(factory) => *factory,
            FactoryRef::Shared(factory) => factory.as_ref(),
        }
    }
}

impl fmt::Debug for FactoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryHandle")
            .field("service_name", &self.service_name())
            .field("origin", &self.origin())
            .finish()
    }
}

/// Shared pointer to a service instance.
///
/// Clones point at the same object. When the service came from a plugin the
/// reference also keeps that plugin's library loaded, so the instance (and its
/// drop glue) never outlives the code it runs on.
#[derive(Clone)]
pub struct ServiceRef {
    // Declared before `library`: the instance must drop while its code is mapped.
    service: Arc<dyn AbstractService>,
    library: Option<Arc<DynamicLibrary>>,
}

impl ServiceRef {
    /// True when both references point at the same service object.
    pub fn ptr_eq(&self, other: &ServiceRef) -> bool {
        Arc::ptr_eq(&self.service, &other.service)
    }

    /// Downcast to the concrete service type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let service: &dyn AbstractService = self.service.as_ref();
        service.as_any().downcast_ref::<T>()
    }

    /// Library the service was loaded from, `None` for linked or owned factories.
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_deref().map(DynamicLibrary::path)
    }

    /// Number of live references to the underlying service object.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.service)
    }
}

impl Deref for ServiceRef {
    type Target = dyn AbstractService;

    fn deref(&self) -> &Self::Target {
        self.service.as_ref()
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("name", &self.service.name())
            .field("library", &self.library_path())
            .finish()
    }
}
