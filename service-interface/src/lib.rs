use std::any::Any;
use std::ffi::CStr;
use std::os::raw::c_char;

mod config;
mod error;
mod handle;
mod library;
mod loader;
mod registry;

pub use config::{Config, ServicesConfig, CONFIG_PATH_ENV, SERVICES_DIR_ENV};
pub use error::{ConfigError, CreateError, PluginError, RegistryError};
pub use handle::{FactoryHandle, FactoryOrigin, ServiceRef};
pub use library::{DynamicLibrary, LibraryHandle, LibraryProvider, NativeProvider};
pub use loader::PluginLoader;
pub use registry::{is_service_library, plugin_files, RegistryBuilder, ServiceRegistry};

/// Name of the C-ABI entry point every dynamic service plugin exports.
pub const FACTORY_SYMBOL: &str = "service_factory_instance";

/// Layout version of [`ServiceDeclaration`]. Bump on any breaking change to the
/// declaration struct or the service traits.
pub const ABI_VERSION: u32 = 1;

/// Version of this crate, NUL-terminated so it can be handed across the plugin
/// boundary as a C string.
pub const CORE_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Signature of the exported `service_factory_instance` symbol.
pub type FactoryAccessor = unsafe extern "C" fn() -> *const ServiceDeclaration;

/// Helper supertrait giving every service a way to be downcast by callers.
///
/// Blanket-implemented; service authors never implement it by hand.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Marker interface implemented by every object the runtime hands out.
///
/// Callers obtain a service by name and downcast it to the concrete capability
/// they need; the registry itself knows nothing about concrete service types.
pub trait AbstractService: AsAny {
    /// Service id string, identical to the owning factory's `service_name`.
    fn name(&self) -> &str;
}

/// Produces instances of one kind of service.
pub trait ServiceFactory: Send + Sync {
    /// Registration name of the service this factory manufactures.
    fn service_name(&self) -> &str;

    /// Build a new service instance. Ownership of the box moves to the caller.
    fn create(&self) -> Result<Box<dyn AbstractService>, CreateError>;
}

/// Declaration returned by a plugin's `service_factory_instance` entry point.
///
/// `abi_version` is always the first field so hosts can reject a plugin built
/// against a different layout before touching anything else. The declaration
/// and the factory it points to live in the plugin's static storage and are
/// never freed by the host.
#[repr(C)]
pub struct ServiceDeclaration {
    pub abi_version: u32,
    /// NUL-terminated [`CORE_VERSION`] of the interface crate the plugin was built with.
    pub core_version: *const c_char,
    pub factory: &'static dyn ServiceFactory,
}

// The raw version pointer refers to a string literal in the plugin image.
unsafe impl Send for ServiceDeclaration {}
unsafe impl Sync for ServiceDeclaration {}

impl ServiceDeclaration {
    pub const fn new(factory: &'static dyn ServiceFactory) -> Self {
        Self {
            abi_version: ABI_VERSION,
            core_version: CORE_VERSION.as_ptr() as *const c_char,
            factory,
        }
    }

    /// Core version string recorded by the plugin, if it is valid UTF-8.
    ///
    /// # Safety
    /// `core_version` must be null or point to a NUL-terminated string that
    /// stays valid for the returned lifetime.
    pub unsafe fn core_version(&self) -> Option<&str> {
        if self.core_version.is_null() {
            return None;
        }
        CStr::from_ptr(self.core_version).to_str().ok()
    }
}

/// Host-side core version without the trailing NUL.
pub fn core_version() -> &'static str {
    CORE_VERSION.trim_end_matches('\0')
}

/// Registration of a factory linked directly into the running binary.
///
/// `#[export_service(linkage = "static")]` submits one of these through
/// `inventory`; registries built with `include_linked` pick them up without any
/// dynamic loading.
pub struct LinkedService {
    pub factory: &'static dyn ServiceFactory,
}

impl LinkedService {
    pub const fn new(factory: &'static dyn ServiceFactory) -> Self {
        Self { factory }
    }
}

inventory::collect!(LinkedService);

/// Iterate over every factory linked into this binary.
pub fn linked_factories() -> impl Iterator<Item = &'static dyn ServiceFactory> {
    inventory::iter::<LinkedService>
        .into_iter()
        .map(|linked| linked.factory)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl AbstractService for Probe {
        fn name(&self) -> &str {
            "org.example.probe"
        }
    }

    struct ProbeFactory;

    impl ServiceFactory for ProbeFactory {
        fn service_name(&self) -> &str {
            "org.example.probe"
        }
        fn create(&self) -> Result<Box<dyn AbstractService>, CreateError> {
            Ok(Box::new(Probe))
        }
    }

    static PROBE_FACTORY: ProbeFactory = ProbeFactory;
    static PROBE_DECLARATION: ServiceDeclaration = ServiceDeclaration::new(&PROBE_FACTORY);

    #[test]
    fn declaration_carries_host_versions() {
        assert_eq!(PROBE_DECLARATION.abi_version, ABI_VERSION);
        let recorded = unsafe { PROBE_DECLARATION.core_version() };
        assert_eq!(recorded, Some(core_version()));
        assert_eq!(PROBE_DECLARATION.factory.service_name(), "org.example.probe");
    }

    #[test]
    fn services_downcast_through_as_any() {
        let service: Box<dyn AbstractService> = PROBE_FACTORY.create().unwrap();
        assert_eq!(service.name(), "org.example.probe");
        // Deref first: the Box itself is also `Any`.
        assert!((*service).as_any().downcast_ref::<Probe>().is_some());
        assert!((*service).as_any().downcast_ref::<String>().is_none());
    }
}
