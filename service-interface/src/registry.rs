use crate::config::{Config, ServicesConfig};
use crate::error::RegistryError;
use crate::handle::{FactoryHandle, FactoryOrigin, ServiceRef};
use crate::library::{LibraryProvider, NativeProvider};
use crate::loader::PluginLoader;
use crate::{linked_factories, ServiceFactory};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Discovers service plugins once and hands out at most one instance per
/// service name.
///
/// Construction scans the configured directory, opens every candidate library
/// and indexes the factories by the name they report. Bad files and plugins
/// without an entry point are logged and skipped. The directory is never
/// scanned again.
pub struct ServiceRegistry {
    // Field order is drop order: instances, then factories, then the loaders
    // owning the libraries their code lives in.
    instances: Mutex<HashMap<String, ServiceRef>>,
    factories: HashMap<String, FactoryHandle>,
    loaders: BTreeMap<PathBuf, PluginLoader>,
    services_dir: PathBuf,
}

static GLOBAL: OnceLock<ServiceRegistry> = OnceLock::new();

impl ServiceRegistry {
    /// Scan `config.services.dir` with the system dynamic linker.
    pub fn new(config: &Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: &Config) -> RegistryBuilder {
        RegistryBuilder {
            services: config.services.clone(),
            provider: Arc::new(NativeProvider),
            extra: Vec::new(),
        }
    }

    /// Process-wide registry, built from [`Config::from_env`] on first use by
    /// whichever thread gets here first. It is never dropped.
    ///
    /// Prefer constructing a registry explicitly and passing it to whatever
    /// needs service lookups; this accessor exists for code that cannot.
    pub fn instance() -> &'static ServiceRegistry {
        GLOBAL.get_or_init(|| ServiceRegistry::new(&Config::from_env()))
    }

    /// Shared instance of `name`, created through its factory on first request.
    ///
    /// Lookup and creation happen under one lock, so concurrent callers observe
    /// a single `create()` call. Unknown names and failed constructions are
    /// reported and not cached; a later call will try again. Factories must not
    /// request services from the same registry inside `create()`.
    pub fn get_service(&self, name: &str) -> Result<ServiceRef, RegistryError> {
        let mut instances = self.instances.lock();
        if let Some(service) = instances.get(name) {
            return Ok(service.clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;
        let service = factory.instantiate(name)?;
        debug!("created service `{}` from {}", name, factory.origin());
        instances.insert(name.to_string(), service.clone());
        Ok(service)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn origin(&self, name: &str) -> Option<FactoryOrigin> {
        self.factories.get(name).map(FactoryHandle::origin)
    }

    /// Names that already have a cached instance, sorted.
    pub fn instantiated(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Every library that was opened during the scan, including ones whose
    /// entry point could not be used.
    pub fn plugin_files(&self) -> impl Iterator<Item = &Path> {
        self.loaders.keys().map(PathBuf::as_path)
    }

    pub fn services_dir(&self) -> &Path {
        &self.services_dir
    }

    /// Write every registered service and its origin to the debug log.
    pub fn log_services(&self) {
        for name in self.service_names() {
            if let Some(origin) = self.origin(name) {
                debug!("{}: {}", name, origin);
            }
        }
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services_dir", &self.services_dir)
            .field("services", &self.service_names())
            .field("plugins", &self.loaders.len())
            .finish()
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        debug!(
            "dropping service registry for {} ({} plugins)",
            self.services_dir.display(),
            self.loaders.len()
        );
    }
}

/// Configures how a [`ServiceRegistry`] is assembled.
pub struct RegistryBuilder {
    services: ServicesConfig,
    provider: Arc<dyn LibraryProvider>,
    extra: Vec<FactoryHandle>,
}

impl RegistryBuilder {
    /// Open plugin files through `provider` instead of the system dynamic linker.
    pub fn provider(mut self, provider: Arc<dyn LibraryProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Register an application-owned factory. These are indexed after the
    /// plugins, so they replace a plugin reporting the same name.
    pub fn factory(mut self, factory: impl ServiceFactory + 'static) -> Self {
        self.extra.push(FactoryHandle::owned(factory));
        self
    }

    pub fn include_linked(mut self, include: bool) -> Self {
        self.services.include_linked = include;
        self
    }

    pub fn build(self) -> ServiceRegistry {
        let RegistryBuilder {
            services,
            provider,
            extra,
        } = self;

        let mut factories = HashMap::new();
        if services.include_linked {
            for factory in linked_factories() {
                index_factory(&mut factories, FactoryHandle::linked(factory));
            }
        }

        let mut loaders = find_service_libs(&services, provider.as_ref());
        load_service_libs(&mut loaders, &mut factories);

        for factory in extra {
            index_factory(&mut factories, factory);
        }

        info!(
            "service registry ready: {} services from {} ({} plugin files)",
            factories.len(),
            services.dir.display(),
            loaders.len()
        );

        let registry = ServiceRegistry {
            instances: Mutex::new(HashMap::new()),
            factories,
            loaders,
            services_dir: services.dir,
        };
        registry.log_services();
        registry
    }
}

/// Open a loader for every candidate file. Files that fail to open are skipped.
fn find_service_libs(
    services: &ServicesConfig,
    provider: &dyn LibraryProvider,
) -> BTreeMap<PathBuf, PluginLoader> {
    let candidates = match plugin_files(services) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(
                "cannot read services directory {}: {}",
                services.dir.display(),
                err
            );
            return BTreeMap::new();
        }
    };

    let mut loaders = BTreeMap::new();
    for path in candidates {
        match PluginLoader::with_provider(provider, &path) {
            Ok(loader) => {
                loaders.insert(path, loader);
            }
            Err(err) => warn!("skipping service library: {}", err),
        }
    }
    loaders
}

/// Resolve each loader's factory and index it by its reported service name.
fn load_service_libs(
    loaders: &mut BTreeMap<PathBuf, PluginLoader>,
    factories: &mut HashMap<String, FactoryHandle>,
) {
    for loader in loaders.values_mut() {
        match loader.factory() {
            Ok(factory) => index_factory(factories, factory),
            Err(err) => warn!("no usable service factory: {}", err),
        }
    }
}

fn index_factory(factories: &mut HashMap<String, FactoryHandle>, factory: FactoryHandle) {
    let name = factory.service_name().to_string();
    let origin = factory.origin();
    if let Some(previous) = factories.insert(name.clone(), factory) {
        warn!(
            "service `{}` from {} replaces the one from {}",
            name,
            origin,
            previous.origin()
        );
    }
}

/// Candidate plugin files directly inside `services.dir`, in path order.
pub fn plugin_files(services: &ServicesConfig) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in services.dir.read_dir()? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                warn!(
                    "skipping unreadable entry in {}: {}",
                    services.dir.display(),
                    err
                );
                continue;
            }
        };
        if path.is_file() && is_service_library(&path, services) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// True when `path` carries the shared-library extension and its file name
/// contains the library name marker.
pub fn is_service_library(path: &Path, services: &ServicesConfig) -> bool {
    let extension_matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case(&services.extension));
    let name_matches = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.contains(services.name_marker.as_str()));
    extension_matches && name_matches
}
