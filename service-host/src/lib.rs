use service_annotations::export_service;
use service_interface::{Config, RegistryError, ServiceRef, ServiceRegistry};
use std::fmt::Write;

/// Reports on the host itself. Linked into the binary, so it is available even
/// when the services directory is empty.
#[export_service(name = "org.example.host.status", linkage = "static")]
#[derive(Default)]
pub struct HostStatus;

impl HostStatus {
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

/// Application context: the configuration plus the registry built from it.
pub struct Host {
    config: Config,
    registry: ServiceRegistry,
}

impl Host {
    pub fn new(config: Config) -> Self {
        let registry = ServiceRegistry::new(&config);
        Self::with_registry(config, registry)
    }

    /// Use a registry assembled by the caller, e.g. with extra owned factories.
    pub fn with_registry(config: Config, registry: ServiceRegistry) -> Self {
        Host { config, registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Instantiate the configured main service. `Ok(None)` when none is set.
    pub fn main_service(&self) -> Result<Option<ServiceRef>, RegistryError> {
        match &self.config.main_service {
            Some(name) => self.registry.get_service(name).map(Some),
            None => Ok(None),
        }
    }

    /// One line per registered service: name, origin, and `*` once instantiated.
    pub fn summary(&self) -> String {
        let instantiated = self.registry.instantiated();
        let mut out = format!("services in {}:\n", self.registry.services_dir().display());
        for name in self.registry.service_names() {
            let origin = self
                .registry
                .origin(name)
                .map(|origin| origin.to_string())
                .unwrap_or_default();
            let mark = if instantiated.iter().any(|n| n == name) {
                " *"
            } else {
                ""
            };
            let _ = writeln!(out, "  {} ({}){}", name, origin, mark);
        }
        out
    }
}
