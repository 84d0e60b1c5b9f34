use std::path::PathBuf;
use thiserror::Error;

/// Error a service constructor may return. Plugins pick their own concrete type.
pub type CreateError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures while opening a plugin library or resolving its entry point.
///
/// All of these are per-plugin: the registry logs them and skips the plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The file could not be opened as a shared library.
    #[error("failed to load library {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    /// A required exported symbol was absent or resolved to null.
    #[error("cannot resolve symbol `{symbol}` in {}: {reason}", .path.display())]
    SymbolNotFound {
        path: PathBuf,
        symbol: String,
        reason: String,
    },

    /// The entry point ran but returned no declaration.
    #[error("{} returned a null service declaration", .path.display())]
    NullDeclaration { path: PathBuf },

    /// The plugin was built against a different ABI or interface version.
    #[error(
        "{} was built for ABI v{found_abi} (core {found_core}), host expects ABI v{expected_abi} (core {expected_core})",
        .path.display()
    )]
    AbiMismatch {
        path: PathBuf,
        found_abi: u32,
        found_core: String,
        expected_abi: u32,
        expected_core: String,
    },
}

/// Failures from [`ServiceRegistry::get_service`](crate::ServiceRegistry::get_service).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No loaded plugin or linked factory registered this name.
    #[error("service `{0}` is not registered")]
    UnknownService(String),

    /// The factory was found but its constructor failed.
    #[error("service `{name}` failed to construct: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: CreateError,
    },
}

/// Failures while reading the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
