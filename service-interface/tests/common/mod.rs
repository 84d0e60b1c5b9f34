#![allow(dead_code)]

use service_interface::{
    AbstractService, Config, CreateError, FactoryAccessor, LibraryHandle, LibraryProvider,
    RegistryBuilder, ServiceDeclaration, ServiceFactory, ServiceRegistry,
};
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Service handed out by the test factories.
pub struct Sample {
    name: &'static str,
    pub serial: usize,
    pub flavour: &'static str,
}

impl AbstractService for Sample {
    fn name(&self) -> &str {
        self.name
    }
}

pub struct CountingFactory {
    name: &'static str,
    flavour: &'static str,
    created: AtomicUsize,
}

impl CountingFactory {
    pub const fn new(name: &'static str, flavour: &'static str) -> Self {
        Self {
            name,
            flavour,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ServiceFactory for CountingFactory {
    fn service_name(&self) -> &str {
        self.name
    }

    fn create(&self) -> Result<Box<dyn AbstractService>, CreateError> {
        let serial = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Sample {
            name: self.name,
            serial,
            flavour: self.flavour,
        }))
    }
}

/// Fails the first `failures` constructions, then succeeds.
pub struct FlakyFactory {
    name: &'static str,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyFactory {
    pub fn new(name: &'static str, failures: usize) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                failures,
                attempts: attempts.clone(),
            },
            attempts,
        )
    }
}

impl ServiceFactory for FlakyFactory {
    fn service_name(&self) -> &str {
        self.name
    }

    fn create(&self) -> Result<Box<dyn AbstractService>, CreateError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(format!("attempt {} refused", attempt).into());
        }
        Ok(Box::new(Sample {
            name: self.name,
            serial: attempt,
            flavour: "flaky",
        }))
    }
}

macro_rules! plugin_entry {
    ($entry:ident, $decl:ident, $factory:ident, $name:expr, $flavour:expr) => {
        pub static $factory: CountingFactory = CountingFactory::new($name, $flavour);
        static $decl: ServiceDeclaration = ServiceDeclaration::new(&$factory);
        pub extern "C" fn $entry() -> *const ServiceDeclaration {
            &$decl
        }
    };
}

plugin_entry!(foo_entry, FOO_DECL, FOO, "org.example.foo", "foo");
plugin_entry!(bar_entry, BAR_DECL, BAR, "org.example.bar", "bar");
plugin_entry!(foo_rival_entry, FOO_RIVAL_DECL, FOO_RIVAL, "org.example.foo", "rival");
plugin_entry!(shared_entry, SHARED_DECL, SHARED, "org.example.shared", "shared");

static STALE_DECL: ServiceDeclaration = ServiceDeclaration {
    abi_version: service_interface::ABI_VERSION + 7,
    core_version: std::ptr::null(),
    factory: &BAR,
};

pub extern "C" fn stale_entry() -> *const ServiceDeclaration {
    &STALE_DECL
}

#[derive(Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockHandle {
    entry: Option<FactoryAccessor>,
    counters: Arc<Counters>,
}

impl LibraryHandle for MockHandle {
    fn symbol(&self, name: &str) -> Result<*mut c_void, String> {
        match self.entry {
            Some(entry) if name == service_interface::FACTORY_SYMBOL => Ok(entry as *mut c_void),
            _ => Err(format!("undefined symbol: {}", name)),
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stands in for the dynamic linker. Files it does not know about fail to
/// open the way a non-ELF file would.
#[derive(Default)]
pub struct MockProvider {
    libraries: HashMap<String, Option<FactoryAccessor>>,
    pub counters: Arc<Counters>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// `file` opens and exports `entry` as the factory accessor.
    pub fn service(mut self, file: &str, entry: FactoryAccessor) -> Self {
        self.libraries.insert(file.to_string(), Some(entry));
        self
    }

    /// `file` opens but exports no factory accessor.
    pub fn library(mut self, file: &str) -> Self {
        self.libraries.insert(file.to_string(), None);
        self
    }
}

impl LibraryProvider for MockProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, String> {
        let file = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        match self.libraries.get(file) {
            Some(entry) => {
                self.counters.opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockHandle {
                    entry: *entry,
                    counters: self.counters.clone(),
                }))
            }
            None => Err(format!("{}: invalid ELF header", path.display())),
        }
    }
}

/// Temporary services directory containing empty files with these names.
pub fn plugin_dir(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for file in files {
        std::fs::write(dir.path().join(file), b"").expect("write plugin file");
    }
    dir
}

/// Builder over `dir` using `provider`, without linked factories.
pub fn builder(dir: &TempDir, provider: MockProvider) -> (RegistryBuilder, Arc<Counters>) {
    let counters = provider.counters.clone();
    let config = Config::with_services_dir(dir.path());
    let builder = ServiceRegistry::builder(&config)
        .include_linked(false)
        .provider(Arc::new(provider));
    (builder, counters)
}
