mod common;

use common::{builder, plugin_dir, CountingFactory, MockProvider, Sample};
use service_interface::{FactoryOrigin, LinkedService};

static LINKED_FOO: CountingFactory = CountingFactory::new("org.example.foo", "linked");
static LINKED_ONLY: CountingFactory = CountingFactory::new("org.example.linked", "linked");

inventory::submit! {
    LinkedService::new(&LINKED_FOO)
}

inventory::submit! {
    LinkedService::new(&LINKED_ONLY)
}

#[test]
fn plugins_replace_linked_factories_with_the_same_name() {
    let dir = plugin_dir(&["libfoo.so"]);
    let provider = MockProvider::new().service("libfoo.so", common::foo_entry);
    let (builder, _) = builder(&dir, provider);
    let registry = builder.include_linked(true).build();

    assert_eq!(
        registry.origin("org.example.foo"),
        Some(FactoryOrigin::Library(dir.path().join("libfoo.so")))
    );
    let foo = registry.get_service("org.example.foo").unwrap();
    assert_eq!(foo.downcast_ref::<Sample>().map(|s| s.flavour), Some("foo"));
    assert_eq!(LINKED_FOO.created(), 0);

    assert_eq!(registry.origin("org.example.linked"), Some(FactoryOrigin::Linked));
    let linked = registry.get_service("org.example.linked").unwrap();
    assert_eq!(linked.downcast_ref::<Sample>().map(|s| s.flavour), Some("linked"));
    assert!(linked.library_path().is_none());
}

#[test]
fn linked_factories_are_skipped_when_disabled() {
    let dir = plugin_dir(&[]);
    let (builder, _) = builder(&dir, MockProvider::new());
    let registry = builder.build();

    assert!(!registry.contains("org.example.linked"));
    assert!(!registry.contains("org.example.foo"));
}
