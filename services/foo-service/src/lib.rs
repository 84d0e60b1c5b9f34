use service_annotations::export_service;

/// Greets whoever asks. Stateless apart from the greeting prefix.
#[export_service(name = "org.example.foo")]
pub struct FooService {
    greeting: String,
}

impl Default for FooService {
    fn default() -> Self {
        FooService {
            greeting: "Hello".to_string(),
        }
    }
}

impl FooService {
    pub fn greet(&self, target: &str) -> String {
        format!("{}, {}! from FooService", self.greeting, target)
    }
}
