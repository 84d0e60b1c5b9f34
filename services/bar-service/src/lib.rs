use log::debug;
use service_annotations::export_service;
use std::env;
use std::fmt;

/// Set to refuse construction, which lets hosts exercise a failing factory.
pub const REFUSE_ENV: &str = "BAR_SERVICE_REFUSE";

/// Keeps a running tally. Construction can fail, so it goes through
/// [`BarService::open`] instead of `Default`.
#[export_service(name = "org.example.bar", constructor = BarService::open)]
pub struct BarService {
    tally: std::sync::atomic::AtomicU64,
}

#[derive(Debug)]
pub struct Refused;

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bar service disabled by {}", REFUSE_ENV)
    }
}

impl std::error::Error for Refused {}

impl BarService {
    pub fn open() -> Result<Self, Refused> {
        if env::var_os(REFUSE_ENV).is_some() {
            return Err(Refused);
        }
        debug!("bar service opened");
        Ok(BarService {
            tally: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Add `amount` and return the new total.
    pub fn add(&self, amount: u64) -> u64 {
        use std::sync::atomic::Ordering;
        self.tally.fetch_add(amount, Ordering::SeqCst) + amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_interface::ServiceFactory;

    #[test]
    fn factory_uses_the_fallible_constructor() {
        // Only this test touches the variable in this binary.
        env::remove_var(REFUSE_ENV);
        let service = BarServiceFactory.create().unwrap();
        assert_eq!(service.name(), "org.example.bar");
        let bar = (*service).as_any().downcast_ref::<BarService>().unwrap();
        assert_eq!(bar.add(2), 2);
        assert_eq!(bar.add(3), 5);

        env::set_var(REFUSE_ENV, "1");
        let err = BarServiceFactory.create().err().unwrap();
        assert_eq!(err.to_string(), "bar service disabled by BAR_SERVICE_REFUSE");
        env::remove_var(REFUSE_ENV);
    }
}
