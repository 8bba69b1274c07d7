//! Sample functions bundled with the host.
//!
//! Each module exposes descriptor constructors; [`register_all`] registers the
//! full set into a registry before the host is started.

pub mod blob;
pub mod http;
pub mod timer;

use fnhost_engine::{FunctionRegistry, RegistrationError};

/// Register every bundled function.
pub fn register_all(registry: &mut FunctionRegistry) -> Result<(), RegistrationError> {
    registry.register(http::http_trigger())?;
    registry.register(http::http_example_retry())?;
    registry.register(http::http_trigger_runtime_version())?;
    registry.register(timer::timer_trigger())?;
    registry.register(blob::blob_trigger_to_blob())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_sample() {
        let mut registry = FunctionRegistry::new();
        register_all(&mut registry).unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                http::HTTP_TRIGGER,
                http::HTTP_EXAMPLE_RETRY,
                http::HTTP_TRIGGER_RUNTIME_VERSION,
                timer::TIMER_TRIGGER,
                blob::BLOB_TRIGGER_TO_BLOB,
            ]
        );
    }

    #[test]
    fn registering_twice_is_rejected() {
        let mut registry = FunctionRegistry::new();
        register_all(&mut registry).unwrap();
        assert!(matches!(register_all(&mut registry), Err(RegistrationError::DuplicateName { .. })));
        assert_eq!(registry.len(), 5);
    }
}
