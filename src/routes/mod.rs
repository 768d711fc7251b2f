//! Route table served by this binary.

mod example;

use crate::application::registry::{RegistryError, RouteRegistry};

/// Build the registry of every namespace this build ships.
pub fn registry() -> Result<RouteRegistry, RegistryError> {
    let mut registry = RouteRegistry::new();
    registry.register(example::namespace()?)?;
    Ok(registry)
}
