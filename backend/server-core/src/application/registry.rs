use crate::application::{Application, Echo, Hello, ProcessId};
use crate::error::application::ApplicationError;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::Arc;

pub type ApplicationConstructor = fn() -> Arc<dyn Application>;

/// Symbolic application names mapped to constructors.
#[derive(Clone)]
pub struct ApplicationRegistry {
    constructors: BTreeMap<String, ApplicationConstructor>,
}

impl ApplicationRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers `constructor` under `name`, replacing any earlier entry.
    pub fn register(
        mut self,
        name: impl Into<String>,
        constructor: ApplicationConstructor,
    ) -> Self {
        self.constructors.insert(name.into(), constructor);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`ApplicationError::UnknownApplication`] if nothing is
    /// registered under `name`.
    #[track_caller]
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Application>, ApplicationError> {
        let constructor =
            self.constructors
                .get(name)
                .ok_or_else(|| ApplicationError::UnknownApplication {
                    message: format!(
                        "No application named {name:?}; registered: {}",
                        self.names().collect::<Vec<_>>().join(", ")
                    ),
                    location: ErrorLocation::from(Location::caller()),
                })?;

        Ok(constructor())
    }
}

impl Default for ApplicationRegistry {
    /// The built-in applications: `hello`, `echo` and `pid`.
    fn default() -> Self {
        Self::empty()
            .register("hello", || Arc::new(Hello) as Arc<dyn Application>)
            .register("echo", || Arc::new(Echo) as Arc<dyn Application>)
            .register("pid", || Arc::new(ProcessId) as Arc<dyn Application>)
    }
}
