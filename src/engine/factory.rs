//! Test factory
//!
//! Maps a class name to a runnable test. Tests are registered up front under
//! the name a runner will be configured with.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::test::Test;

/// Resolves a class name into a runnable test unit
pub trait TestFactory: Send + Sync {
    /// `None` when the name cannot be resolved; the reason is only logged
    fn create(&self, class_name: &str) -> Option<Arc<dyn Test>>;
}

type Builder = Box<dyn Fn() -> anyhow::Result<Arc<dyn Test>> + Send + Sync>;

/// Name-keyed test factory
#[derive(Default)]
pub struct TestRegistry {
    builders: BTreeMap<String, Builder>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under a class name, replacing any previous one
    pub fn register<F>(&mut self, class_name: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Test>> + Send + Sync + 'static,
    {
        self.builders.insert(class_name.into(), Box::new(builder));
        self
    }

    /// Builder-style registration
    pub fn with<F>(mut self, class_name: impl Into<String>, builder: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Test>> + Send + Sync + 'static,
    {
        self.register(class_name, builder);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl TestFactory for TestRegistry {
    fn create(&self, class_name: &str) -> Option<Arc<dyn Test>> {
        let Some(builder) = self.builders.get(class_name) else {
            debug!("No test registered under {}", class_name);
            return None;
        };

        match builder() {
            Ok(test) => Some(test),
            Err(e) => {
                debug!("Failed to build {}: {:#}", class_name, e);
                None
            }
        }
    }
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRegistry")
            .field("names", &self.names())
            .finish()
    }
}
