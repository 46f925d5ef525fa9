//! Explicit plugin registry
//!
//! Plugins are compiled in and registered by name with a factory. Loading
//! instantiates every registered plugin in registration order.

use tracing::debug;

use crate::builtin::{ChatPlugin, CorePlugin};
use crate::error::PluginError;
use crate::plugin::Plugin;

type Factory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Named plugin factories
#[derive(Default)]
pub struct PluginRegistry {
    factories: Vec<(String, Factory)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Core and chat plugins
    pub fn with_builtins(app_version: &str) -> Self {
        let mut registry = Self::new();
        let version = app_version.to_string();
        registry.factories.push((
            CorePlugin::NAME.to_string(),
            Box::new(move || Box::new(CorePlugin::new(&version))),
        ));
        registry.factories.push((
            ChatPlugin::NAME.to_string(),
            Box::new(|| Box::new(ChatPlugin::new())),
        ));
        registry
    }

    /// Add a factory; names must be unique
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), PluginError>
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(PluginError::Duplicate(name));
        }
        debug!("Registered plugin factory {}", name);
        self.factories.push((name, Box::new(factory)));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build one instance of every registered plugin
    pub fn instantiate(&self) -> Vec<Box<dyn Plugin>> {
        self.factories.iter().map(|(_, factory)| factory()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = PluginRegistry::with_builtins("0.3");
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Core", "chat"]);

        let plugins = registry.instantiate();
        assert_eq!(plugins[0].definition().version, "0.3");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = PluginRegistry::with_builtins("0.3");
        let err = registry
            .register("chat", || Box::new(ChatPlugin::new()))
            .unwrap_err();
        assert_eq!(err, PluginError::Duplicate("chat".into()));
        assert_eq!(registry.len(), 2);
    }
}
