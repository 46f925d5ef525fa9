//! Error types for the plugin router

use std::fmt;

use thiserror::Error;

/// Errors raised by plugins or while loading them
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A handler returned an error
    #[error("{plugin}: {message}")]
    Handler { plugin: String, message: String },

    /// A handler panicked
    #[error("{plugin} panicked: {message}")]
    Panicked { plugin: String, message: String },

    /// Two factories registered under the same name
    #[error("plugin {0} registered twice")]
    Duplicate(String),

    /// A payload could not be built
    #[error("cannot build payload: {0}")]
    Payload(#[from] hamchat_protocol::HeaderError),
}

impl PluginError {
    /// Handler error for `plugin`
    pub fn handler(plugin: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Handler {
            plugin: plugin.into(),
            message: message.to_string(),
        }
    }
}

/// A dependency that no loaded plugin satisfies
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UnmetDependency {
    /// Plugin declaring the dependency
    pub plugin: String,
    /// Required plugin name
    pub requires: String,
    /// Required exact version
    pub version: String,
    /// Version actually loaded, if the plugin is present at all
    pub found: Option<String>,
}

impl fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "{} needs {} {} (loaded {})",
                self.plugin, self.requires, self.version, found
            ),
            None => write!(
                f,
                "{} needs {} {} (not loaded)",
                self.plugin, self.requires, self.version
            ),
        }
    }
}
