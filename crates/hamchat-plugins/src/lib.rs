//! hamChat plugin router
//!
//! Payloads carry an application header naming the protocol that should
//! handle them (`SENDER:ID:VER:RCPT:BEGIN:body:END:`). This crate routes
//! each reassembled payload to the plugins registered for that identifier
//! and fans host lifecycle events out to subscribed plugins.
//!
//! - **PluginRegistry**: compiled-in plugin factories
//! - **PluginRouter**: dependency check at load, header dispatch, event fan-out
//! - **Plugin**: trait implemented by every plugin
//!
//! Plugins talk back to the host through [`Notification`]s queued on the
//! router and collected with [`PluginRouter::drain_notifications`].
//!
//! # Example
//!
//! ```rust
//! use hamchat_plugins::{Notification, PluginRegistry, PluginRouter, APP_VERSION};
//!
//! let registry = PluginRegistry::with_builtins(APP_VERSION);
//! let mut router = PluginRouter::load(&registry, "W1AW");
//! assert!(router.are_dependencies_satisfied());
//!
//! router.dispatch_payload(b"N0CALL:chat:1.0:ALL:BEGIN:hello:END:".to_vec(), true);
//! let notes = router.drain_notifications();
//! assert!(matches!(&notes[0], Notification::Chat { text, .. } if text == "hello"));
//! ```

pub mod builtin;
pub mod error;
pub mod event;
pub mod plugin;
pub mod registry;
pub mod router;

pub use builtin::{ChatPlugin, CorePlugin};
pub use error::{PluginError, UnmetDependency};
pub use event::{EventKind, EventSet, InboundPayload, PluginEvent};
pub use plugin::{
    Dependency, HandlerId, Notification, Plugin, PluginContext, PluginDefinition, WILDCARD,
};
pub use registry::PluginRegistry;
pub use router::{DispatchReport, PluginRouter};

/// Version the Core plugin reports; built-in plugins depend on it
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
