//! Plugin router
//!
//! Owns the loaded plugins for the life of the process. At load time every
//! declared dependency is checked; unmet dependencies are reported together
//! and leave the plugin set degraded but running. At run time payloads are
//! routed by header protocol identifier and other events through a lookup
//! table keyed by [`EventKind`]. Each handler invocation is isolated: an
//! error or panic in one plugin never stops delivery to the others.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::error::{PluginError, UnmetDependency};
use crate::event::{EventKind, InboundPayload, PluginEvent};
use crate::plugin::{HandlerId, Notification, Plugin, PluginContext, PluginDefinition};
use crate::registry::PluginRegistry;

/// Outcome of delivering one event
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugins whose handler returned Ok
    pub delivered: Vec<String>,
    /// Plugins whose handler failed
    pub failed: Vec<PluginError>,
    /// Version mismatch warnings raised
    pub version_warnings: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Routes payloads and lifecycle events to plugins
pub struct PluginRouter {
    plugins: Vec<Box<dyn Plugin>>,
    wildcard: Vec<usize>,
    by_protocol: HashMap<String, Vec<usize>>,
    by_event: HashMap<EventKind, Vec<usize>>,
    unmet: Vec<UnmetDependency>,
    callsign: String,
    notifications: Vec<Notification>,
}

impl PluginRouter {
    /// Instantiate every plugin in `registry`
    pub fn load(registry: &PluginRegistry, callsign: impl Into<String>) -> Self {
        Self::from_plugins(registry.instantiate(), callsign)
    }

    /// Take ownership of already built plugins
    pub fn from_plugins(plugins: Vec<Box<dyn Plugin>>, callsign: impl Into<String>) -> Self {
        let mut wildcard = Vec::new();
        let mut by_protocol: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_event: HashMap<EventKind, Vec<usize>> = HashMap::new();

        for (idx, plugin) in plugins.iter().enumerate() {
            let def = plugin.definition();
            for handler in &def.handlers {
                match handler {
                    HandlerId::All => wildcard.push(idx),
                    HandlerId::Protocol(id) => by_protocol.entry(id.clone()).or_default().push(idx),
                }
            }
            for kind in plugin.subscriptions().iter() {
                by_event.entry(kind).or_default().push(idx);
            }
            info!("Loaded plugin {} {}", def.name, def.version);
        }
        wildcard.dedup();

        let unmet = check_dependencies(&plugins);
        let mut router = Self {
            plugins,
            wildcard,
            by_protocol,
            by_event,
            unmet,
            callsign: callsign.into(),
            notifications: Vec::new(),
        };

        if !router.unmet.is_empty() {
            let list = router
                .unmet
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!("Plugin dependencies not satisfied: {}", list);
            router.notifications.push(Notification::Warning {
                source: "plugins".to_string(),
                message: format!("plugin dependencies not satisfied: {}", list),
            });
        }
        router
    }

    pub fn are_dependencies_satisfied(&self) -> bool {
        self.unmet.is_empty()
    }

    /// Every unmet dependency found at load time
    pub fn unmet_dependencies(&self) -> &[UnmetDependency] {
        &self.unmet
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PluginDefinition> {
        self.plugins.iter().map(|p| p.definition())
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    /// Take queued notifications
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Route a reassembled payload
    ///
    /// Wildcard plugins see every payload; others only payloads whose
    /// protocol identifier equals one of their handlers. A remote version
    /// different from the plugin's raises one warning per delivery but the
    /// payload is still delivered.
    pub fn dispatch_payload(&mut self, raw: Vec<u8>, complete: bool) -> DispatchReport {
        let payload = InboundPayload::new(raw, complete);
        let mut report = DispatchReport::default();

        let matched: &[usize] = payload
            .parsed
            .protocol_id()
            .and_then(|id| self.by_protocol.get(id))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut targets: Vec<(usize, bool)> = self.wildcard.iter().map(|&i| (i, false)).collect();
        for &idx in matched {
            match targets.iter_mut().find(|(i, _)| *i == idx) {
                Some(target) => target.1 = true,
                None => targets.push((idx, true)),
            }
        }
        targets.sort_unstable_by_key(|(i, _)| *i);

        if targets.is_empty() {
            debug!(
                "No plugin handles payload {:?}",
                payload.parsed.protocol_id()
            );
            return report;
        }

        if let Some(header) = &payload.parsed.header {
            for &(idx, by_protocol) in &targets {
                let def = self.plugins[idx].definition();
                if by_protocol && def.version_differs(header.version) {
                    let message = format!(
                        "local plugin {} {} differs from remote version {}, data may not be handled correctly",
                        def.name, def.version, header.version
                    );
                    warn!("{}", message);
                    self.notifications.push(Notification::Warning {
                        source: def.name.clone(),
                        message,
                    });
                    report.version_warnings += 1;
                }
            }
        }

        let event = PluginEvent::Payload(payload);
        for (idx, _) in targets {
            self.invoke(idx, &event, &mut report);
        }
        report
    }

    /// Deliver an event to every subscribed plugin
    pub fn broadcast(&mut self, event: &PluginEvent) -> DispatchReport {
        if let PluginEvent::Payload(payload) = event {
            return self.dispatch_payload(payload.raw.clone(), payload.complete);
        }
        if let PluginEvent::SettingsChanged { callsign, .. } = event {
            self.callsign = callsign.clone();
        }

        let mut report = DispatchReport::default();
        let targets = self.by_event.get(&event.kind()).cloned().unwrap_or_default();
        for idx in targets {
            self.invoke(idx, event, &mut report);
        }
        report
    }

    fn invoke(&mut self, idx: usize, event: &PluginEvent, report: &mut DispatchReport) {
        let Self {
            plugins,
            callsign,
            notifications,
            ..
        } = self;
        let plugin = &mut plugins[idx];
        let name = plugin.definition().name.clone();
        let mut ctx = PluginContext::new(&name, callsign, notifications);

        let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.handle(event, &mut ctx)));
        match result {
            Ok(Ok(())) => report.delivered.push(name),
            Ok(Err(e)) => {
                warn!("Plugin {} failed on {:?}: {}", name, event.kind(), e);
                report.failed.push(e);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Plugin {} panicked on {:?}: {}", name, event.kind(), message);
                report.failed.push(PluginError::Panicked {
                    plugin: name,
                    message,
                });
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Every dependency that does not resolve to a loaded plugin of the exact version
fn check_dependencies(plugins: &[Box<dyn Plugin>]) -> Vec<UnmetDependency> {
    let loaded: HashMap<&str, &str> = plugins
        .iter()
        .map(|p| {
            let def = p.definition();
            (def.name.as_str(), def.version.as_str())
        })
        .collect();

    let mut unmet = Vec::new();
    for plugin in plugins {
        let def = plugin.definition();
        for dep in &def.depends_on {
            let found = loaded.get(dep.name.as_str()).copied();
            if found != Some(dep.version.as_str()) {
                unmet.push(UnmetDependency {
                    plugin: def.name.clone(),
                    requires: dep.name.clone(),
                    version: dep.version.clone(),
                    found: found.map(str::to_string),
                });
            }
        }
    }
    unmet
}
