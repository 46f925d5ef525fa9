//! Integration tests for the plugin router
//!
//! - Header dispatch, wildcard handlers and headerless payloads
//! - Version mismatch warnings
//! - Dependency checking
//! - Failure isolation during lifecycle fan-out

use std::sync::{Arc, Mutex};

use hamchat_plugins::{
    ChatPlugin, EventKind, EventSet, Notification, Plugin, PluginContext, PluginDefinition,
    PluginError, PluginEvent, PluginRegistry, PluginRouter, APP_VERSION,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub type Log = Arc<Mutex<Vec<(String, EventKind)>>>;

    pub enum Behavior {
        Ok,
        Fail,
        Panic,
    }

    /// Plugin recording every event it sees into a shared log
    pub struct Scripted {
        pub definition: PluginDefinition,
        pub log: Log,
        pub behavior: Behavior,
    }

    impl Plugin for Scripted {
        fn definition(&self) -> &PluginDefinition {
            &self.definition
        }

        fn subscriptions(&self) -> EventSet {
            EventSet::ALL
        }

        fn handle(
            &mut self,
            event: &PluginEvent,
            ctx: &mut PluginContext<'_>,
        ) -> Result<(), PluginError> {
            self.log
                .lock()
                .unwrap()
                .push((self.definition.name.clone(), event.kind()));
            match self.behavior {
                Behavior::Ok => {
                    if let PluginEvent::Payload(p) = event {
                        if p.parsed.body == b"ping" {
                            ctx.send(b"pong:END:".to_vec());
                        }
                    }
                    Ok(())
                }
                Behavior::Fail => Err(PluginError::handler(&self.definition.name, "boom")),
                Behavior::Panic => panic!("plugin bug"),
            }
        }
    }

    pub fn scripted(definition: PluginDefinition, log: &Log, behavior: Behavior) -> Box<dyn Plugin> {
        Box::new(Scripted {
            definition,
            log: Arc::clone(log),
            behavior,
        })
    }

    pub fn seen(log: &Log) -> Vec<(String, EventKind)> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    pub fn names(log: &Log) -> Vec<String> {
        seen(log).into_iter().map(|(n, _)| n).collect()
    }

    pub fn warnings(notes: &[Notification]) -> usize {
        notes
            .iter()
            .filter(|n| matches!(n, Notification::Warning { .. }))
            .count()
    }

    /// Router with a wildcard plugin, a "files" plugin and the built-ins
    pub fn router(log: &Log) -> PluginRouter {
        let mut registry = PluginRegistry::with_builtins(APP_VERSION);
        let wild = log.clone();
        registry
            .register("monitor", move || {
                scripted(
                    PluginDefinition::new("monitor", "0.1").with_handler("ALL"),
                    &wild,
                    Behavior::Ok,
                )
            })
            .unwrap();
        let files = log.clone();
        registry
            .register("files", move || {
                scripted(
                    PluginDefinition::new("files", "1.0")
                        .with_handler("files")
                        .depends_on("Core", APP_VERSION),
                    &files,
                    Behavior::Ok,
                )
            })
            .unwrap();
        PluginRouter::load(&registry, "W1AW")
    }
}

// ============================================================================
// Dispatch Tests
// ============================================================================

mod dispatch_tests {
    use super::*;

    #[test]
    fn payload_goes_to_matching_and_wildcard_plugins() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);
        assert!(router.are_dependencies_satisfied());

        let report = router.dispatch_payload(b"N0CALL:files:1.0:ALL:BEGIN:data:END:".to_vec(), true);

        assert_eq!(report.delivered, ["monitor", "files"]);
        assert_eq!(report.version_warnings, 0);
        assert_eq!(helpers::names(&log), ["monitor", "files"]);
    }

    #[test]
    fn handler_match_is_exact() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        router.dispatch_payload(b"N0CALL:file:1.0:ALL:BEGIN:data:END:".to_vec(), true);
        router.dispatch_payload(b"N0CALL:filesx:1.0:ALL:BEGIN:data:END:".to_vec(), true);

        assert_eq!(helpers::names(&log), ["monitor", "monitor"]);
    }

    #[test]
    fn headerless_payload_only_reaches_wildcard() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        let report = router.dispatch_payload(b"just some noise:END:".to_vec(), true);
        assert_eq!(report.delivered, ["monitor"]);
        assert!(router
            .drain_notifications()
            .iter()
            .all(|n| !matches!(n, Notification::Chat { .. })));
    }

    #[test]
    fn chat_payload_is_shown() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        let payload = ChatPlugin::encode("N0CALL", hamchat_protocol::Recipients::Broadcast, "hello");
        router.dispatch_payload(payload, true);

        let notes = router.drain_notifications();
        assert_eq!(
            notes,
            [Notification::Chat {
                sender: "N0CALL".into(),
                recipients: "ALL".into(),
                text: "hello".into(),
            }]
        );
    }

    #[test]
    fn version_mismatch_warns_once_and_still_delivers() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        let report = router.dispatch_payload(b"N0CALL:files:2.0:ALL:BEGIN:data:END:".to_vec(), true);

        assert_eq!(report.delivered, ["monitor", "files"]);
        assert_eq!(report.version_warnings, 1);
        assert_eq!(helpers::warnings(&router.drain_notifications()), 1);
    }

    #[test]
    fn plugins_can_queue_outbound_payloads() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        router.dispatch_payload(b"ping:END:".to_vec(), true);
        assert_eq!(
            router.drain_notifications(),
            [Notification::Outbound {
                plugin: "monitor".into(),
                payload: b"pong:END:".to_vec(),
            }]
        );
    }
}

// ============================================================================
// Dependency Tests
// ============================================================================

mod dependency_tests {
    use super::*;

    #[test]
    fn all_unmet_dependencies_are_reported() {
        let log = helpers::Log::default();
        let plugins = vec![
            helpers::scripted(
                PluginDefinition::new("a", "1.0")
                    .depends_on("Core", "9.9")
                    .depends_on("missing", "1.0"),
                &log,
                helpers::Behavior::Ok,
            ),
            helpers::scripted(
                PluginDefinition::new("b", "1.0").depends_on("a", "2.0"),
                &log,
                helpers::Behavior::Ok,
            ),
            Box::new(hamchat_plugins::CorePlugin::new("0.1")) as Box<dyn Plugin>,
        ];
        let mut router = PluginRouter::from_plugins(plugins, "W1AW");

        assert!(!router.are_dependencies_satisfied());
        let unmet: Vec<_> = router
            .unmet_dependencies()
            .iter()
            .map(|u| (u.plugin.as_str(), u.requires.as_str(), u.found.as_deref()))
            .collect();
        assert_eq!(
            unmet,
            [
                ("a", "Core", Some("0.1")),
                ("a", "missing", None),
                ("b", "a", Some("1.0")),
            ]
        );

        // Degraded, not aborted: one summary warning and events still flow
        assert_eq!(helpers::warnings(&router.drain_notifications()), 1);
        let report = router.broadcast(&PluginEvent::Shutdown);
        assert_eq!(report.delivered, ["a", "b"]);
    }
}

// ============================================================================
// Isolation Tests
// ============================================================================

mod isolation_tests {
    use super::*;

    #[test]
    fn failing_and_panicking_plugins_do_not_stop_fan_out() {
        let log = helpers::Log::default();
        let plugins = vec![
            helpers::scripted(PluginDefinition::new("bad", "1.0"), &log, helpers::Behavior::Fail),
            helpers::scripted(PluginDefinition::new("worse", "1.0"), &log, helpers::Behavior::Panic),
            helpers::scripted(PluginDefinition::new("good", "1.0"), &log, helpers::Behavior::Ok),
        ];
        let mut router = PluginRouter::from_plugins(plugins, "W1AW");

        for event in [
            PluginEvent::TransmitRequested,
            PluginEvent::BufferCleared,
            PluginEvent::Shutdown,
        ] {
            let report = router.broadcast(&event);
            assert_eq!(report.delivered, ["good"]);
            assert_eq!(report.failed.len(), 2);
            assert!(matches!(report.failed[1], PluginError::Panicked { .. }));
        }
        assert_eq!(helpers::seen(&log).len(), 9);
    }

    #[test]
    fn keying_and_command_lines_reach_subscribers() {
        let log = helpers::Log::default();
        let mut router = helpers::router(&log);

        router.broadcast(&PluginEvent::KeyingChanged { keyed: true });
        router.broadcast(&PluginEvent::CommandLine("BUFFER 0".into()));

        let kinds: Vec<_> = helpers::seen(&log).into_iter().map(|(_, k)| k).collect();
        assert_eq!(
            kinds,
            [
                EventKind::KeyingChanged,
                EventKind::KeyingChanged,
                EventKind::CommandLine,
                EventKind::CommandLine,
            ]
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn one_warning_per_mismatched_dispatch(
            versions in prop::collection::vec((0u32..3, 0u32..3), 1..20),
        ) {
            let log = helpers::Log::default();
            let mut router = helpers::router(&log);
            router.drain_notifications();

            let mut expected = 0;
            for (major, minor) in versions {
                let raw = format!("N0CALL:files:{}.{}:ALL:BEGIN:x:END:", major, minor);
                let report = router.dispatch_payload(raw.into_bytes(), true);
                let mismatch = (major, minor) != (1, 0);
                prop_assert_eq!(report.version_warnings, usize::from(mismatch));
                prop_assert!(report.delivered.contains(&"files".to_string()));
                expected += usize::from(mismatch);
            }
            prop_assert_eq!(helpers::warnings(&router.drain_notifications()), expected);
        }

        #[test]
        fn unmet_set_is_complete(
            deps in prop::collection::vec(("[a-c]", "[0-1]\\.[0-1]"), 0..8),
        ) {
            let log = helpers::Log::default();
            let mut def = PluginDefinition::new("x", "1.0");
            for (name, version) in &deps {
                def = def.depends_on(name.clone(), version.clone());
            }
            let plugins = vec![
                helpers::scripted(def, &log, helpers::Behavior::Ok),
                helpers::scripted(PluginDefinition::new("a", "1.0"), &log, helpers::Behavior::Ok),
            ];
            let router = PluginRouter::from_plugins(plugins, "W1AW");

            let expected = deps
                .iter()
                .filter(|(name, version)| !(name == "a" && version == "1.0"))
                .count();
            prop_assert_eq!(router.unmet_dependencies().len(), expected);
            prop_assert_eq!(router.are_dependencies_satisfied(), expected == 0);
        }
    }
}
