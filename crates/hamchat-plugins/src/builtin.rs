//! Built-in plugins

use hamchat_protocol::{Header, ProtocolVersion, Recipients};
use tracing::{debug, info};

use crate::error::PluginError;
use crate::event::{EventSet, PluginEvent};
use crate::plugin::{Notification, Plugin, PluginContext, PluginDefinition};

/// Anchors the application version so other plugins can depend on it
pub struct CorePlugin {
    definition: PluginDefinition,
}

impl CorePlugin {
    pub const NAME: &'static str = "Core";

    pub fn new(app_version: &str) -> Self {
        Self {
            definition: PluginDefinition::new(Self::NAME, app_version)
                .with_description("Application version information for other plugins"),
        }
    }
}

impl Plugin for CorePlugin {
    fn definition(&self) -> &PluginDefinition {
        &self.definition
    }

    fn subscriptions(&self) -> EventSet {
        EventSet::EMPTY
    }

    fn handle(&mut self, _: &PluginEvent, _: &mut PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Text chat between stations
pub struct ChatPlugin {
    definition: PluginDefinition,
}

impl ChatPlugin {
    pub const NAME: &'static str = "chat";
    pub const VERSION: ProtocolVersion = ProtocolVersion::new(1, 0);

    pub fn new() -> Self {
        Self {
            definition: PluginDefinition::new(Self::NAME, Self::VERSION.to_string())
                .with_description("Plain text chat")
                .with_handler(Self::NAME)
                .depends_on(CorePlugin::NAME, crate::APP_VERSION),
        }
    }

    /// Encode a chat message from `sender`
    pub fn encode(sender: &str, recipients: Recipients, text: &str) -> Vec<u8> {
        Header::new(sender, Self::NAME, Self::VERSION)
            .with_recipients(recipients)
            .encode_payload(text.as_bytes())
    }
}

impl Default for ChatPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ChatPlugin {
    fn definition(&self) -> &PluginDefinition {
        &self.definition
    }

    fn handle(&mut self, event: &PluginEvent, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        match event {
            PluginEvent::Payload(payload) => {
                let Some(header) = &payload.parsed.header else {
                    return Ok(());
                };
                if !header.recipients.includes(ctx.callsign()) {
                    debug!("Chat from {} not addressed to us", header.sender);
                    return Ok(());
                }
                let text = String::from_utf8_lossy(&payload.parsed.body).into_owned();
                if !payload.complete {
                    ctx.warn(format!("message from {} may be truncated", header.sender));
                }
                ctx.notify(Notification::Chat {
                    sender: header.sender.clone(),
                    recipients: header.recipients.to_string(),
                    text,
                });
            }
            PluginEvent::Shutdown => info!("Chat plugin stopping"),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InboundPayload;

    fn run(plugin: &mut ChatPlugin, callsign: &str, raw: &[u8], complete: bool) -> Vec<Notification> {
        let mut queue = Vec::new();
        let mut ctx = PluginContext::new(ChatPlugin::NAME, callsign, &mut queue);
        let event = PluginEvent::Payload(InboundPayload::new(raw.to_vec(), complete));
        plugin.handle(&event, &mut ctx).unwrap();
        queue
    }

    #[test]
    fn test_encode() {
        assert_eq!(
            ChatPlugin::encode("N0CALL", Recipients::Broadcast, "hello"),
            b"N0CALL:chat:1.0:ALL:BEGIN:hello:END:"
        );
    }

    #[test]
    fn test_broadcast_delivered() {
        let mut chat = ChatPlugin::new();
        let out = run(&mut chat, "W1AW", b"N0CALL:chat:1.0:ALL:BEGIN:hello:END:", true);
        assert_eq!(
            out,
            [Notification::Chat {
                sender: "N0CALL".into(),
                recipients: "ALL".into(),
                text: "hello".into(),
            }]
        );
    }

    #[test]
    fn test_other_station_ignored() {
        let mut chat = ChatPlugin::new();
        let out = run(&mut chat, "W1AW", b"N0CALL:chat:1.0:K1TTT:BEGIN:hi:END:", true);
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_warns() {
        let mut chat = ChatPlugin::new();
        let out = run(&mut chat, "W1AW", b"N0CALL:chat:1.0:W1AW:BEGIN:hel", false);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Notification::Warning { .. }));
    }
}
