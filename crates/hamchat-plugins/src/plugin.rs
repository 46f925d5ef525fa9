//! Plugin trait and definitions

use std::fmt;

use hamchat_protocol::{Header, ProtocolVersion, Recipients};
use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::event::{EventSet, PluginEvent};

/// Wildcard handler token
pub const WILDCARD: &str = "ALL";

/// Which payloads a plugin handles
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HandlerId {
    /// Every payload, including headerless ones
    All,
    /// Payloads whose protocol identifier matches exactly
    Protocol(String),
}

impl From<String> for HandlerId {
    fn from(value: String) -> Self {
        if value == WILDCARD {
            Self::All
        } else {
            Self::Protocol(value)
        }
    }
}

impl From<&str> for HandlerId {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<HandlerId> for String {
    fn from(id: HandlerId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(WILDCARD),
            Self::Protocol(id) => f.write_str(id),
        }
    }
}

/// A required plugin and its exact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Static description of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDefinition {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub handlers: Vec<HandlerId>,
    #[serde(default)]
    pub depends_on: Vec<Dependency>,
}

impl PluginDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            author: String::new(),
            description: String::new(),
            handlers: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_handler(mut self, handler: impl Into<HandlerId>) -> Self {
        self.handlers.push(handler.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.depends_on.push(Dependency::new(name, version));
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.handlers.contains(&HandlerId::All)
    }

    /// Whether a remote `version` differs from ours
    pub fn version_differs(&self, version: ProtocolVersion) -> bool {
        self.version
            .parse::<ProtocolVersion>()
            .map_or(true, |ours| ours != version)
    }
}

/// Something a plugin wants the host to do or show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Non-fatal problem to surface to the operator
    Warning { source: String, message: String },
    /// A chat message for display
    Chat {
        sender: String,
        recipients: String,
        text: String,
    },
    /// A payload to load into the TNC buffer
    Outbound { plugin: String, payload: Vec<u8> },
}

/// Handed to plugins while they handle an event
pub struct PluginContext<'a> {
    plugin: &'a str,
    callsign: &'a str,
    notifications: &'a mut Vec<Notification>,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(
        plugin: &'a str,
        callsign: &'a str,
        notifications: &'a mut Vec<Notification>,
    ) -> Self {
        Self {
            plugin,
            callsign,
            notifications,
        }
    }

    /// Own station callsign
    pub fn callsign(&self) -> &str {
        self.callsign
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let source = self.plugin.to_string();
        self.notify(Notification::Warning {
            source,
            message: message.into(),
        });
    }

    /// Queue a payload for transmission
    pub fn send(&mut self, payload: Vec<u8>) {
        let plugin = self.plugin.to_string();
        self.notify(Notification::Outbound { plugin, payload });
    }

    /// Build a payload with our header and queue it
    pub fn send_with_header(
        &mut self,
        protocol_id: &str,
        version: &str,
        recipients: Recipients,
        body: &[u8],
    ) -> Result<(), PluginError> {
        let header = Header::new(self.callsign, protocol_id, version.parse()?)
            .with_recipients(recipients);
        self.send(header.encode_payload(body));
        Ok(())
    }
}

/// A loadable extension
pub trait Plugin: Send {
    fn definition(&self) -> &PluginDefinition;

    /// Non-payload events this plugin wants
    ///
    /// The default is [`EventSet::LIFECYCLE`], so every plugin hears transmit
    /// requests, buffer clears, settings changes and shutdown unless it opts
    /// out. Command traffic, buffer loads and keying are opt-in.
    fn subscriptions(&self) -> EventSet {
        EventSet::LIFECYCLE
    }

    fn handle(&mut self, event: &PluginEvent, ctx: &mut PluginContext<'_>)
        -> Result<(), PluginError>;
}
