//! hamChat transport engine
//!
//! This crate keeps a session with an ARDOP TNC across its two TCP sockets
//! and an optional rigctld connection for keying the transmitter.
//!
//! # Architecture
//!
//! - [`ModemChannel`] opens the command and data sockets with backoff
//! - [`CommandLoop`] drains status lines, answers requests and keys the radio
//! - [`FrameAssembler`] turns data frames into complete payloads
//! - [`BufferWriter`] chunks outbound payloads and confirms them via BUFFER
//! - [`SharedState`] publishes a single [`TncState`] snapshot to readers
//!
//! The supervisor behind [`TncHandle`] wires these together, replays the
//! station provisioning on every connect and reconnects after link loss.
//!
//! # Example
//!
//! ```rust,no_run
//! use hamchat_tnc::{TncConfig, TncHandle, WriteOutcome};
//!
//! # async fn demo() -> Result<(), hamchat_tnc::TncError> {
//! let (tnc, mut payloads) = TncHandle::spawn(TncConfig::default())?;
//!
//! if tnc.write_payload(b"N0CALL:chat:1.0:ALL:BEGIN:hi:END:".to_vec()).await?
//!     == WriteOutcome::Confirmed
//! {
//!     tnc.transmit().await?;
//! }
//!
//! while let Some(payload) = payloads.recv().await {
//!     println!("{} bytes received", payload.bytes.len());
//! }
//! tnc.shutdown().await
//! # }
//! ```

pub mod assembler;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod keying;
pub mod rig;
pub mod session;
pub mod state;
pub mod writer;

pub use assembler::{AssembledPayload, Completion, FrameAssembler};
pub use channel::{ModemChannel, ModemLink};
pub use command::{apply_status, CommandClient, CommandLoop, CommandRequest};
pub use config::{RigConfig, StationConfig, TncConfig, DEFAULT_COMMAND_PORT};
pub use error::TncError;
pub use events::{EventSender, TncEvent};
pub use keying::{Keying, KeyingLine, VoxKeying};
pub use rig::RigControl;
pub use session::{TncHandle, WriteRequest};
pub use state::{ChannelKind, ConnectionStatus, SharedState, TncState};
pub use writer::{BufferWriter, WriteOutcome, WriterConfig};
