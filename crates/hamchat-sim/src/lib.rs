//! ARDOP TNC and rigctld simulation
//!
//! Stand-ins for the external processes the transport engine talks to:
//!
//! - **VirtualTnc**: command/status behaviour and buffer accounting of a TNC
//! - **VirtualTncServer**: serves a `VirtualTnc` on loopback command and data ports
//! - **VirtualRig** / **VirtualRigServer**: a rigctld that records PTT changes
//!
//! # Example
//!
//! ```rust
//! use hamchat_sim::VirtualTnc;
//!
//! let mut tnc = VirtualTnc::new();
//! tnc.process_line("MYCALL N0CALL");
//! assert_eq!(tnc.take_output().as_deref(), Some("MYCALL now N0CALL"));
//! ```

pub mod rig;
pub mod server;
pub mod tnc;

pub use rig::{VirtualRig, VirtualRigServer};
pub use server::VirtualTncServer;
pub use tnc::VirtualTnc;
