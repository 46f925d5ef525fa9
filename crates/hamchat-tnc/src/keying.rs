//! Transmitter keying side-channel
//!
//! The TNC asks for the transmitter to be keyed with `PTT TRUE` and released
//! with `PTT FALSE`. Whatever drives the radio implements [`KeyingLine`].

use std::future::Future;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TncError;
use crate::rig::RigControl;

/// Something that can key and release a transmitter
pub trait KeyingLine: Send {
    /// Assert (`true`) or release (`false`) the transmitter
    fn set_keyed(&mut self, keyed: bool) -> impl Future<Output = Result<(), TncError>> + Send;
}

impl<T> KeyingLine for RigControl<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn set_keyed(&mut self, keyed: bool) -> Result<(), TncError> {
        self.set_ptt(keyed).await
    }
}

/// Keying via the radio's VOX; nothing to do
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxKeying;

impl KeyingLine for VoxKeying {
    async fn set_keyed(&mut self, keyed: bool) -> Result<(), TncError> {
        debug!("VOX keying, ignoring PTT {}", keyed);
        Ok(())
    }
}

/// Keying chosen at connect time
pub enum Keying {
    /// PTT through rigctld
    Rig(RigControl<TcpStream>),
    /// No keying line
    Vox(VoxKeying),
}

impl KeyingLine for Keying {
    async fn set_keyed(&mut self, keyed: bool) -> Result<(), TncError> {
        match self {
            Keying::Rig(rig) => rig.set_keyed(keyed).await,
            Keying::Vox(vox) => vox.set_keyed(keyed).await,
        }
    }
}
