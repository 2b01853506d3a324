//! Transport-Haelften: Frame-Leser und idempotent schliessbarer Sender
//!
//! Ein Stream wird in eine lesende und eine schreibende Haelfte geteilt.
//! Die Lesehaelfte gehoert exklusiv dem Task, der eingehende Frames
//! verarbeitet. Die Schreibhaelfte steckt hinter einem async Mutex, damit
//! Broadcast und eigene Antworten sich nicht mitten im Frame ueberholen.

use flurfunk_protocol::{Dekodiert, Frame, FrameCodec};
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{RelayError, RelayResult};

/// Lesende Haelfte eines Transports
pub type FrameLeser = FramedRead<Box<dyn AsyncRead + Send + Unpin>, FrameCodec>;

type FrameSchreiber = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>;

/// Teilt einen Stream in Frame-Leser und Frame-Sender
pub fn transport_aufteilen<S>(stream: S) -> (FrameLeser, FrameSender)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (lesen, schreiben) = tokio::io::split(stream);
    let leser: FrameLeser = FramedRead::new(Box::new(lesen), FrameCodec::new());
    (leser, FrameSender::neu(schreiben))
}

/// Liest den naechsten gueltigen Frame
///
/// Verworfene Zeilen werden uebersprungen. `None` bedeutet EOF.
pub async fn naechster_frame(leser: &mut FrameLeser) -> Option<io::Result<Frame>> {
    loop {
        match leser.next().await? {
            Ok(Dekodiert::Frame(frame)) => {
                tracing::trace!(typ = frame.typ(), "Frame empfangen");
                return Some(Ok(frame));
            }
            Ok(Dekodiert::Verworfen(fehler)) => {
                tracing::debug!(fehler = %fehler, "Zeile verworfen");
            }
            Err(e) => return Some(Err(e)),
        }
    }
}

/// Schreibende Haelfte eines Transports
///
/// Klone teilen sich denselben Schreiber. Nach `schliessen` schlaegt jedes
/// weitere `senden` mit `VerbindungGetrennt` fehl.
#[derive(Clone)]
pub struct FrameSender {
    inner: Arc<Mutex<Option<FrameSchreiber>>>,
}

impl FrameSender {
    pub fn neu<W>(schreiber: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(schreiber);
        Self {
            inner: Arc::new(Mutex::new(Some(FramedWrite::new(boxed, FrameCodec::new())))),
        }
    }

    /// Schreibt einen Frame komplett und flusht
    pub async fn senden(&self, frame: Frame) -> RelayResult<()> {
        let mut guard = self.inner.lock().await;
        let schreiber = guard.as_mut().ok_or(RelayError::VerbindungGetrennt)?;
        schreiber.send(frame).await?;
        Ok(())
    }

    /// Schliesst die Schreibhaelfte; weitere Aufrufe sind No-Ops
    pub async fn schliessen(&self) {
        let schreiber = self.inner.lock().await.take();
        if let Some(mut schreiber) = schreiber {
            if let Err(e) = schreiber.close().await {
                tracing::debug!(fehler = %e, "Schliessen des Transports fehlgeschlagen");
            }
        }
    }

    pub async fn ist_geschlossen(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender").finish_non_exhaustive()
    }
}
