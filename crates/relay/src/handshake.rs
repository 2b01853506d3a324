//! Gemeinsame Handshake-Schritte
//!
//! Salt senden, auf das Salt warten und den Schluessel ableiten. Die
//! Ableitung ist langsam (PBKDF2) und laeuft deshalb auf dem Blocking-Pool.
//!
//! Im Handshake zaehlt genau die erste Zeile. Eine unlesbare erste Zeile
//! bricht ab, statt auf die naechste zu warten.

use flurfunk_crypto::{schluessel_ableiten, KdfParameter, Salt, SessionKey};
use flurfunk_protocol::{Dekodiert, Frame};
use futures_util::StreamExt;

use crate::error::{RelayError, RelayResult};
use crate::transport::{FrameLeser, FrameSender};

/// Liest genau eine Zeile; sie muss ein gueltiger Frame sein
pub(crate) async fn handshake_frame(leser: &mut FrameLeser) -> RelayResult<Frame> {
    match leser.next().await {
        Some(Ok(Dekodiert::Frame(frame))) => Ok(frame),
        Some(Ok(Dekodiert::Verworfen(fehler))) => Err(RelayError::handshake(format!(
            "Ungueltiger Handshake: {}",
            fehler
        ))),
        Some(Err(e)) => Err(e.into()),
        None => Err(RelayError::handshake("Verbindung im Handshake geschlossen")),
    }
}

/// Sendet den `salt`-Frame
pub(crate) async fn salt_senden(sender: &FrameSender, salt: &Salt) -> RelayResult<()> {
    sender.senden(Frame::salt(salt.to_base64())).await
}

/// Wartet auf den ersten Frame; er muss `salt` sein
pub(crate) async fn salt_erwarten(leser: &mut FrameLeser) -> RelayResult<Salt> {
    match handshake_frame(leser).await? {
        Frame::Salt { salt } => Salt::from_base64(&salt)
            .map_err(|e| RelayError::handshake(format!("Ungueltiges Salt: {}", e))),
        anderer => Err(RelayError::handshake(format!(
            "Erster Frame muss 'salt' sein, erhalten: '{}'",
            anderer.typ()
        ))),
    }
}

/// Leitet den Session-Schluessel auf dem Blocking-Pool ab
pub(crate) async fn schluessel_ableiten_async(
    pin: &str,
    salt: &Salt,
    kdf: KdfParameter,
) -> RelayResult<SessionKey> {
    let pin = pin.to_owned();
    let salt = salt.clone();
    let key = tokio::task::spawn_blocking(move || schluessel_ableiten(&pin, &salt, kdf))
        .await
        .map_err(|e| RelayError::intern(format!("KDF-Task fehlgeschlagen: {}", e)))??;
    Ok(key)
}
