//! Gruppen-Client
//!
//! `Verbinden -> Handshake -> Beigetreten -> Verlassen`. Nach dem `join`
//! laeuft dieselbe aktive Phase wie bei der 1:1-Sitzung, nur dass
//! `server_close` die Sitzung sofort beendet und `/exit` ein `leave`
//! statt `close` sendet.

use flurfunk_core::{Beendigung, ChatEreignis, ANONYMER_NAME};
use flurfunk_crypto::{KdfParameter, Salt, SessionKey};
use flurfunk_protocol::Frame;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use crate::error::RelayResult;
use crate::handshake::{salt_erwarten, schluessel_ableiten_async};
use crate::session::{chat_ausfuehren, ChatTeile, Rolle};
use crate::transport::{transport_aufteilen, FrameLeser, FrameSender};

/// Verbindung mit empfangenem Salt, noch nicht beigetreten
pub struct GruppenHandshake {
    leser: FrameLeser,
    sender: FrameSender,
    salt: Salt,
}

/// Beigetretene Gruppen-Sitzung
pub struct GruppenSitzung {
    leser: FrameLeser,
    sender: FrameSender,
    key: Arc<SessionKey>,
    name: String,
}

/// Verbindet sich zum Gruppen-Server und wartet auf das Salt
pub async fn gruppe_verbinden<A: ToSocketAddrs>(adresse: A) -> RelayResult<GruppenHandshake> {
    let stream = TcpStream::connect(adresse).await?;
    if let Ok(peer) = stream.peer_addr() {
        tracing::info!(peer = %peer, "Mit Gruppen-Server verbunden");
    }
    gruppe_handshake(stream).await
}

/// Gruppen-Handshake ueber einen beliebigen Stream
pub async fn gruppe_handshake<S>(stream: S) -> RelayResult<GruppenHandshake>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut leser, sender) = transport_aufteilen(stream);
    match salt_erwarten(&mut leser).await {
        Ok(salt) => Ok(GruppenHandshake {
            leser,
            sender,
            salt,
        }),
        Err(e) => {
            tracing::warn!(fehler = %e, "Gruppen-Handshake fehlgeschlagen");
            sender.schliessen().await;
            Err(e)
        }
    }
}

impl GruppenHandshake {
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Leitet den Schluessel ab und sendet `join`
    ///
    /// Ein leerer Name wird als `Anon` gesendet.
    pub async fn beitreten(
        self,
        name: &str,
        pin: &str,
        kdf: KdfParameter,
    ) -> RelayResult<GruppenSitzung> {
        let name = if name.trim().is_empty() {
            ANONYMER_NAME.to_string()
        } else {
            name.to_string()
        };

        let key = match schluessel_ableiten_async(pin, &self.salt, kdf).await {
            Ok(key) => key,
            Err(e) => {
                self.sender.schliessen().await;
                return Err(e);
            }
        };

        if let Err(e) = self.sender.senden(Frame::join(name.clone())).await {
            self.sender.schliessen().await;
            return Err(e);
        }
        tracing::info!(name = %name, "Gruppe beigetreten");

        Ok(GruppenSitzung {
            leser: self.leser,
            sender: self.sender,
            key: Arc::new(key),
            name,
        })
    }
}

impl GruppenSitzung {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fuehrt den Gruppen-Chat bis `/exit`, `server_close`, EOF oder Fehler
    pub async fn ausfuehren(
        self,
        eingabe: mpsc::Receiver<String>,
        ausgabe: mpsc::UnboundedSender<ChatEreignis>,
    ) -> Beendigung {
        let teile = ChatTeile {
            leser: self.leser,
            sender: self.sender,
            key: self.key,
            name: self.name,
            rolle: Rolle::GruppenClient,
        };
        chat_ausfuehren(teile, eingabe, ausgabe).await
    }
}
