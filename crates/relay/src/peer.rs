//! 1:1-Sitzung zwischen Host und Client
//!
//! ## Ablauf
//! ```text
//! Host                                Client
//!  | accept                             |
//!  | --- {"type":"salt"} -------------> |  erster Frame MUSS salt sein
//!  | PIN lokal abfragen                 | PIN lokal abfragen
//!  | Schluessel ableiten                | Schluessel ableiten
//!  | <======== msg / close ===========> |
//! ```
//!
//! Der Host drueckt das Salt sofort nach dem Accept, es gibt keinen
//! Round-Trip vor der PIN-Abfrage.

use flurfunk_core::{Beendigung, ChatEreignis};
use flurfunk_crypto::{KdfParameter, Salt, SessionKey};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use crate::error::RelayResult;
use crate::handshake::{salt_erwarten, salt_senden, schluessel_ableiten_async};
use crate::session::{chat_ausfuehren, ChatTeile, Rolle};
use crate::transport::{transport_aufteilen, FrameLeser, FrameSender};

/// Host-Seite nach dem Senden des Salts, vor der Schluesselableitung
pub struct HostHandshake {
    leser: FrameLeser,
    sender: FrameSender,
    salt: Salt,
    gegenstelle: Option<SocketAddr>,
}

/// Client-Seite nach dem Empfang des Salts, vor der Schluesselableitung
pub struct ClientHandshake {
    leser: FrameLeser,
    sender: FrameSender,
    salt: Salt,
}

/// Aktive 1:1-Sitzung mit abgeleitetem Schluessel
pub struct PeerSession {
    leser: FrameLeser,
    sender: FrameSender,
    key: Arc<SessionKey>,
}

/// Nimmt genau eine Verbindung an und sendet das Salt
pub async fn host_annehmen(listener: &TcpListener, salt_laenge: usize) -> RelayResult<HostHandshake> {
    let (stream, adresse) = listener.accept().await?;
    tracing::info!(peer = %adresse, "Peer verbunden");
    let mut handshake = host_handshake(stream, salt_laenge).await?;
    handshake.gegenstelle = Some(adresse);
    Ok(handshake)
}

/// Host-Handshake ueber einen beliebigen Stream
///
/// Erzeugt pro Verbindung ein frisches Salt.
pub async fn host_handshake<S>(stream: S, salt_laenge: usize) -> RelayResult<HostHandshake>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (leser, sender) = transport_aufteilen(stream);
    let salt = Salt::generieren(salt_laenge);

    if let Err(e) = salt_senden(&sender, &salt).await {
        sender.schliessen().await;
        return Err(e);
    }
    tracing::debug!(salt_laenge = salt.len(), "Salt gesendet");

    Ok(HostHandshake {
        leser,
        sender,
        salt,
        gegenstelle: None,
    })
}

/// Verbindet sich zum Host und wartet auf das Salt
pub async fn client_verbinden<A: ToSocketAddrs>(adresse: A) -> RelayResult<ClientHandshake> {
    let stream = TcpStream::connect(adresse).await?;
    if let Ok(peer) = stream.peer_addr() {
        tracing::info!(peer = %peer, "Mit Host verbunden");
    }
    client_handshake(stream).await
}

/// Client-Handshake ueber einen beliebigen Stream
///
/// # Fehler
/// - `Handshake` wenn der erste Frame kein `salt` ist; der Transport wird
///   geschlossen, es gibt keinen zweiten Versuch
pub async fn client_handshake<S>(stream: S) -> RelayResult<ClientHandshake>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut leser, sender) = transport_aufteilen(stream);
    match salt_erwarten(&mut leser).await {
        Ok(salt) => Ok(ClientHandshake {
            leser,
            sender,
            salt,
        }),
        Err(e) => {
            tracing::warn!(fehler = %e, "Handshake fehlgeschlagen");
            sender.schliessen().await;
            Err(e)
        }
    }
}

impl HostHandshake {
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Adresse der Gegenstelle (nur bei TCP bekannt)
    pub fn gegenstelle(&self) -> Option<SocketAddr> {
        self.gegenstelle
    }

    /// Leitet den Schluessel ab und wechselt in die aktive Phase
    pub async fn aktivieren(self, pin: &str, kdf: KdfParameter) -> RelayResult<PeerSession> {
        PeerSession::aus_handshake(self.leser, self.sender, &self.salt, pin, kdf).await
    }
}

impl ClientHandshake {
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Leitet den Schluessel ab und wechselt in die aktive Phase
    pub async fn aktivieren(self, pin: &str, kdf: KdfParameter) -> RelayResult<PeerSession> {
        PeerSession::aus_handshake(self.leser, self.sender, &self.salt, pin, kdf).await
    }
}

impl PeerSession {
    async fn aus_handshake(
        leser: FrameLeser,
        sender: FrameSender,
        salt: &Salt,
        pin: &str,
        kdf: KdfParameter,
    ) -> RelayResult<Self> {
        match schluessel_ableiten_async(pin, salt, kdf).await {
            Ok(key) => Ok(Self {
                leser,
                sender,
                key: Arc::new(key),
            }),
            Err(e) => {
                sender.schliessen().await;
                Err(e)
            }
        }
    }

    /// Fuehrt den Chat bis `close`, `/exit`, EOF oder Transportfehler
    ///
    /// Eigene Nachrichten tragen `name`. Empfangene Nachrichten und das
    /// Sitzungsende gehen als [`ChatEreignis`] an `ausgabe`.
    pub async fn ausfuehren(
        self,
        name: impl Into<String>,
        eingabe: mpsc::Receiver<String>,
        ausgabe: mpsc::UnboundedSender<ChatEreignis>,
    ) -> Beendigung {
        let teile = ChatTeile {
            leser: self.leser,
            sender: self.sender,
            key: self.key,
            name: name.into(),
            rolle: Rolle::Peer,
        };
        chat_ausfuehren(teile, eingabe, ausgabe).await
    }
}
