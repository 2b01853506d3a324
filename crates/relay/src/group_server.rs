//! Gruppen-Relay-Server
//!
//! Nimmt beliebig viele Verbindungen an. Alle Mitglieder leiten ihren
//! Schluessel aus derselben PIN und demselben Salt ab (ein gemeinsames
//! Gruppengeheimnis), die Registry haelt trotzdem einen Schluessel pro
//! Verbindung.
//!
//! ## Zustaende
//! ```text
//! Erstellt --starten--> Lauscht --stoppen--> Gestoppt
//! ```
//!
//! ## Pro Verbindung
//! ```text
//! salt senden -> genau ein Frame (muss join sein) -> Schluessel ableiten
//!   -> registrieren + "<name> joined the group."
//!   -> msg entschluesseln, an alle neu verschluesselt verteilen
//!   -> leave / EOF / Fehler / Abbruch: entfernen + "<name> left the group." + schliessen
//! ```
//!
//! Ausgehende Frames laufen ueber die Sende-Queue des Mitglieds (siehe
//! [`crate::registry`]); kein Handler wartet auf den Socket eines anderen.

use flurfunk_core::{ist_beenden_befehl, ChatEreignis, ANONYMER_NAME};
use flurfunk_crypto::{CryptoError, KdfParameter, Salt, SessionKey, STANDARD_SALT_LAENGE};
use flurfunk_protocol::Frame;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::handshake::{handshake_frame, salt_senden, schluessel_ableiten_async};
use crate::registry::{Mitglied, Registry, Zustellung};
use crate::transport::{naechster_frame, transport_aufteilen, FrameLeser, FrameSender};

/// Standard-Absendername fuer Nachrichten des Server-Bedieners
pub const STANDARD_SERVER_NAME: &str = "GroupHost";

// ---------------------------------------------------------------------------
// Konfiguration und Zustand
// ---------------------------------------------------------------------------

/// Konfiguration eines Gruppen-Servers
#[derive(Clone)]
pub struct GruppenConfig {
    pub bind_addr: SocketAddr,
    /// Gemeinsame Gruppen-PIN
    pub pin: String,
    /// Absendername fuer lokal getippte Zeilen
    pub server_name: String,
    pub kdf: KdfParameter,
    pub salt_laenge: usize,
}

impl GruppenConfig {
    pub fn neu(bind_addr: SocketAddr, pin: impl Into<String>) -> Self {
        Self {
            bind_addr,
            pin: pin.into(),
            server_name: STANDARD_SERVER_NAME.to_string(),
            kdf: KdfParameter::default(),
            salt_laenge: STANDARD_SALT_LAENGE,
        }
    }
}

impl std::fmt::Debug for GruppenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GruppenConfig")
            .field("bind_addr", &self.bind_addr)
            .field("pin", &"[REDACTED]")
            .field("server_name", &self.server_name)
            .field("kdf", &self.kdf)
            .field("salt_laenge", &self.salt_laenge)
            .finish()
    }
}

/// Lebenszyklus einer Server-Instanz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerZustand {
    Erstellt,
    Lauscht,
    Gestoppt,
}

// ---------------------------------------------------------------------------
// GruppenServer
// ---------------------------------------------------------------------------

/// Gruppen-Relay mit einer Registry fuer alle Verbindungen
pub struct GruppenServer {
    config: GruppenConfig,
    /// Ein Salt fuer die gesamte Lebensdauer
    salt: Salt,
    registry: Registry,
    zustand: Mutex<ServerZustand>,
    lokale_adresse: Mutex<Option<SocketAddr>>,
    annahme_task: Mutex<Option<JoinHandle<()>>>,
    /// Stoppt nur die Accept-Loop
    annahme_abbruch: CancellationToken,
    /// Stoppt alle Verbindungs-Handler
    sitzungen_abbruch: CancellationToken,
    ereignisse: Option<mpsc::UnboundedSender<ChatEreignis>>,
}

impl GruppenServer {
    /// Erstellt einen Server und erzeugt das Salt
    ///
    /// # Fehler
    /// - `Krypto` bei ungueltigen KDF-Parametern oder Salt-Laenge 0
    pub fn neu(config: GruppenConfig) -> RelayResult<Self> {
        config.kdf.validieren()?;
        if config.salt_laenge == 0 {
            return Err(CryptoError::UngueltigeParameter("salt_laenge muss > 0 sein".into()).into());
        }
        let salt = Salt::generieren(config.salt_laenge);

        Ok(Self {
            config,
            salt,
            registry: Registry::neu(),
            zustand: Mutex::new(ServerZustand::Erstellt),
            lokale_adresse: Mutex::new(None),
            annahme_task: Mutex::new(None),
            annahme_abbruch: CancellationToken::new(),
            sitzungen_abbruch: CancellationToken::new(),
            ereignisse: None,
        })
    }

    /// Leitet Join/Leave und weitergeleitete Nachrichten an den Bediener
    pub fn mit_ereignissen(mut self, ereignisse: mpsc::UnboundedSender<ChatEreignis>) -> Self {
        self.ereignisse = Some(ereignisse);
        self
    }

    /// Bindet den Socket und startet die Accept-Loop
    ///
    /// Gibt die tatsaechlich gebundene Adresse zurueck.
    pub async fn starten(self: &Arc<Self>) -> RelayResult<SocketAddr> {
        let aktuell = self.zustand();
        if aktuell != ServerZustand::Erstellt {
            return Err(RelayError::UngueltigerZustand(format!(
                "starten im Zustand {:?}",
                aktuell
            )));
        }

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let adresse = listener.local_addr()?;
        self.lauschen_setzen(adresse)?;

        tracing::info!(adresse = %adresse, "Gruppen-Server gestartet");

        let server = Arc::clone(self);
        let handle = tokio::spawn(async move { server.annahme_schleife(listener).await });
        *self.annahme_task.lock() = Some(handle);

        Ok(adresse)
    }

    /// Verteilt eine Zeile des Bedieners unter dem Server-Namen
    pub fn lokal_senden(&self, text: &str) -> usize {
        self.registry.verteilen(&self.config.server_name, text)
    }

    /// Bedienerschleife: jede Zeile wird verteilt, `/exit` stoppt
    ///
    /// Leere Zeilen werden uebersprungen. Endet die Eingabe, wird der
    /// Server ebenfalls gestoppt.
    pub async fn betreiben(&self, mut eingabe: mpsc::Receiver<String>) {
        loop {
            let zeile = tokio::select! {
                _ = self.sitzungen_abbruch.cancelled() => break,
                zeile = eingabe.recv() => zeile,
            };
            match zeile {
                None => {
                    tracing::info!("Bediener-Eingabe geschlossen");
                    break;
                }
                Some(zeile) if ist_beenden_befehl(&zeile) => break,
                Some(zeile) if zeile.trim().is_empty() => continue,
                Some(zeile) => {
                    self.lokal_senden(&zeile);
                }
            }
        }
        self.stoppen().await;
    }

    /// Stoppt den Server; weitere Aufrufe sind No-Ops
    ///
    /// Schliesst den Listener, sendet `server_close` an jedes Mitglied,
    /// leert die Registry und schliesst jeden Transport.
    pub async fn stoppen(&self) {
        if !self.gestoppt_setzen() {
            return;
        }

        self.annahme_abbruch.cancel();
        if let Some(task) = self.annahme_task_nehmen() {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Accept-Task endete fehlerhaft");
            }
        }

        let mitglieder = self.registry.leeren();
        let anzahl = mitglieder.len();
        join_all(mitglieder.iter().map(|mitglied| async move {
            let zustellung = mitglied.senden(Frame::ServerClose);
            if zustellung != Zustellung::Eingereiht {
                tracing::debug!(name = %mitglied.name(), zustellung = ?zustellung, "server_close nicht zugestellt");
            }
            mitglied.schliessen().await;
        }))
        .await;

        self.sitzungen_abbruch.cancel();
        tracing::info!(mitglieder = anzahl, "Gruppen-Server gestoppt");
    }

    pub fn zustand(&self) -> ServerZustand {
        *self.zustand.lock()
    }

    pub fn mitglieder_anzahl(&self) -> usize {
        self.registry.anzahl()
    }

    /// Gebundene Adresse, sobald der Server lauscht
    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        *self.lokale_adresse.lock()
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn lauschen_setzen(&self, adresse: SocketAddr) -> RelayResult<()> {
        let mut zustand = self.zustand.lock();
        if *zustand != ServerZustand::Erstellt {
            return Err(RelayError::UngueltigerZustand(format!(
                "starten im Zustand {:?}",
                *zustand
            )));
        }
        *zustand = ServerZustand::Lauscht;
        *self.lokale_adresse.lock() = Some(adresse);
        Ok(())
    }

    /// Gibt false zurueck wenn der Server schon gestoppt war
    fn gestoppt_setzen(&self) -> bool {
        let mut zustand = self.zustand.lock();
        if *zustand == ServerZustand::Gestoppt {
            return false;
        }
        *zustand = ServerZustand::Gestoppt;
        true
    }

    /// Registriert nur, solange der Server lauscht
    ///
    /// Zustand pruefen und Eintragen geschehen unter dem Zustands-Lock, den
    /// auch `stoppen` vor dem Leeren der Registry nimmt.
    fn mitglied_aufnehmen(&self, mitglied: &Arc<Mitglied>) -> bool {
        let zustand = self.zustand.lock();
        if *zustand != ServerZustand::Lauscht {
            return false;
        }
        self.registry.registrieren(Arc::clone(mitglied));
        true
    }

    fn annahme_task_nehmen(&self) -> Option<JoinHandle<()>> {
        self.annahme_task.lock().take()
    }

    fn melden(&self, ereignis: ChatEreignis) {
        if let Some(tx) = &self.ereignisse {
            let _ = tx.send(ereignis);
        }
    }

    async fn annahme_schleife(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.annahme_abbruch.cancelled() => break,
                ergebnis = listener.accept() => match ergebnis {
                    Ok((stream, adresse)) => {
                        tracing::debug!(peer = %adresse, "Verbindung akzeptiert");
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            server.verbindung_bearbeiten(stream, adresse).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
        tracing::debug!("Accept-Loop beendet, Listener geschlossen");
    }

    async fn verbindung_bearbeiten(self: Arc<Self>, stream: TcpStream, adresse: SocketAddr) {
        let (mut leser, sender) = transport_aufteilen(stream);

        let beitritt = tokio::select! {
            _ = self.sitzungen_abbruch.cancelled() => None,
            ergebnis = self.beitritt_abwickeln(&mut leser, &sender) => match ergebnis {
                Ok(beitritt) => Some(beitritt),
                Err(e) => {
                    tracing::info!(peer = %adresse, fehler = %e, "Beitritt abgelehnt");
                    None
                }
            },
        };
        let Some((name, key)) = beitritt else {
            sender.schliessen().await;
            return;
        };

        let mitglied = Arc::new(Mitglied::neu(name.clone(), adresse, key, sender));
        if !self.mitglied_aufnehmen(&mitglied) {
            mitglied.schliessen().await;
            return;
        }
        tracing::info!(peer = %adresse, name = %name, "Mitglied beigetreten");
        self.melden(ChatEreignis::Beigetreten {
            name: name.clone(),
            adresse: adresse.to_string(),
        });
        self.registry.system_notiz(&format!("{} joined the group.", name));

        tokio::select! {
            _ = self.sitzungen_abbruch.cancelled() => {}
            _ = mitglied.abgebrochen() => {
                tracing::info!(peer = %adresse, name = %name, "Mitglied abgebrochen");
            }
            _ = self.empfangs_schleife(&mut leser, &mitglied) => {}
        }

        self.registry.entfernen(&mitglied.id());
        if self.zustand() != ServerZustand::Gestoppt {
            tracing::info!(peer = %adresse, name = %name, "Mitglied hat die Gruppe verlassen");
            self.melden(ChatEreignis::Verlassen { name: name.clone() });
            self.registry.system_notiz(&format!("{} left the group.", name));
        }
        mitglied.schliessen().await;
    }

    /// Salt senden, auf `join` warten, Schluessel ableiten
    async fn beitritt_abwickeln(
        &self,
        leser: &mut FrameLeser,
        sender: &FrameSender,
    ) -> RelayResult<(String, SessionKey)> {
        salt_senden(sender, &self.salt).await?;

        let name = match handshake_frame(leser).await? {
            Frame::Join { name } => name,
            anderer => {
                return Err(RelayError::handshake(format!(
                    "Erster Frame muss 'join' sein, erhalten: '{}'",
                    anderer.typ()
                )))
            }
        };
        let name = if name.trim().is_empty() {
            ANONYMER_NAME.to_string()
        } else {
            name
        };

        let key = schluessel_ableiten_async(&self.config.pin, &self.salt, self.config.kdf).await?;
        Ok((name, key))
    }

    /// Empfaengt `msg`-Frames eines Mitglieds bis `leave`, EOF oder Fehler
    async fn empfangs_schleife(&self, leser: &mut FrameLeser, mitglied: &Mitglied) {
        while let Some(ergebnis) = naechster_frame(leser).await {
            match ergebnis {
                Ok(Frame::Msg { name, ct }) => match mitglied.key().entschluesseln_lossy(&ct) {
                    Ok(text) => {
                        self.melden(ChatEreignis::Nachricht {
                            name: name.clone(),
                            text: text.clone(),
                        });
                        self.registry.verteilen(&name, &text);
                    }
                    Err(e) => {
                        tracing::debug!(peer = %mitglied.adresse(), fehler = %e, "Ciphertext verworfen");
                    }
                },
                Ok(Frame::Leave) => {
                    tracing::debug!(peer = %mitglied.adresse(), "leave empfangen");
                    return;
                }
                Ok(anderer) => {
                    tracing::debug!(peer = %mitglied.adresse(), typ = anderer.typ(), "Frame ignoriert");
                }
                Err(e) => {
                    tracing::warn!(peer = %mitglied.adresse(), fehler = %e, "Lesefehler");
                    return;
                }
            }
        }
    }
}
