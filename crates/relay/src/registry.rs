//! Mitglieder-Registry des Gruppen-Servers
//!
//! Eine einzige Map hinter einem einzigen Mutex. Jede
//! Read-Modify-Write-Folge (Eintragen, Schnappschuss, Entfernen) passiert
//! unter diesem Lock.
//!
//! Jedes Mitglied hat eine begrenzte Sende-Queue, die ein eigener
//! Schreib-Task auf den Transport leert. Verteilen reiht nur nicht-blockierend
//! ein: ein Mitglied, das nicht mehr liest, haelt niemanden auf. Ist seine
//! Queue voll oder geschlossen, wird es entfernt und abgebrochen.

use flurfunk_core::{VerbindungsId, SYSTEM_ABSENDER};
use flurfunk_crypto::SessionKey;
use flurfunk_protocol::{Frame, FrameCodec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::FrameSender;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Sende-Queue pro Mitglied
pub const SEND_QUEUE_GROESSE: usize = 64;

/// So lange wartet `schliessen` darauf, dass die Queue geleert ist
const SCHLIESSEN_TIMEOUT: Duration = Duration::from_secs(2);

/// Ergebnis eines Einreihens in die Sende-Queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    Eingereiht,
    /// Queue voll, das Mitglied liest nicht mehr schnell genug
    Voll,
    /// Queue geschlossen oder Schreib-Task beendet
    Getrennt,
}

// ---------------------------------------------------------------------------
// Mitglied
// ---------------------------------------------------------------------------

/// Ein beigetretenes Gruppenmitglied
///
/// Jedes Mitglied haelt seinen eigenen Schluessel, auch wenn heute alle
/// denselben ableiten.
#[derive(Debug)]
pub struct Mitglied {
    id: VerbindungsId,
    name: String,
    adresse: SocketAddr,
    key: SessionKey,
    queue: Mutex<Option<mpsc::Sender<Frame>>>,
    schreiber: Mutex<Option<JoinHandle<()>>>,
    /// Bricht Schreib-Task und Verbindungs-Handler hart ab
    abbruch: CancellationToken,
}

impl Mitglied {
    /// Erstellt das Mitglied und startet seinen Schreib-Task
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn neu(name: impl Into<String>, adresse: SocketAddr, key: SessionKey, sender: FrameSender) -> Self {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let abbruch = CancellationToken::new();
        let schreiber = tokio::spawn(schreib_schleife(rx, sender, abbruch.clone(), adresse));

        Self {
            id: VerbindungsId::new(),
            name: name.into(),
            adresse,
            key,
            queue: Mutex::new(Some(tx)),
            schreiber: Mutex::new(Some(schreiber)),
            abbruch,
        }
    }

    pub fn id(&self) -> VerbindungsId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adresse(&self) -> SocketAddr {
        self.adresse
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// `msg`-Frame mit `klartext`, verschluesselt fuer dieses Mitglied
    pub fn nachricht_fuer(&self, absender: &str, klartext: &str) -> Frame {
        Frame::nachricht(absender, self.key.verschluesseln_base64(klartext))
    }

    /// Reiht einen Frame nicht-blockierend ein
    pub fn senden(&self, frame: Frame) -> Zustellung {
        let queue = self.queue.lock();
        let Some(tx) = queue.as_ref() else {
            return Zustellung::Getrennt;
        };
        match tx.try_send(frame) {
            Ok(()) => Zustellung::Eingereiht,
            Err(mpsc::error::TrySendError::Full(_)) => Zustellung::Voll,
            Err(mpsc::error::TrySendError::Closed(_)) => Zustellung::Getrennt,
        }
    }

    /// Verwirft die Queue und trennt den Transport sofort
    pub fn abbrechen(&self) {
        self.abbruch.cancel();
    }

    pub fn ist_abgebrochen(&self) -> bool {
        self.abbruch.is_cancelled()
    }

    /// Wartet bis das Mitglied abgebrochen wurde
    pub async fn abgebrochen(&self) {
        self.abbruch.cancelled().await
    }

    /// Leert die Queue und schliesst den Transport; idempotent
    ///
    /// Nur der erste Aufruf wartet auf den Schreib-Task. Haengt der
    /// Transport laenger als [`SCHLIESSEN_TIMEOUT`], wird abgebrochen.
    pub async fn schliessen(&self) {
        drop(self.queue.lock().take());

        let schreiber = self.schreiber.lock().take();
        if let Some(schreiber) = schreiber {
            match tokio::time::timeout(SCHLIESSEN_TIMEOUT, schreiber).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(peer = %self.adresse, fehler = %e, "Schreib-Task abgestuerzt");
                }
                Err(_) => {
                    tracing::debug!(peer = %self.adresse, "Queue nicht rechtzeitig geleert");
                }
            }
            self.abbruch.cancel();
        }
    }
}

/// Leert die Queue eines Mitglieds auf dessen Transport
///
/// Endet die Queue regulaer, wird der Transport sauber geschlossen. Bei
/// Abbruch oder Schreibfehler wird er ohne Flush fallengelassen.
async fn schreib_schleife(
    mut queue: mpsc::Receiver<Frame>,
    sender: FrameSender,
    abbruch: CancellationToken,
    adresse: SocketAddr,
) {
    loop {
        let frame = tokio::select! {
            _ = abbruch.cancelled() => return,
            frame = queue.recv() => frame,
        };
        let Some(frame) = frame else { break };

        tokio::select! {
            _ = abbruch.cancelled() => return,
            ergebnis = sender.senden(frame) => {
                if let Err(e) = ergebnis {
                    tracing::warn!(peer = %adresse, fehler = %e, "Schreiben fehlgeschlagen");
                    abbruch.cancel();
                    return;
                }
            }
        }
    }

    tokio::select! {
        _ = abbruch.cancelled() => {}
        _ = sender.schliessen() => {}
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Geteilte Map aller beigetretenen Mitglieder
#[derive(Debug, Clone, Default)]
pub struct Registry {
    mitglieder: Arc<Mutex<HashMap<VerbindungsId, Arc<Mitglied>>>>,
}

impl Registry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Traegt ein Mitglied ein
    pub fn registrieren(&self, mitglied: Arc<Mitglied>) {
        let id = mitglied.id();
        let name = mitglied.name().to_string();
        self.mitglieder.lock().insert(id, mitglied);
        tracing::debug!(id = %id, name = %name, "Mitglied registriert");
    }

    /// Entfernt ein Mitglied; No-Op wenn es schon entfernt wurde
    pub fn entfernen(&self, id: &VerbindungsId) -> Option<Arc<Mitglied>> {
        let entfernt = self.mitglieder.lock().remove(id);
        if entfernt.is_some() {
            tracing::debug!(id = %id, "Mitglied entfernt");
        }
        entfernt
    }

    /// Kopie aller aktuellen Mitglieder
    pub fn schnappschuss(&self) -> Vec<Arc<Mitglied>> {
        self.mitglieder.lock().values().cloned().collect()
    }

    /// Leert die Registry und gibt die bisherigen Mitglieder zurueck
    pub fn leeren(&self) -> Vec<Arc<Mitglied>> {
        self.mitglieder.lock().drain().map(|(_, m)| m).collect()
    }

    pub fn anzahl(&self) -> usize {
        self.mitglieder.lock().len()
    }

    pub fn enthaelt(&self, id: &VerbindungsId) -> bool {
        self.mitglieder.lock().contains_key(id)
    }

    /// Reiht `klartext` bei allen Mitgliedern ein, je mit deren Schluessel
    ///
    /// Eine Nachricht, die kodiert nicht in eine Zeile passt, wird ganz
    /// verworfen. Mitglieder mit voller oder geschlossener Queue werden
    /// entfernt und abgebrochen. Gibt die Anzahl eingereihter Zustellungen
    /// zurueck.
    pub fn verteilen(&self, absender: &str, klartext: &str) -> usize {
        let empfaenger = self.schnappschuss();
        let Some(erster) = empfaenger.first() else {
            return 0;
        };

        // Chiffrat ist fuer jeden Schluessel gleich lang
        if !FrameCodec::new().passt(&erster.nachricht_fuer(absender, klartext)) {
            tracing::warn!(
                absender = %absender,
                laenge = klartext.len(),
                "Nachricht zu gross fuer eine Zeile – verworfen"
            );
            return 0;
        }

        let mut zugestellt = 0;
        for mitglied in &empfaenger {
            match mitglied.senden(mitglied.nachricht_fuer(absender, klartext)) {
                Zustellung::Eingereiht => zugestellt += 1,
                zustellung => {
                    tracing::warn!(
                        name = %mitglied.name(),
                        peer = %mitglied.adresse(),
                        zustellung = ?zustellung,
                        "Zustellung fehlgeschlagen – Mitglied wird entfernt"
                    );
                    self.entfernen(&mitglied.id());
                    mitglied.abbrechen();
                }
            }
        }

        tracing::trace!(absender = %absender, zugestellt, "Nachricht verteilt");
        zugestellt
    }

    /// Verteilt eine Systemnotiz unter dem Absender `System`
    pub fn system_notiz(&self, text: &str) -> usize {
        self.verteilen(SYSTEM_ABSENDER, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{naechster_frame, transport_aufteilen, FrameLeser};
    use flurfunk_protocol::MAX_ZEILEN_LAENGE;

    fn key(fuellung: u8) -> SessionKey {
        SessionKey::new(vec![fuellung; 32]).unwrap()
    }

    fn adresse() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// Mitglied plus die Gegenseite seines Transports
    fn mitglied_mit_puffer(
        name: &str,
        fuellung: u8,
        puffer: usize,
    ) -> (Arc<Mitglied>, FrameLeser, FrameSender) {
        let (server_seite, client_seite) = tokio::io::duplex(puffer);
        let (_server_leser, server_sender) = transport_aufteilen(server_seite);
        let (client_leser, client_sender) = transport_aufteilen(client_seite);
        let m = Arc::new(Mitglied::neu(name, adresse(), key(fuellung), server_sender));
        (m, client_leser, client_sender)
    }

    fn mitglied(name: &str, fuellung: u8) -> (Arc<Mitglied>, FrameLeser, FrameSender) {
        mitglied_mit_puffer(name, fuellung, 4096)
    }

    async fn text_lesen(leser: &mut FrameLeser, key: &SessionKey) -> (String, String) {
        match naechster_frame(leser).await.unwrap().unwrap() {
            Frame::Msg { name, ct } => (name, key.entschluesseln_text(&ct).unwrap()),
            anderer => panic!("unerwarteter Frame: {anderer:?}"),
        }
    }

    async fn mit_timeout<T>(f: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), f)
            .await
            .expect("Timeout im Test")
    }

    #[tokio::test]
    async fn registrieren_und_entfernen() {
        let registry = Registry::neu();
        let (m, _l, _s) = mitglied("X", 1);
        let id = m.id();

        registry.registrieren(m);
        assert_eq!(registry.anzahl(), 1);
        assert!(registry.enthaelt(&id));

        assert!(registry.entfernen(&id).is_some());
        assert!(registry.entfernen(&id).is_none());
        assert_eq!(registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn leeren_gibt_alle_zurueck() {
        let registry = Registry::neu();
        let (a, _la, _sa) = mitglied("A", 1);
        let (b, _lb, _sb) = mitglied("B", 2);
        registry.registrieren(a);
        registry.registrieren(b);

        assert_eq!(registry.leeren().len(), 2);
        assert_eq!(registry.anzahl(), 0);
        assert!(registry.schnappschuss().is_empty());
    }

    #[tokio::test]
    async fn verteilen_mit_eigenem_schluessel_pro_mitglied() {
        let registry = Registry::neu();
        let (y, mut y_leser, _ys) = mitglied("Y", 7);
        let (z, mut z_leser, _zs) = mitglied("Z", 9);
        registry.registrieren(y);
        registry.registrieren(z);

        assert_eq!(registry.verteilen("X", "hi"), 2);
        assert_eq!(text_lesen(&mut y_leser, &key(7)).await, ("X".into(), "hi".into()));
        assert_eq!(text_lesen(&mut z_leser, &key(9)).await, ("X".into(), "hi".into()));
    }

    #[tokio::test]
    async fn toter_empfaenger_wird_entfernt() {
        let registry = Registry::neu();
        let (y, y_leser, y_sender) = mitglied("Y", 7);
        let (z, mut z_leser, _zs) = mitglied("Z", 9);
        let y_id = y.id();
        let z_id = z.id();
        registry.registrieren(Arc::clone(&y));
        registry.registrieren(z);

        // Client-Seite von Y verschwindet komplett
        drop(y_leser);
        drop(y_sender);

        // Einreihen gelingt noch, der Schreib-Task bemerkt den Fehler
        assert_eq!(registry.verteilen("X", "eins"), 2);
        mit_timeout(y.abgebrochen()).await;

        assert_eq!(registry.verteilen("X", "zwei"), 1);
        assert!(!registry.enthaelt(&y_id));
        assert!(registry.enthaelt(&z_id));
        assert_eq!(text_lesen(&mut z_leser, &key(9)).await, ("X".into(), "eins".into()));
        assert_eq!(text_lesen(&mut z_leser, &key(9)).await, ("X".into(), "zwei".into()));
    }

    #[tokio::test]
    async fn haengender_empfaenger_haelt_niemanden_auf() {
        let registry = Registry::neu();
        // Y liest nie; sein Puffer ist nach dem ersten Frame voll
        let (y, _y_leser, _ys) = mitglied_mit_puffer("Y", 7, 64);
        let (z, mut z_leser, _zs) = mitglied_mit_puffer("Z", 9, 1024 * 1024);
        let y_id = y.id();
        let z_id = z.id();
        registry.registrieren(Arc::clone(&y));
        registry.registrieren(z);

        let anzahl = SEND_QUEUE_GROESSE + 8;
        let fuellung = "x".repeat(100);
        mit_timeout(async {
            for i in 0..anzahl {
                registry.verteilen("X", &format!("{i} {fuellung}"));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        assert!(!registry.enthaelt(&y_id));
        assert!(y.ist_abgebrochen());
        assert!(registry.enthaelt(&z_id));

        for i in 0..anzahl {
            let (_, text) = mit_timeout(text_lesen(&mut z_leser, &key(9))).await;
            assert_eq!(text, format!("{i} {fuellung}"));
        }
    }

    #[tokio::test]
    async fn zu_grosse_nachricht_wird_verworfen_ohne_zu_entfernen() {
        let registry = Registry::neu();
        let (y, mut y_leser, _ys) = mitglied("Y", 7);
        let (z, _z_leser, _zs) = mitglied("Z", 9);
        registry.registrieren(Arc::clone(&y));
        registry.registrieren(Arc::clone(&z));

        // Base64 macht daraus mehr als eine Zeile
        let riesig = "\u{fffd}".repeat(MAX_ZEILEN_LAENGE / 3);
        assert_eq!(registry.verteilen("W", &riesig), 0);

        assert_eq!(registry.anzahl(), 2);
        assert!(!y.ist_abgebrochen());
        assert!(!z.ist_abgebrochen());

        assert_eq!(registry.verteilen("X", "noch da"), 2);
        assert_eq!(text_lesen(&mut y_leser, &key(7)).await, ("X".into(), "noch da".into()));
    }

    #[tokio::test]
    async fn schliessen_leert_queue_und_sendet_eof() {
        let (y, mut y_leser, _ys) = mitglied("Y", 7);

        assert_eq!(y.senden(Frame::ServerClose), Zustellung::Eingereiht);
        mit_timeout(y.schliessen()).await;
        y.schliessen().await;

        assert_eq!(y.senden(Frame::Close), Zustellung::Getrennt);
        assert_eq!(naechster_frame(&mut y_leser).await.unwrap().unwrap(), Frame::ServerClose);
        assert!(naechster_frame(&mut y_leser).await.is_none());
    }

    #[tokio::test]
    async fn systemnotiz_hat_system_absender() {
        let registry = Registry::neu();
        let (y, mut y_leser, _ys) = mitglied("Y", 3);
        registry.registrieren(y);

        registry.system_notiz("Y joined the group.");
        assert_eq!(
            text_lesen(&mut y_leser, &key(3)).await,
            ("System".into(), "Y joined the group.".into())
        );
    }
}
