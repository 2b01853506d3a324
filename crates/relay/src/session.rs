//! Aktive Chat-Phase fuer 1:1-Sitzung und Gruppen-Client
//!
//! Zwei Tasks pro Sitzung: ein Leser fuer eingehende Frames und ein
//! Schreiber fuer lokale Eingaben. Beide erhalten beim Spawn dasselbe
//! [`Ende`]. Wer zuerst fertig ist, traegt den Grund ein und bricht den
//! anderen ab. Der Transport wird danach genau einmal geschlossen.
//!
//! ```text
//! eingabe (mpsc) --> ausgehend --> FrameSender --> TCP
//! TCP --> FrameLeser --> eingehend --> ausgabe (ChatEreignis)
//! ```

use flurfunk_core::{ist_beenden_befehl, Beendigung, ChatEreignis};
use flurfunk_crypto::SessionKey;
use flurfunk_protocol::Frame;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::transport::{naechster_frame, FrameLeser, FrameSender};

/// Unterschiede zwischen 1:1-Peer und Gruppen-Client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rolle {
    Peer,
    GruppenClient,
}

impl Rolle {
    /// Frame, der bei lokalem `/exit` gesendet wird
    fn abschluss_frame(self) -> Frame {
        match self {
            Rolle::Peer => Frame::Close,
            Rolle::GruppenClient => Frame::Leave,
        }
    }

    /// Prueft ob ein eingehender Frame die Sitzung beendet
    fn beendet_durch(self, frame: &Frame) -> Option<Beendigung> {
        match (self, frame) {
            (Rolle::Peer, Frame::Close) => Some(Beendigung::GegenstelleBeendet),
            (Rolle::GruppenClient, Frame::ServerClose) => Some(Beendigung::ServerGeschlossen),
            _ => None,
        }
    }
}

/// Alles, was eine Sitzung nach dem Handshake besitzt
pub(crate) struct ChatTeile {
    pub leser: FrameLeser,
    pub sender: FrameSender,
    pub key: Arc<SessionKey>,
    pub name: String,
    pub rolle: Rolle,
}

/// Gemeinsames Ende-Signal beider Richtungen
#[derive(Clone, Default)]
struct Ende {
    abbruch: CancellationToken,
    grund: Arc<OnceLock<Beendigung>>,
}

impl Ende {
    /// Erster Aufruf gewinnt
    fn melden(&self, grund: Beendigung) {
        let _ = self.grund.set(grund);
        self.abbruch.cancel();
    }

    fn grund(&self) -> Beendigung {
        self.grund
            .get()
            .copied()
            .unwrap_or(Beendigung::VerbindungVerloren)
    }
}

/// Fuehrt die aktive Phase bis zum Ende aus
///
/// Meldet zum Schluss `ChatEreignis::Beendet` auf `ausgabe`.
pub(crate) async fn chat_ausfuehren(
    teile: ChatTeile,
    eingabe: mpsc::Receiver<String>,
    ausgabe: mpsc::UnboundedSender<ChatEreignis>,
) -> Beendigung {
    let ChatTeile {
        leser,
        sender,
        key,
        name,
        rolle,
    } = teile;
    let ende = Ende::default();

    let eingehend = tokio::spawn(eingehend_task(
        leser,
        Arc::clone(&key),
        rolle,
        ausgabe.clone(),
        ende.clone(),
    ));
    let ausgehend = tokio::spawn(ausgehend_task(
        sender.clone(),
        key,
        name,
        rolle,
        eingabe,
        ende.clone(),
    ));

    let (rein, raus) = tokio::join!(eingehend, ausgehend);
    for fehler in [rein.err(), raus.err()].into_iter().flatten() {
        tracing::error!(fehler = %fehler, "Chat-Task abgebrochen");
    }

    sender.schliessen().await;

    let grund = ende.grund();
    tracing::info!(grund = ?grund, "Chat-Sitzung beendet");
    let _ = ausgabe.send(ChatEreignis::Beendet(grund));
    grund
}

async fn eingehend_task(
    mut leser: FrameLeser,
    key: Arc<SessionKey>,
    rolle: Rolle,
    ausgabe: mpsc::UnboundedSender<ChatEreignis>,
    ende: Ende,
) {
    tokio::select! {
        _ = ende.abbruch.cancelled() => {}
        grund = eingehend_schleife(&mut leser, &key, rolle, &ausgabe) => ende.melden(grund),
    }
}

async fn ausgehend_task(
    sender: FrameSender,
    key: Arc<SessionKey>,
    name: String,
    rolle: Rolle,
    mut eingabe: mpsc::Receiver<String>,
    ende: Ende,
) {
    tokio::select! {
        _ = ende.abbruch.cancelled() => {}
        grund = ausgehend_schleife(&sender, &key, &name, rolle, &mut eingabe) => ende.melden(grund),
    }
}

async fn eingehend_schleife(
    leser: &mut FrameLeser,
    key: &SessionKey,
    rolle: Rolle,
    ausgabe: &mpsc::UnboundedSender<ChatEreignis>,
) -> Beendigung {
    while let Some(ergebnis) = naechster_frame(leser).await {
        let frame = match ergebnis {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(fehler = %e, "Lesefehler auf dem Transport");
                return Beendigung::VerbindungVerloren;
            }
        };

        if let Some(grund) = rolle.beendet_durch(&frame) {
            return grund;
        }

        match frame {
            Frame::Msg { name, ct } => {
                let ereignis = match key.entschluesseln_text(&ct) {
                    Ok(text) => ChatEreignis::Nachricht { name, text },
                    Err(e) => {
                        tracing::debug!(absender = %name, fehler = %e, "Nachricht nicht entschluesselbar");
                        ChatEreignis::Beschaedigt
                    }
                };
                let _ = ausgabe.send(ereignis);
            }
            anderer => tracing::debug!(typ = anderer.typ(), "Frame in aktiver Sitzung ignoriert"),
        }
    }

    tracing::debug!("Gegenstelle hat den Transport geschlossen");
    Beendigung::VerbindungVerloren
}

async fn ausgehend_schleife(
    sender: &FrameSender,
    key: &SessionKey,
    name: &str,
    rolle: Rolle,
    eingabe: &mut mpsc::Receiver<String>,
) -> Beendigung {
    while let Some(zeile) = eingabe.recv().await {
        if ist_beenden_befehl(&zeile) {
            if let Err(e) = sender.senden(rolle.abschluss_frame()).await {
                tracing::debug!(fehler = %e, "Abschluss-Frame nicht zugestellt");
            }
            return Beendigung::LokalBeendet;
        }
        if zeile.trim().is_empty() {
            continue;
        }

        let ct = key.verschluesseln_base64(&zeile);
        if let Err(e) = sender.senden(Frame::nachricht(name, ct)).await {
            tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
            return Beendigung::VerbindungVerloren;
        }
    }

    Beendigung::EingabeBeendet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::transport_aufteilen;
    use std::time::Duration;

    fn test_key() -> Arc<SessionKey> {
        Arc::new(SessionKey::new((1..=32).collect()).unwrap())
    }

    struct Aufbau {
        eingabe: mpsc::Sender<String>,
        ausgabe: mpsc::UnboundedReceiver<ChatEreignis>,
        gegen_leser: FrameLeser,
        gegen_sender: FrameSender,
        sitzung: tokio::task::JoinHandle<Beendigung>,
    }

    fn starten(rolle: Rolle) -> Aufbau {
        let (lokal, gegen) = tokio::io::duplex(4096);
        let (leser, sender) = transport_aufteilen(lokal);
        let (gegen_leser, gegen_sender) = transport_aufteilen(gegen);
        let (eingabe_tx, eingabe_rx) = mpsc::channel(16);
        let (ausgabe_tx, ausgabe_rx) = mpsc::unbounded_channel();

        let teile = ChatTeile {
            leser,
            sender,
            key: test_key(),
            name: "Alice".into(),
            rolle,
        };
        let sitzung = tokio::spawn(chat_ausfuehren(teile, eingabe_rx, ausgabe_tx));

        Aufbau {
            eingabe: eingabe_tx,
            ausgabe: ausgabe_rx,
            gegen_leser,
            gegen_sender,
            sitzung,
        }
    }

    async fn mit_timeout<T>(f: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), f)
            .await
            .expect("Timeout")
    }

    #[tokio::test]
    async fn eingabe_wird_verschluesselt_gesendet() {
        let mut a = starten(Rolle::Peer);
        a.eingabe.send("hallo".into()).await.unwrap();

        let frame = mit_timeout(naechster_frame(&mut a.gegen_leser))
            .await
            .unwrap()
            .unwrap();
        match frame {
            Frame::Msg { name, ct } => {
                assert_eq!(name, "Alice");
                assert_eq!(test_key().entschluesseln_text(&ct).unwrap(), "hallo");
            }
            anderer => panic!("unerwarteter Frame: {anderer:?}"),
        }
    }

    #[tokio::test]
    async fn leere_zeilen_werden_nicht_gesendet() {
        let mut a = starten(Rolle::Peer);
        a.eingabe.send(String::new()).await.unwrap();
        a.eingabe.send("   ".into()).await.unwrap();
        a.eingabe.send("x".into()).await.unwrap();

        let frame = mit_timeout(naechster_frame(&mut a.gegen_leser))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Frame::Msg { .. }));
    }

    #[tokio::test]
    async fn eingehende_nachricht_wird_gemeldet() {
        let mut a = starten(Rolle::Peer);
        let ct = test_key().verschluesseln_base64("hello");
        a.gegen_sender.senden(Frame::nachricht("B", ct)).await.unwrap();

        let ereignis = mit_timeout(a.ausgabe.recv()).await.unwrap();
        assert_eq!(
            ereignis,
            ChatEreignis::Nachricht {
                name: "B".into(),
                text: "hello".into()
            }
        );
    }

    #[tokio::test]
    async fn kaputte_nachricht_beendet_nichts() {
        let mut a = starten(Rolle::Peer);
        a.gegen_sender
            .senden(Frame::nachricht("B", "%%%kein base64%%%"))
            .await
            .unwrap();
        let ct = test_key().verschluesseln_base64("danach");
        a.gegen_sender.senden(Frame::nachricht("B", ct)).await.unwrap();

        assert_eq!(
            mit_timeout(a.ausgabe.recv()).await.unwrap(),
            ChatEreignis::Beschaedigt
        );
        assert_eq!(
            mit_timeout(a.ausgabe.recv()).await.unwrap(),
            ChatEreignis::Nachricht {
                name: "B".into(),
                text: "danach".into()
            }
        );
    }

    #[tokio::test]
    async fn exit_sendet_close_und_schliesst() {
        let mut a = starten(Rolle::Peer);
        a.eingabe.send(" /EXIT ".into()).await.unwrap();

        assert_eq!(mit_timeout(a.sitzung).await.unwrap(), Beendigung::LokalBeendet);
        assert_eq!(
            naechster_frame(&mut a.gegen_leser).await.unwrap().unwrap(),
            Frame::Close
        );
        assert!(naechster_frame(&mut a.gegen_leser).await.is_none());
        assert_eq!(
            a.ausgabe.recv().await.unwrap(),
            ChatEreignis::Beendet(Beendigung::LokalBeendet)
        );
    }

    #[tokio::test]
    async fn gruppen_client_sendet_leave() {
        let mut a = starten(Rolle::GruppenClient);
        a.eingabe.send("/quit".into()).await.unwrap();

        assert_eq!(mit_timeout(a.sitzung).await.unwrap(), Beendigung::LokalBeendet);
        assert_eq!(
            naechster_frame(&mut a.gegen_leser).await.unwrap().unwrap(),
            Frame::Leave
        );
    }

    #[tokio::test]
    async fn close_der_gegenstelle() {
        let a = starten(Rolle::Peer);
        a.gegen_sender.senden(Frame::Close).await.unwrap();
        assert_eq!(
            mit_timeout(a.sitzung).await.unwrap(),
            Beendigung::GegenstelleBeendet
        );
    }

    #[tokio::test]
    async fn server_close_beendet_gruppen_client() {
        let a = starten(Rolle::GruppenClient);
        a.gegen_sender.senden(Frame::ServerClose).await.unwrap();
        assert_eq!(
            mit_timeout(a.sitzung).await.unwrap(),
            Beendigung::ServerGeschlossen
        );
    }

    #[tokio::test]
    async fn server_close_wird_von_peer_ignoriert() {
        let mut a = starten(Rolle::Peer);
        a.gegen_sender.senden(Frame::ServerClose).await.unwrap();
        let ct = test_key().verschluesseln_base64("noch da");
        a.gegen_sender.senden(Frame::nachricht("B", ct)).await.unwrap();

        assert!(matches!(
            mit_timeout(a.ausgabe.recv()).await.unwrap(),
            ChatEreignis::Nachricht { .. }
        ));
    }

    #[tokio::test]
    async fn eof_beendet_sitzung() {
        let a = starten(Rolle::Peer);
        drop(a.gegen_sender);
        drop(a.gegen_leser);
        assert_eq!(
            mit_timeout(a.sitzung).await.unwrap(),
            Beendigung::VerbindungVerloren
        );
    }

    #[tokio::test]
    async fn geschlossene_eingabe_sendet_keinen_frame() {
        let mut a = starten(Rolle::Peer);
        drop(a.eingabe);

        assert_eq!(
            mit_timeout(a.sitzung).await.unwrap(),
            Beendigung::EingabeBeendet
        );
        assert!(naechster_frame(&mut a.gegen_leser).await.is_none());
    }
}
