//! Terminal-Anbindung: Eingabezeilen, Chat-Ausgabe und PIN-Abfrage
//!
//! Die Relay-Sitzungen kennen kein Terminal. Sie bekommen Zeilen ueber
//! einen mpsc-Kanal und melden Anzeigen als `ChatEreignis`. Hier werden
//! beide Seiten mit stdin/stdout verbunden.

use anyhow::Context;
use flurfunk_core::ChatEreignis;
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Puffer fuer noch nicht gesendete Eingabezeilen
const EINGABE_PUFFER: usize = 64;

/// Startet einen eigenen Thread, der stdin zeilenweise liest
///
/// Ein OS-Thread statt `tokio::io::stdin`, damit ein haengender Read das
/// Beenden der Runtime nicht blockiert. EOF schliesst den Kanal.
pub fn eingabe_starten() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(EINGABE_PUFFER);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for zeile in stdin.lock().lines() {
            let Ok(zeile) = zeile else { break };
            if tx.blocking_send(zeile).is_err() {
                break;
            }
        }
    });
    rx
}

/// Startet den Task, der Chat-Ereignisse auf stdout druckt
///
/// Endet, sobald alle Sender gedroppt sind.
pub fn ausgabe_starten() -> (mpsc::UnboundedSender<ChatEreignis>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEreignis>();
    let handle = tokio::spawn(async move {
        while let Some(ereignis) = rx.recv().await {
            println!("{}", anzeigen(&ereignis));
        }
    });
    (tx, handle)
}

/// Formatiert ein Ereignis fuer das Terminal
pub fn anzeigen(ereignis: &ChatEreignis) -> String {
    match ereignis {
        ChatEreignis::Nachricht { .. } => format!("🔒 {}", ereignis),
        anderes => anderes.to_string(),
    }
}

/// Fragt die PIN ohne Echo ab (getrimmt)
pub async fn pin_abfragen(prompt: &str) -> anyhow::Result<String> {
    let prompt = prompt.to_string();
    let pin = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
        .await
        .context("PIN-Abfrage abgebrochen")?
        .context("PIN konnte nicht gelesen werden")?;
    Ok(pin.trim().to_string())
}

/// Ermittelt die nach aussen sichtbare lokale IP
///
/// Nur fuer `0.0.0.0` relevant. Der UDP-Connect sendet keine Pakete, er
/// waehlt nur die Route. Faellt auf die Bind-Adresse zurueck.
pub fn lokale_ip_ermitteln(bind: IpAddr) -> IpAddr {
    if !bind.is_unspecified() {
        return bind;
    }
    let ermittelt = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map(|adresse| adresse.ip());
    match ermittelt {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!(fehler = %e, "Lokale IP nicht ermittelbar");
            bind
        }
    }
}
