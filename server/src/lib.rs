//! flurfunk – Bibliotheks-Root
//!
//! Deklariert die Module des Binaries und verdrahtet die vier
//! Betriebsarten mit Konfiguration und Terminal.

pub mod cli;
pub mod config;
pub mod console;

use anyhow::{Context, Result};
use cli::{Befehl, LauschOptionen, ZielOptionen};
use config::FlurfunkConfig;
use flurfunk_core::{Beendigung, ChatEreignis};
use flurfunk_relay::{
    client_verbinden, gruppe_verbinden, host_annehmen, GruppenConfig, GruppenServer,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Fuehrt den gewaehlten Befehl aus
pub async fn ausfuehren(befehl: Befehl, config: FlurfunkConfig) -> Result<()> {
    match befehl {
        Befehl::Host(opts) => host_ausfuehren(&config, opts).await,
        Befehl::Connect(opts) => client_ausfuehren(&config, opts).await,
        Befehl::GroupServer(opts) => gruppen_server_ausfuehren(&config, opts).await,
        Befehl::GroupJoin(opts) => gruppe_beitreten(&config, opts).await,
    }
}

/// 1:1-Host: lauschen, genau einen Peer annehmen, Salt senden, chatten
async fn host_ausfuehren(config: &FlurfunkConfig, opts: LauschOptionen) -> Result<()> {
    let bind = config.lausch_adresse(opts.bind.as_deref(), opts.port)?;
    let name = opts.name.unwrap_or_else(|| config.chat.host_name.clone());

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Bind auf {} fehlgeschlagen", bind))?;
    let adresse = listener.local_addr()?;
    println!(
        "[+] Listening on {}:{}",
        console::lokale_ip_ermitteln(adresse.ip()),
        adresse.port()
    );

    let handshake = host_annehmen(&listener, config.chat.salt_laenge).await?;
    drop(listener);
    if let Some(peer) = handshake.gegenstelle() {
        println!("[+] Connected: {}", peer);
    }

    let pin = console::pin_abfragen("Set shared PIN: ").await?;
    let sitzung = handshake.aktivieren(&pin, config.kdf).await?;

    println!("[*] Chat started. /exit to quit.");
    chat_fuehren(|eingabe, ausgabe| sitzung.ausfuehren(name, eingabe, ausgabe)).await;
    println!("[*] Host chat ended.");
    Ok(())
}

/// 1:1-Client: verbinden, Salt abwarten, chatten
async fn client_ausfuehren(config: &FlurfunkConfig, opts: ZielOptionen) -> Result<()> {
    let (host, port) = config.ziel(opts.host.as_deref(), opts.port);
    let name = opts.name.unwrap_or_else(|| config.chat.client_name.clone());

    let handshake = client_verbinden((host.as_str(), port))
        .await
        .with_context(|| format!("Verbindung zu {}:{} fehlgeschlagen", host, port))?;

    let pin = console::pin_abfragen("Enter shared PIN: ").await?;
    let sitzung = handshake.aktivieren(&pin, config.kdf).await?;

    println!("[*] Chat started. /exit to quit.");
    chat_fuehren(|eingabe, ausgabe| sitzung.ausfuehren(name, eingabe, ausgabe)).await;
    println!("[*] Client ended.");
    Ok(())
}

/// Gruppen-Server: PIN setzen, lauschen, Bediener-Zeilen verteilen
async fn gruppen_server_ausfuehren(config: &FlurfunkConfig, opts: LauschOptionen) -> Result<()> {
    let bind = config.lausch_adresse(opts.bind.as_deref(), opts.port)?;
    let pin = console::pin_abfragen("Set group PIN: ").await?;

    let mut gruppen_config = GruppenConfig::neu(bind, pin);
    gruppen_config.server_name = opts.name.unwrap_or_else(|| config.chat.server_name.clone());
    gruppen_config.kdf = config.kdf;
    gruppen_config.salt_laenge = config.chat.salt_laenge;

    let (ausgabe, _drucker) = console::ausgabe_starten();
    let server = Arc::new(GruppenServer::neu(gruppen_config)?.mit_ereignissen(ausgabe));
    let adresse = server
        .starten()
        .await
        .with_context(|| format!("Gruppen-Server auf {} nicht startbar", bind))?;
    println!("Group server on {}", adresse);

    let eingabe = console::eingabe_starten();
    tokio::select! {
        _ = server.betreiben(eingabe) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C empfangen");
            server.stoppen().await;
        }
    }
    println!("[*] Group server stopped.");
    Ok(())
}

/// Gruppen-Client: verbinden, Salt abwarten, join senden, chatten
async fn gruppe_beitreten(config: &FlurfunkConfig, opts: ZielOptionen) -> Result<()> {
    let (host, port) = config.ziel(opts.host.as_deref(), opts.port);
    let name = opts.name.unwrap_or_else(|| config.chat.gruppen_name.clone());

    let handshake = gruppe_verbinden((host.as_str(), port))
        .await
        .with_context(|| format!("Verbindung zu {}:{} fehlgeschlagen", host, port))?;

    let pin = console::pin_abfragen("Enter group PIN: ").await?;
    let sitzung = handshake.beitreten(&name, &pin, config.kdf).await?;

    println!("[*] Joined group. /exit to leave.");
    chat_fuehren(|eingabe, ausgabe| sitzung.ausfuehren(eingabe, ausgabe)).await;
    println!("[*] Left group.");
    Ok(())
}

/// Verbindet eine aktive Sitzung mit dem Terminal
///
/// stdin wird erst hier geoeffnet, nach der PIN-Abfrage.
async fn chat_fuehren<F, Fut>(sitzung: F) -> Beendigung
where
    F: FnOnce(mpsc::Receiver<String>, mpsc::UnboundedSender<ChatEreignis>) -> Fut,
    Fut: Future<Output = Beendigung>,
{
    let (ausgabe, drucker) = console::ausgabe_starten();
    let eingabe = console::eingabe_starten();

    let grund = sitzung(eingabe, ausgabe).await;

    if let Err(e) = drucker.await {
        tracing::warn!(fehler = %e, "Ausgabe-Task abgebrochen");
    }
    grund
}
