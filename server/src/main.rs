//! Flurfunk – Einstiegspunkt
//!
//! Liest die Kommandozeile, laedt die Konfiguration, initialisiert das
//! Logging und startet die gewaehlte Betriebsart.

use anyhow::Result;
use clap::Parser;
use flurfunk::{cli::Cli, config::FlurfunkConfig};
use flurfunk_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config_pfad = cli.config_pfad();
    let config = FlurfunkConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad.display(),
        "Flurfunk wird initialisiert"
    );

    flurfunk::ausfuehren(cli.befehl, config).await
}
