//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Config-Datei):
//! - `FLURFUNK_LOG_LEVEL`: Filter-Direktive (trace/debug/info/warn/error
//!   oder z.B. `flurfunk_relay=debug`), Standard: info
//! - `FLURFUNK_LOG_FORMAT`: Format (text/json), Standard: text

use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "FLURFUNK_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "FLURFUNK_LOG_FORMAT";

/// Fehler beim Einrichten des Loggings
#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Ungueltiges Log-Format: {0} (erlaubt: text, json)")]
    Format(String),

    #[error("Ungueltiger Log-Filter '{filter}': {grund}")]
    Filter { filter: String, grund: String },

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            anderes => Err(LoggingFehler::Format(anderes.to_string())),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `FLURFUNK_LOG_LEVEL` und `FLURFUNK_LOG_FORMAT` ueberschreiben die
/// uebergebenen Werte aus der Konfiguration.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingFehler> {
    let (filter, format) = einstellungen_aufloesen(
        level,
        format,
        std::env::var(ENV_LOG_LEVEL).ok(),
        std::env::var(ENV_LOG_FORMAT).ok(),
    )?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    ergebnis.map_err(|e| LoggingFehler::BereitsInitialisiert(e.to_string()))
}

/// Kombiniert Config-Werte mit Umgebungs-Overrides
fn einstellungen_aufloesen(
    level: &str,
    format: &str,
    env_level: Option<String>,
    env_format: Option<String>,
) -> Result<(EnvFilter, LogFormat), LoggingFehler> {
    let filter_text = env_level.unwrap_or_else(|| level.to_string());
    let filter = EnvFilter::try_new(&filter_text).map_err(|e| LoggingFehler::Filter {
        filter: filter_text.clone(),
        grund: e.to_string(),
    })?;
    let format = env_format.as_deref().unwrap_or(format).parse()?;
    Ok((filter, format))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
