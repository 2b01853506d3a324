//! Kommandozeile
//!
//! ```text
//! flurfunk [--config <pfad>] host         [--bind <ip>]   [--port <p>] [--name <n>]
//! flurfunk [--config <pfad>] connect      [--host <addr>] [--port <p>] [--name <n>]
//! flurfunk [--config <pfad>] group-server [--bind <ip>]   [--port <p>] [--name <n>]
//! flurfunk [--config <pfad>] group-join   [--host <addr>] [--port <p>] [--name <n>]
//! ```
//!
//! Die PIN wird nie ueber argv uebergeben, sondern immer verdeckt abgefragt.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Umgebungsvariable fuer den Konfigurationspfad
pub const ENV_CONFIG: &str = "FLURFUNK_CONFIG";

/// Standardpfad der Konfigurationsdatei
pub const STANDARD_CONFIG_PFAD: &str = "flurfunk.toml";

/// Flurfunk – verschluesselter Zeilen-Chat ueber TCP
#[derive(Debug, Parser)]
#[command(name = "flurfunk", version, about, long_about = None)]
pub struct Cli {
    /// Pfad zur Konfigurationsdatei (sonst FLURFUNK_CONFIG oder flurfunk.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub befehl: Befehl,
}

impl Cli {
    /// Pfad aus `--config`, dann `FLURFUNK_CONFIG`, dann Standard
    pub fn config_pfad(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(STANDARD_CONFIG_PFAD))
    }
}

/// Betriebsarten
#[derive(Debug, Subcommand)]
pub enum Befehl {
    /// 1:1-Chat hosten und auf genau einen Peer warten
    Host(LauschOptionen),
    /// Mit einem 1:1-Host verbinden
    Connect(ZielOptionen),
    /// Gruppen-Relay starten
    GroupServer(LauschOptionen),
    /// Einer Gruppe beitreten
    GroupJoin(ZielOptionen),
}

/// Optionen fuer Modi, die lauschen
#[derive(Debug, Clone, Default, Args)]
pub struct LauschOptionen {
    /// Bind-Adresse (Standard aus [netzwerk] bind_adresse)
    #[arg(long)]
    pub bind: Option<String>,
    /// Port (Standard aus [netzwerk] port)
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Anzeigename
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Optionen fuer Modi, die sich verbinden
#[derive(Debug, Clone, Default, Args)]
pub struct ZielOptionen {
    /// Zieladresse (Standard aus [netzwerk] host)
    #[arg(long)]
    pub host: Option<String>,
    /// Port (Standard aus [netzwerk] port)
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Anzeigename
    #[arg(short, long)]
    pub name: Option<String>,
}
