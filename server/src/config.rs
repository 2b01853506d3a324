//! Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass Flurfunk ohne Konfigurationsdatei
//! lauffaehig ist. Die KDF-Parameter muessen auf beiden Seiten gleich sein.

use anyhow::{bail, Context};
use flurfunk_core::STANDARD_PORT;
use flurfunk_crypto::{KdfParameter, STANDARD_SALT_LAENGE};
use flurfunk_observability::{log_format_gueltig, log_level_gueltig};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlurfunkConfig {
    /// Adressen und Port
    pub netzwerk: NetzwerkEinstellungen,
    /// Standardnamen und Salt
    pub chat: ChatEinstellungen,
    /// Schluesselableitung (PBKDF2)
    pub kdf: KdfParameter,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Host und Gruppen-Server
    pub bind_adresse: String,
    /// Port fuer alle Betriebsarten
    pub port: u16,
    /// Ziel fuer `connect` und `group-join`
    pub host: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: STANDARD_PORT,
            host: "127.0.0.1".into(),
        }
    }
}

/// Chat-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatEinstellungen {
    /// Anzeigename als 1:1-Host
    pub host_name: String,
    /// Anzeigename als 1:1-Client
    pub client_name: String,
    /// Anzeigename als Gruppenmitglied
    pub gruppen_name: String,
    /// Absendername des Gruppen-Server-Bedieners
    pub server_name: String,
    /// Salt-Laenge in Bytes
    pub salt_laenge: usize,
}

impl Default for ChatEinstellungen {
    fn default() -> Self {
        Self {
            host_name: "Host".into(),
            client_name: "Client".into(),
            gruppen_name: "Anon".into(),
            server_name: "GroupHost".into(),
            salt_laenge: STANDARD_SALT_LAENGE,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl FlurfunkConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &Path) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{}'", pfad.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = %pfad.display(),
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Konfigurationsdatei '{}' nicht lesbar", pfad.display())
                })
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.kdf.validieren().context("Ungueltige [kdf]-Einstellungen")?;
        if self.chat.salt_laenge == 0 {
            bail!("[chat] salt_laenge muss groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("[logging] Ungueltiges Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("[logging] Ungueltiges Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Bind-Adresse fuer Host und Gruppen-Server, CLI-Werte haben Vorrang
    pub fn lausch_adresse(&self, bind: Option<&str>, port: Option<u16>) -> anyhow::Result<SocketAddr> {
        let bind = bind.unwrap_or(&self.netzwerk.bind_adresse);
        let ip: IpAddr = bind
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse: '{}'", bind))?;
        Ok(SocketAddr::new(ip, port.unwrap_or(self.netzwerk.port)))
    }

    /// Ziel fuer `connect` und `group-join`, CLI-Werte haben Vorrang
    pub fn ziel(&self, host: Option<&str>, port: Option<u16>) -> (String, u16) {
        (
            host.unwrap_or(&self.netzwerk.host).to_string(),
            port.unwrap_or(self.netzwerk.port),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = FlurfunkConfig::default();
        cfg.validieren().unwrap();
        assert_eq!(cfg.netzwerk.port, 9000);
        assert_eq!(cfg.chat.salt_laenge, 16);
        assert_eq!(cfg.kdf.iterationen, 100_000);
        assert_eq!(cfg.kdf.schluessel_laenge, 32);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            port = 9100

            [chat]
            server_name = "Flurfunk-Zentrale"

            [kdf]
            iterationen = 200000
        "#;
        let cfg: FlurfunkConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.port, 9100);
        assert_eq!(cfg.chat.server_name, "Flurfunk-Zentrale");
        assert_eq!(cfg.kdf.iterationen, 200_000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.kdf.schluessel_laenge, 32);
        assert_eq!(cfg.chat.gruppen_name, "Anon");
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = FlurfunkConfig::default();
        cfg.kdf.iterationen = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = FlurfunkConfig::default();
        cfg.chat.salt_laenge = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = FlurfunkConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = FlurfunkConfig::laden(Path::new("/nicht/vorhanden/flurfunk.toml")).unwrap();
        assert_eq!(cfg.netzwerk.port, STANDARD_PORT);
    }

    #[test]
    fn adressen_aufloesen() {
        let cfg = FlurfunkConfig::default();
        assert_eq!(
            cfg.lausch_adresse(None, None).unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            cfg.lausch_adresse(Some("127.0.0.1"), Some(9500)).unwrap(),
            "127.0.0.1:9500".parse::<SocketAddr>().unwrap()
        );
        assert!(cfg.lausch_adresse(Some("kein-ip"), None).is_err());

        assert_eq!(cfg.ziel(None, None), ("127.0.0.1".to_string(), 9000));
        assert_eq!(
            cfg.ziel(Some("chat.example"), Some(9001)),
            ("chat.example".to_string(), 9001)
        );
    }
}
