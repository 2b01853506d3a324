//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Leerer Schluessel: Keystream braucht mindestens ein Byte")]
    LeererSchluessel,

    #[error("Ungueltige KDF-Parameter: {0}")]
    UngueltigeParameter(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Entschluesselter Inhalt ist kein gueltiger Text: {0}")]
    KeinText(#[from] std::string::FromUtf8Error),
}

impl CryptoError {
    /// Gibt true zurueck wenn der Fehler eine beschaedigte Nachricht meldet
    ///
    /// Solche Fehler beenden keine Sitzung, sie werden dem Bediener nur
    /// als "Corrupt or wrong PIN" angezeigt.
    pub fn ist_beschaedigung(&self) -> bool {
        matches!(self, Self::Base64(_) | Self::KeinText(_))
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
