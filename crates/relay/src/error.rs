//! Fehlertypen fuer Sitzungen und Relay

use flurfunk_crypto::CryptoError;
use thiserror::Error;

/// Fehlertyp fuer den Relay-Crate
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket, zu lange Zeile)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake fehlgeschlagen (erster Frame fehlt oder falscher Typ)
    #[error("Handshake-Fehler: {0}")]
    Handshake(String),

    /// Schluesselableitung oder Keystream
    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] CryptoError),

    /// Transport wurde bereits geschlossen
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Operation passt nicht zum aktuellen Zustand
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler den Transport betrifft
    pub fn ist_transportfehler(&self) -> bool {
        matches!(self, Self::Io(_) | Self::VerbindungGetrennt)
    }
}

/// Result-Typ fuer den Relay-Crate
pub type RelayResult<T> = Result<T, RelayError>;
