//! flurfunk-core – Gemeinsame Typen, Ereignisse und Konstanten
//!
//! Dieses Crate stellt die Bausteine bereit, die von Relay, Protokoll und
//! Binary gemeinsam genutzt werden.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{Beendigung, ChatEreignis};
pub use types::VerbindungsId;

/// Standard-Port fuer Host und Gruppen-Server
pub const STANDARD_PORT: u16 = 9000;

/// Absendername fuer Server-Notizen (Join/Leave)
pub const SYSTEM_ABSENDER: &str = "System";

/// Name fuer Mitglieder, die beim Join keinen Namen mitschicken
pub const ANONYMER_NAME: &str = "Anon";

/// Lokale Befehle, die eine Sitzung beenden
pub const BEENDEN_BEFEHLE: [&str; 2] = ["/exit", "/quit"];

/// Prueft ob eine Eingabezeile ein Beenden-Befehl ist
///
/// Vergleich erfolgt getrimmt und ohne Beachtung der Gross-/Kleinschreibung.
pub fn ist_beenden_befehl(zeile: &str) -> bool {
    let zeile = zeile.trim().to_lowercase();
    BEENDEN_BEFEHLE.contains(&zeile.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beenden_befehle_erkannt() {
        assert!(ist_beenden_befehl("/exit"));
        assert!(ist_beenden_befehl("  /QUIT \n"));
        assert!(ist_beenden_befehl("/Exit"));
    }

    #[test]
    fn normale_zeilen_sind_kein_befehl() {
        assert!(!ist_beenden_befehl("hallo"));
        assert!(!ist_beenden_befehl("/exitus"));
        assert!(!ist_beenden_befehl(""));
    }
}
