//! Chat-Ereignisse fuer den lokalen Bediener
//!
//! Die Sitzungen im Relay-Crate melden alles, was auf dem Terminal landen
//! soll, als `ChatEreignis` ueber einen tokio-Kanal. Das Binary druckt sie,
//! Tests werten sie direkt aus.

use std::fmt;

/// Ereignisse, die eine Sitzung dem lokalen Bediener meldet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEreignis {
    /// Entschluesselte Chat-Zeile
    Nachricht { name: String, text: String },
    /// Nachricht konnte nicht entschluesselt werden (Base64 oder Text kaputt)
    Beschaedigt,
    /// Neues Mitglied in der Gruppe (nur Server-Bediener)
    Beigetreten { name: String, adresse: String },
    /// Mitglied hat die Gruppe verlassen (nur Server-Bediener)
    Verlassen { name: String },
    /// Sitzung ist beendet
    Beendet(Beendigung),
}

impl fmt::Display for ChatEreignis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEreignis::Nachricht { name, text } => write!(f, "{name}: {text}"),
            ChatEreignis::Beschaedigt => write!(f, "[!] Corrupt or wrong PIN."),
            ChatEreignis::Beigetreten { name, adresse } => {
                write!(f, "[+] {name} joined from {adresse}")
            }
            ChatEreignis::Verlassen { name } => write!(f, "[-] {name} disconnected."),
            ChatEreignis::Beendet(grund) => write!(f, "[!] {grund}"),
        }
    }
}

/// Grund fuer das Ende einer Chat-Sitzung
///
/// Kooperative Beendigung ist kein Fehler; nur `VerbindungVerloren`
/// entspricht einem Transportfehler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beendigung {
    /// Lokaler Bediener hat `/exit` eingegeben
    LokalBeendet,
    /// Gegenstelle hat `close` gesendet (1:1)
    GegenstelleBeendet,
    /// Server hat `server_close` gesendet (Gruppe)
    ServerGeschlossen,
    /// EOF oder Lese-/Schreibfehler auf dem Transport
    VerbindungVerloren,
    /// Lokale Eingabe wurde geschlossen
    EingabeBeendet,
}

impl fmt::Display for Beendigung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Beendigung::LokalBeendet => "Session ended.",
            Beendigung::GegenstelleBeendet => "Peer closed.",
            Beendigung::ServerGeschlossen => "Server closed.",
            Beendigung::VerbindungVerloren => "Connection lost.",
            Beendigung::EingabeBeendet => "Input closed.",
        };
        f.write_str(text)
    }
}
