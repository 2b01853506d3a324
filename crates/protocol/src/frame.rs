//! Frame-Typen des Chat-Protokolls
//!
//! Geschlossener Summentyp ueber die sechs bekannten Frame-Arten. Das Feld
//! `type` ist der serde-Tag, die Feldreihenfolge spielt beim Dekodieren
//! keine Rolle.
//!
//! | type           | Felder          | Richtung               |
//! |----------------|-----------------|------------------------|
//! | `salt`         | `salt` (Base64) | Server/Host -> Peer    |
//! | `join`         | `name`          | Client -> Gruppe       |
//! | `msg`          | `name`, `ct`    | beide                  |
//! | `leave`        | –               | Client -> Gruppe       |
//! | `close`        | –               | Peer -> Peer (1:1)     |
//! | `server_close` | –               | Gruppe -> Client       |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use thiserror::Error;

/// Alle Werte, die im Feld `type` erkannt werden
pub const BEKANNTE_TYPEN: [&str; 6] = ["salt", "join", "msg", "leave", "close", "server_close"];

/// Ein Protokoll-Frame (eine Zeile auf dem Draht)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Handshake: Salt fuer die Schluesselableitung
    Salt { salt: String },
    /// Gruppen-Beitritt nach der Schluesselableitung
    Join {
        #[serde(default)]
        name: String,
    },
    /// Eine verschluesselte Chat-Zeile
    Msg { name: String, ct: String },
    /// Freiwilliges Verlassen der Gruppe
    Leave,
    /// Freiwilliges Beenden einer 1:1-Sitzung
    Close,
    /// Erzwungenes Ende durch den Gruppen-Server
    ServerClose,
}

impl Frame {
    /// Erstellt einen `salt`-Frame aus Base64-kodiertem Salt
    pub fn salt(salt_base64: impl Into<String>) -> Self {
        Frame::Salt {
            salt: salt_base64.into(),
        }
    }

    /// Erstellt einen `join`-Frame
    pub fn join(name: impl Into<String>) -> Self {
        Frame::Join { name: name.into() }
    }

    /// Erstellt einen `msg`-Frame aus Base64-kodiertem Ciphertext
    pub fn nachricht(name: impl Into<String>, ct_base64: impl Into<String>) -> Self {
        Frame::Msg {
            name: name.into(),
            ct: ct_base64.into(),
        }
    }

    /// Gibt den Wert des `type`-Felds zurueck
    pub fn typ(&self) -> &'static str {
        match self {
            Frame::Salt { .. } => "salt",
            Frame::Join { .. } => "join",
            Frame::Msg { .. } => "msg",
            Frame::Leave => "leave",
            Frame::Close => "close",
            Frame::ServerClose => "server_close",
        }
    }
}

/// Fehler beim Dekodieren einer einzelnen Zeile
///
/// Nie fatal fuer die Verbindung: die Zeile wird verworfen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameFehler {
    #[error("Ungueltiges JSON: {0}")]
    Json(String),

    #[error("Feld 'type' fehlt")]
    TypFehlt,

    #[error("Unbekannter Frame-Typ: {0}")]
    UnbekannterTyp(String),

    #[error("Ungueltige Felder fuer '{typ}': {grund}")]
    Felder { typ: String, grund: String },
}

/// Ergebnis des Decoders pro Zeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dekodiert {
    /// Gueltiger, bekannter Frame
    Frame(Frame),
    /// Zeile wurde verworfen; die Verbindung laeuft weiter
    Verworfen(FrameFehler),
}

impl Dekodiert {
    /// Gibt den Frame zurueck, falls die Zeile gueltig war
    pub fn frame(self) -> Option<Frame> {
        match self {
            Dekodiert::Frame(frame) => Some(frame),
            Dekodiert::Verworfen(_) => None,
        }
    }
}

impl From<Result<Frame, FrameFehler>> for Dekodiert {
    fn from(ergebnis: Result<Frame, FrameFehler>) -> Self {
        match ergebnis {
            Ok(frame) => Dekodiert::Frame(frame),
            Err(fehler) => Dekodiert::Verworfen(fehler),
        }
    }
}

/// Dekodiert eine Zeile (ohne Zeilenende) zu einem Frame
pub fn zeile_dekodieren(zeile: &[u8]) -> Result<Frame, FrameFehler> {
    let wert: Value =
        serde_json::from_slice(zeile).map_err(|e| FrameFehler::Json(e.to_string()))?;

    let typ = wert
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameFehler::TypFehlt)?
        .to_string();

    if !BEKANNTE_TYPEN.contains(&typ.as_str()) {
        return Err(FrameFehler::UnbekannterTyp(typ));
    }

    serde_json::from_value(wert).map_err(|e| FrameFehler::Felder {
        typ,
        grund: e.to_string(),
    })
}

/// Kodiert einen Frame als kompaktes JSON plus Zeilenende
///
/// serde_json escaped Steuerzeichen in Strings, daher enthaelt die
/// Ausgabe ausser dem letzten Byte nie ein `\n`.
pub fn frame_kodieren(frame: &Frame) -> io::Result<Vec<u8>> {
    let mut zeile = serde_json::to_vec(frame).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {}", e),
        )
    })?;
    zeile.push(b'\n');
    Ok(zeile)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
