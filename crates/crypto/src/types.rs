//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CryptoError, CryptoResult};
use crate::keystream::xor_zyklisch;

/// Standard-Laenge eines frisch erzeugten Salts in Bytes
pub const STANDARD_SALT_LAENGE: usize = 16;

/// Zufaelliges Salt fuer die Schluesselableitung
///
/// Wird im Klartext im Handshake uebertragen und ist daher nicht geheim.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Erzeugt ein neues Salt aus dem Betriebssystem-Zufall
    pub fn generieren(laenge: usize) -> Self {
        let mut bytes = vec![0u8; laenge];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Dekodiert ein Salt aus dem `salt`-Feld eines Handshake-Frames
    pub fn from_base64(kodiert: &str) -> CryptoResult<Self> {
        Ok(Self(STANDARD.decode(kodiert)?))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", self.to_base64())
    }
}

/// Abgeleiteter Session-Schluessel (wird beim Drop genullt)
///
/// Invariante: nie leer. Wird nie uebertragen und nie geloggt.
#[derive(Clone)]
pub struct SessionKey(Vec<u8>);

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey([REDACTED] {} bytes)", self.0.len())
    }
}

impl SessionKey {
    /// Erstellt einen Schluessel aus rohen Bytes
    ///
    /// # Fehler
    /// - `LeererSchluessel` bei leerer Eingabe
    pub fn new(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.is_empty() {
            return Err(CryptoError::LeererSchluessel);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Immer false; nur fuer Clippy-Symmetrie zu `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Verschluesselt Bytes mit dem Keystream
    pub fn verschluesseln(&self, klartext: &[u8]) -> Vec<u8> {
        xor_zyklisch(klartext, &self.0)
    }

    /// Verschluesselt eine Textzeile und kodiert sie fuer das `ct`-Feld
    pub fn verschluesseln_base64(&self, text: &str) -> String {
        STANDARD.encode(self.verschluesseln(text.as_bytes()))
    }

    /// Entschluesselt ein `ct`-Feld streng
    ///
    /// # Fehler
    /// - `Base64` bei ungueltigem Base64
    /// - `KeinText` wenn das Ergebnis kein gueltiges UTF-8 ist (typisch
    ///   fuer eine falsche PIN)
    pub fn entschluesseln_text(&self, ct: &str) -> CryptoResult<String> {
        let bytes = STANDARD.decode(ct)?;
        Ok(String::from_utf8(xor_zyklisch(&bytes, &self.0))?)
    }

    /// Entschluesselt ein `ct`-Feld und ersetzt ungueltige UTF-8-Sequenzen
    ///
    /// # Fehler
    /// - `Base64` bei ungueltigem Base64
    pub fn entschluesseln_lossy(&self, ct: &str) -> CryptoResult<String> {
        let bytes = STANDARD.decode(ct)?;
        Ok(String::from_utf8_lossy(&xor_zyklisch(&bytes, &self.0)).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::new((1..=32).collect()).unwrap()
    }

    #[test]
    fn salt_hat_gewuenschte_laenge_und_ist_zufaellig() {
        let a = Salt::generieren(STANDARD_SALT_LAENGE);
        let b = Salt::generieren(STANDARD_SALT_LAENGE);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn salt_base64_kodierung() {
        let salt = Salt::from_bytes(b"0123456789abcdef".to_vec());
        assert_eq!(salt.to_base64(), "MDEyMzQ1Njc4OWFiY2RlZg==");
        assert_eq!(Salt::from_base64(&salt.to_base64()).unwrap(), salt);
    }

    #[test]
    fn salt_ungueltiges_base64() {
        assert!(matches!(
            Salt::from_base64("kein base64!"),
            Err(CryptoError::Base64(_))
        ));
    }

    #[test]
    fn leerer_session_key_wird_abgelehnt() {
        assert!(matches!(
            SessionKey::new(Vec::new()),
            Err(CryptoError::LeererSchluessel)
        ));
    }

    #[test]
    fn session_key_debug_ist_geschwaerzt() {
        let ausgabe = format!("{:?}", test_key());
        assert!(ausgabe.contains("REDACTED"));
        assert!(!ausgabe.contains("1, 2, 3"));
    }

    #[test]
    fn text_verschluesseln_und_entschluesseln() {
        let key = test_key();
        let ct = key.verschluesseln_base64("hallo welt – äöü");
        assert_eq!(key.entschluesseln_text(&ct).unwrap(), "hallo welt – äöü");
    }

    #[test]
    fn falscher_schluessel_ergibt_keinen_absturz() {
        let richtig = test_key();
        let falsch = SessionKey::new(vec![0x80; 32]).unwrap();
        let ct = richtig.verschluesseln_base64("hello");

        // ASCII XOR 0x80 ist nie gueltiges UTF-8
        let streng = falsch.entschluesseln_text(&ct);
        assert!(matches!(streng, Err(ref e) if e.ist_beschaedigung()));

        let lossy = falsch.entschluesseln_lossy(&ct).unwrap();
        assert_ne!(lossy, "hello");
    }

    #[test]
    fn kaputtes_base64_ist_beschaedigung() {
        let fehler = test_key().entschluesseln_text("%%%").unwrap_err();
        assert!(fehler.ist_beschaedigung());
    }
}
