//! Keystream-Cipher
//!
//! `ausgabe[i] = daten[i] XOR schluessel[i mod len(schluessel)]`
//!
//! Selbstinvers: zweimal anwenden ergibt wieder die Eingabe. Kein Nonce,
//! kein Auth-Tag.

use crate::error::{CryptoError, CryptoResult};

/// Wendet den Schluessel als wiederholten Keystream auf `data` an
///
/// # Fehler
/// - `LeererSchluessel` wenn `key` leer ist
pub fn apply_keystream(data: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.is_empty() {
        return Err(CryptoError::LeererSchluessel);
    }
    Ok(xor_zyklisch(data, key))
}

/// XOR ohne Schluessel-Pruefung; Aufrufer garantiert `!key.is_empty()`
pub(crate) fn xor_zyklisch(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}
