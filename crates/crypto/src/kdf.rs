//! PIN-basierte Schluesselableitung
//!
//! PBKDF2-HMAC-SHA256 mit expliziter Iterationszahl und Ausgabelaenge.
//! Zwei Endpunkte mit gleicher PIN, gleichem Salt und gleichen Parametern
//! erhalten bitidentische Schluessel. Die Standardwerte (100000 Iterationen,
//! 32 Bytes) muessen auf beiden Seiten uebereinstimmen.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{Salt, SessionKey};

/// Standard-Iterationszahl fuer PBKDF2
pub const STANDARD_ITERATIONEN: u32 = 100_000;

/// Standard-Laenge des abgeleiteten Schluessels in Bytes
pub const STANDARD_SCHLUESSEL_LAENGE: usize = 32;

/// Parameter der Schluesselableitung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParameter {
    /// PBKDF2-Iterationen
    pub iterationen: u32,
    /// Ausgabelaenge in Bytes
    pub schluessel_laenge: usize,
}

impl Default for KdfParameter {
    fn default() -> Self {
        Self {
            iterationen: STANDARD_ITERATIONEN,
            schluessel_laenge: STANDARD_SCHLUESSEL_LAENGE,
        }
    }
}

impl KdfParameter {
    /// Validiert die Parameter
    pub fn validieren(&self) -> CryptoResult<()> {
        if self.iterationen == 0 {
            return Err(CryptoError::UngueltigeParameter(
                "Iterationszahl muss mindestens 1 sein".into(),
            ));
        }
        if self.schluessel_laenge == 0 {
            return Err(CryptoError::UngueltigeParameter(
                "Schluessellaenge muss mindestens 1 Byte sein".into(),
            ));
        }
        Ok(())
    }
}

/// Leitet rohe Schluessel-Bytes aus PIN und Salt ab
///
/// Deterministisch und ohne Seiteneffekte. Eine leere PIN ist erlaubt.
pub fn derive_key(pin: &str, salt: &[u8], iterationen: u32, laenge: usize) -> Vec<u8> {
    let mut schluessel = vec![0u8; laenge];
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, iterationen, &mut schluessel);
    schluessel
}

/// Leitet einen `SessionKey` fuer eine Verbindung ab
///
/// # Fehler
/// - `UngueltigeParameter` bei 0 Iterationen oder Laenge 0 (ein leerer
///   Schluessel waere fuer den Keystream unbrauchbar)
pub fn schluessel_ableiten(pin: &str, salt: &Salt, params: KdfParameter) -> CryptoResult<SessionKey> {
    params.validieren()?;
    let bytes = derive_key(pin, salt.as_bytes(), params.iterationen, params.schluessel_laenge);
    SessionKey::new(bytes)
}
