//! # flurfunk-crypto
//!
//! Schluesselableitung und Verschluesselung fuer Flurfunk-Chats.
//!
//! ## Module
//! - `kdf` - PIN + Salt -> Session-Schluessel (PBKDF2-HMAC-SHA256)
//! - `keystream` - XOR mit dem wiederholten Schluessel als Keystream
//! - `types` - `Salt` und `SessionKey`
//! - `error` - Fehlertypen
//!
//! ## Sicherheitshinweis
//!
//! Der Keystream-Cipher hat weder Nonce noch Auth-Tag. Gleicher Klartext
//! ergibt mit gleichem Schluessel immer gleichen Ciphertext, Bitfehler
//! werden nicht erkannt. Das Verhalten ist absichtlich kompatibel zum
//! bestehenden Wire-Protokoll und darf nicht als vertraulich gelten.

pub mod error;
pub mod kdf;
pub mod keystream;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use kdf::{
    derive_key, schluessel_ableiten, KdfParameter, STANDARD_ITERATIONEN, STANDARD_SCHLUESSEL_LAENGE,
};
pub use keystream::apply_keystream;
pub use types::{Salt, SessionKey, STANDARD_SALT_LAENGE};
