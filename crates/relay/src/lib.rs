//! flurfunk-relay – Sitzungen und Gruppen-Relay
//!
//! Dieser Crate verbindet Krypto und Wire-Protokoll zu den drei
//! Betriebsarten von Flurfunk: 1:1-Chat, Gruppen-Server und
//! Gruppen-Client.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (GruppenServer)
//!     |
//!     v
//! Verbindungs-Handler (pro Verbindung ein Task)
//!     |  salt -> join -> Schluessel -> Registry
//!     v
//! Registry (ein Mutex)  --Schnappschuss-->  try_send in die Sende-Queue
//!                                            |
//!                                            v
//!                                 Schreib-Task pro Mitglied
//!
//! PeerSession / GruppenSitzung
//!     +-- eingehend (Leser-Task)
//!     +-- ausgehend (Schreiber-Task)
//! ```
//!
//! Der lokale Bediener ist ueber Kanaele angebunden: Eingabezeilen kommen
//! ueber `mpsc::Receiver<String>`, Anzeigen gehen als `ChatEreignis` raus.

pub mod error;
pub mod group_client;
pub mod group_server;
mod handshake;
pub mod peer;
pub mod registry;
mod session;
pub mod transport;

// Bequeme Re-Exporte
pub use error::{RelayError, RelayResult};
pub use group_client::{gruppe_handshake, gruppe_verbinden, GruppenHandshake, GruppenSitzung};
pub use group_server::{GruppenConfig, GruppenServer, ServerZustand, STANDARD_SERVER_NAME};
pub use peer::{
    client_handshake, client_verbinden, host_annehmen, host_handshake, ClientHandshake,
    HostHandshake, PeerSession,
};
pub use registry::{Mitglied, Registry, Zustellung, SEND_QUEUE_GROESSE};
pub use transport::{transport_aufteilen, FrameLeser, FrameSender};
