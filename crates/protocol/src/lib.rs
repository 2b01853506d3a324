//! flurfunk-protocol – Wire-Protokoll-Definitionen
//!
//! Jeder Frame ist genau eine Zeile UTF-8-JSON mit Pflichtfeld `type`,
//! abgeschlossen durch `\n`. Binaerdaten (`salt`, `ct`) sind Base64.
//! Es gibt kein Laengenpraefix und kein Versionsfeld.

pub mod frame;
pub mod wire;

pub use frame::{frame_kodieren, zeile_dekodieren, Dekodiert, Frame, FrameFehler};
pub use wire::{FrameCodec, MAX_ZEILEN_LAENGE};
