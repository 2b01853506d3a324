//! # flurfunk-observability
//!
//! Structured Logging via tracing-subscriber. Logs gehen nach stderr, damit
//! sie sich nicht mit dem Chat-Verlauf auf stdout mischen.

pub mod logging;

pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat, LoggingFehler,
};
