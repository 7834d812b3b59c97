//! # Módulo de Métricas
//! src/metrics/mod.rs
//!
//! Contadores del acceptor y del pool, más latencias de los handlers.
//! Se registran al final de `serve_forever`.

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
