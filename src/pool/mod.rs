//! # Pool de Workers
//! src/pool/mod.rs
//!
//! N workers fijos que consumen la cola de trabajo. Cada uno ejecuta:
//!
//! ```text
//! loop {
//!     pop → None o keep_alive == false → salir
//!     handler.handle(&mut conn)
//!     cerrar conn
//! }
//! ```
//!
//! El pool tiene dos barreras sobre el contador de workers vivos:
//! - `start` no retorna hasta que los N workers están vivos, así ninguna
//!   conexión se encola sin alguien que la atienda.
//! - `stop` no retorna hasta que el contador vuelve a cero.

pub mod worker;

pub use worker::WorkerPool;
