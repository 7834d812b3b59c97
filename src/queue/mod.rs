//! # Cola de Trabajo
//! src/queue/mod.rs
//!
//! Cola FIFO thread-safe entre el thread de accept (productor) y los
//! workers (consumidores). El lock interno solo se mantiene durante la
//! manipulación O(1) de la cola, nunca mientras corre un handler.

pub mod work_queue;

pub use work_queue::{Backpressure, QueueStats, WorkQueue};
