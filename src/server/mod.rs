//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Socket de escucha, loop de accept y apagado ordenado:
//!
//! ```text
//! listener.accept() → WorkQueue::push → WorkerPool → RequestHandler
//! ```

pub mod shutdown;
pub mod tcp;

pub use shutdown::ShutdownHandle;
pub use tcp::Server;
