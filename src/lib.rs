//! # Pool Server
//! src/lib.rs
//!
//! Servidor HTTP/1.0 concurrente construido alrededor de un pool fijo de
//! workers que consume una cola de trabajo bloqueante. Muestra los
//! conceptos de sistemas operativos del núcleo: exclusión mutua, variables
//! de condición, productor/consumidor y apagado ordenado.
//!
//! ## Arquitectura
//!
//! ```text
//! Acceptor ──push──▶ WorkQueue ──pop──▶ WorkerPool ──▶ RequestHandler
//! ```
//!
//! - `queue`: cola FIFO bloqueante con política de backpressure
//! - `pool`: workers de tamaño fijo con barreras de arranque y parada
//! - `handlers`: archivos estáticos o proxy, elegido una vez al arrancar
//! - `server`: socket de escucha, loop de accept y señal de apagado
//! - `http`: lectura de requests y escritura de responses HTTP/1.0
//! - `config`: argumentos CLI y variables de entorno
//! - `metrics`: contadores y latencias
//! - `error`: tipos de error
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use pool_server::config::Config;
//! use pool_server::handlers::build_handler;
//! use pool_server::server::Server;
//!
//! let mut config = Config::default();
//! config.files = Some("www".into());
//!
//! let handler = build_handler(&config).expect("handler");
//! let server = Server::bind(config).expect("bind");
//! server.serve_forever(handler).expect("serve");
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod server;

pub use error::{PoolError, PushError, ServerError};
