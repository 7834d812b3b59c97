//! # Handlers de Conexión
//! src/handlers/mod.rs
//!
//! Un handler consume una conexión ya aceptada, escribe exactamente una
//! respuesta y la deja lista para que el worker la cierre. Los errores se
//! resuelven dentro del handler (404, 502, ...) y nunca llegan al pool.
//!
//! ```text
//! Acceptor → WorkQueue → Worker → RequestHandler::handle(&mut conn) → close
//! ```
//!
//! Hay dos variantes, elegidas una sola vez al arrancar:
//! - `files`: sirve archivos estáticos desde un directorio raíz
//! - `proxy`: reenvía bytes hacia un upstream fijo

pub mod files;
pub mod proxy;

pub use files::FileHandler;
pub use proxy::ProxyHandler;

use crate::config::{Config, HandlerMode};
use crate::error::ServerError;
use crate::http::Response;
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Capacidad de atender una conexión
///
/// El parámetro `C` es el tipo de conexión; en el servidor real es
/// `TcpStream`, en los tests del pool puede ser cualquier cosa.
pub trait RequestHandler<C = TcpStream>: Send + Sync {
    fn handle(&self, conn: &mut C);
}

impl<C, F> RequestHandler<C> for F
where
    F: Fn(&mut C) + Send + Sync,
{
    fn handle(&self, conn: &mut C) {
        self(conn)
    }
}

/// Construye el handler seleccionado por la configuración
pub fn build_handler(config: &Config) -> Result<Arc<dyn RequestHandler>, ServerError> {
    let mode = config.handler_mode().map_err(ServerError::Config)?;

    let handler: Arc<dyn RequestHandler> = match mode {
        HandlerMode::Files { root } => {
            let handler = FileHandler::new(&root).map_err(|e| {
                ServerError::Config(format!("directorio raíz inválido {}: {}", root.display(), e))
            })?;
            Arc::new(handler)
        }
        HandlerMode::Proxy(target) => Arc::new(ProxyHandler::new(
            target,
            Duration::from_millis(config.proxy_connect_timeout_ms),
        )),
    };

    Ok(handler)
}

/// Agrega headers comunes y escribe la respuesta completa
///
/// Un fallo de escritura significa que el cliente ya se fue; no hay a quién
/// avisarle, así que solo se registra.
pub(crate) fn send_response<W: Write>(stream: &mut W, mut response: Response) -> Response {
    response.add_header("Server", SERVER_NAME);
    response.add_header("Connection", "close");

    let result = stream
        .write_all(&response.to_bytes())
        .and_then(|_| stream.flush());
    if let Err(e) = result {
        debug!(error = %e, "no se pudo escribir la respuesta");
    }

    response
}

/// Valor del header `Server`
pub const SERVER_NAME: &str = concat!("pool-server/", env!("CARGO_PKG_VERSION"));
