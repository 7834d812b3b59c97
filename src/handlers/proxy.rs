//! # Handler Proxy
//! src/handlers/proxy.rs
//!
//! Abre una conexión nueva hacia un upstream fijo por cada cliente y copia
//! bytes en ambos sentidos hasta que los dos lados terminan:
//!
//! ```text
//! cliente ──(hilo scoped)──▶ upstream
//! cliente ◀──(worker)─────── upstream
//! ```
//!
//! - EOF en un sentido: se hace `shutdown(Write)` del otro extremo (half-close)
//! - Error en un sentido: se cierran ambos sockets para liberar al otro hilo
//! - Upstream inalcanzable: 502 Bad Gateway al cliente

use super::{send_response, RequestHandler};
use crate::config::ProxyTarget;
use crate::http::{read_head, Response, StatusCode};
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cuánto se espera la cabecera del cliente antes de responder 502
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Reenvía cada conexión hacia `target`
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    target: ProxyTarget,
    connect_timeout: Duration,
}

impl ProxyHandler {
    pub fn new(target: ProxyTarget, connect_timeout: Duration) -> Self {
        Self {
            target,
            connect_timeout,
        }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    /// Resuelve el upstream y prueba cada dirección hasta que una conecte
    fn connect(&self) -> io::Result<TcpStream> {
        let addrs = (self.target.host.as_str(), self.target.port).to_socket_addrs()?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "intento de conexión fallido");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "el host no resolvió a ninguna dirección")
        }))
    }

    /// Responde 502 sin dejar la cabecera del cliente sin leer
    fn reject(&self, client: &mut TcpStream, error: &io::Error) {
        warn!(upstream = %self.target, error = %error, "upstream inalcanzable");

        // Si el cliente no manda nada no queremos quedarnos esperando
        if client.set_read_timeout(Some(DRAIN_TIMEOUT)).is_ok() {
            let _ = read_head(client);
        }

        let message = format!("Cannot connect to upstream {}", self.target);
        send_response(client, Response::error(StatusCode::BadGateway, &message));
    }
}

impl RequestHandler for ProxyHandler {
    fn handle(&self, client: &mut TcpStream) {
        let peer = client
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "desconocido".to_string());

        let upstream = match self.connect() {
            Ok(upstream) => upstream,
            Err(e) => {
                self.reject(client, &e);
                return;
            }
        };

        let start = Instant::now();
        let (sent, received) = relay(client, &upstream);

        info!(
            client = %peer,
            upstream = %self.target,
            bytes_up = sent,
            bytes_down = received,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "relay terminado"
        );
    }
}

/// Copia en ambos sentidos hasta que los dos terminen
///
/// Retorna los bytes enviados al upstream y los recibidos de él.
fn relay(client: &TcpStream, upstream: &TcpStream) -> (u64, u64) {
    thread::scope(|s| {
        let upload = s.spawn(|| pipe(client, upstream));
        let received = pipe(upstream, client);

        let sent = match upload.join() {
            Ok(sent) => sent,
            Err(_) => {
                warn!("el hilo de subida del relay entró en pánico");
                0
            }
        };

        (sent, received)
    })
}

/// Un sentido del relay
fn pipe(mut from: &TcpStream, mut to: &TcpStream) -> u64 {
    match io::copy(&mut from, &mut to) {
        Ok(n) => {
            let _ = to.shutdown(Shutdown::Write);
            n
        }
        Err(e) => {
            debug!(error = %e, "relay interrumpido");
            let _ = from.shutdown(Shutdown::Both);
            let _ = to.shutdown(Shutdown::Both);
            0
        }
    }
}
