//! # Servidor TCP con Pool de Workers
//! src/server/tcp.rs
//!
//! El thread que llama a `serve_forever` es el acceptor: acepta conexiones
//! y las encola; los workers del pool las atienden.
//!
//! ## Orden de arranque
//! 1. `WorkQueue`
//! 2. `WorkerPool` (bloquea hasta que todos los workers están vivos)
//! 3. Loop de accept
//!
//! ## Orden de apagado
//! 1. `ShutdownHandle::trigger` despierta al acceptor, que sale del loop
//! 2. La cola se cierra; lo que quedaba pendiente recibe 503
//! 3. `WorkerPool::stop` espera a que terminen los handlers en curso

use super::ShutdownHandle;
use crate::config::Config;
use crate::error::{PushError, ServerError};
use crate::handlers::{send_response, RequestHandler};
use crate::http::{Response, StatusCode};
use crate::metrics::MetricsCollector;
use crate::pool::WorkerPool;
use crate::queue::WorkQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Errores de accept seguidos antes de rendirse
const MAX_CONSECUTIVE_ACCEPT_ERRORS: u32 = 100;

/// Pausa tras un error de accept (p. ej. EMFILE) para no girar en vacío
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Segundos sugeridos en `Retry-After` cuando la cola está llena
const RETRY_AFTER_SECS: &str = "1";

/// Servidor HTTP/1.0 con pool fijo de workers
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    metrics: MetricsCollector,
}

impl Server {
    /// Crea el socket de escucha (`SO_REUSEADDR`, backlog configurado)
    ///
    /// Un fallo aquí es fatal: el llamador debe terminar el proceso.
    pub fn bind(config: Config) -> Result<Self, ServerError> {
        let address = config.address();

        let addr = address
            .to_socket_addrs()
            .map_err(|e| ServerError::bind(&address, e))?
            .next()
            .ok_or_else(|| {
                ServerError::bind(
                    &address,
                    io::Error::new(io::ErrorKind::InvalidInput, "la dirección no resolvió"),
                )
            })?;

        let listener = listen(addr, config.backlog).map_err(|e| ServerError::bind(&address, e))?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, backlog = config.backlog, "socket de escucha listo");

        Ok(Self {
            config,
            listener,
            local_addr,
            shutdown: ShutdownHandle::new(local_addr),
            metrics: MetricsCollector::new(),
        })
    }

    /// Dirección real de escucha (útil con puerto 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Arranca el pool y atiende conexiones hasta que se pida el apagado
    ///
    /// Retorna `Ok(())` tras un apagado ordenado. Retorna error si el pool
    /// no arrancó o si `accept` falló de forma persistente; en ese caso el
    /// pool también se detiene antes de retornar.
    pub fn serve_forever(self, handler: Arc<dyn RequestHandler>) -> Result<(), ServerError> {
        let queue = Arc::new(WorkQueue::with_backpressure(self.config.backpressure()));
        let pool = WorkerPool::start_with_metrics(
            self.config.num_threads,
            Arc::clone(&queue),
            handler,
            self.metrics.clone(),
        )?;

        info!(
            addr = %self.local_addr,
            workers = pool.size(),
            "servidor escuchando"
        );

        let result = self.accept_loop(&queue);
        if let Err(e) = &result {
            error!(error = %e, "el loop de accept terminó con error");
        }

        let stats = queue.stats();
        debug!(pending = stats.pending, capacity = ?stats.capacity, "accept detenido");

        // Nada nuevo entra; lo pendiente no va a ser atendido
        queue.unblock_all();
        let leftovers = queue.drain();
        if !leftovers.is_empty() {
            warn!(pending = leftovers.len(), "conexiones sin atender al apagar");
        }
        for stream in leftovers {
            self.refuse_shutting_down(stream);
        }

        pool.stop();
        info!(metrics = %self.metrics.to_json(), "servidor detenido");

        result
    }

    fn accept_loop(&self, queue: &WorkQueue<TcpStream>) -> Result<(), ServerError> {
        let mut consecutive_errors = 0;

        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Puede ser la conexión de despertar o un cliente real
                    // que llegó antes que ella; ambos reciben 503
                    if self.shutdown.is_triggered() {
                        debug!(%peer, "apagado en curso, conexión rechazada");
                        self.refuse_shutting_down(stream);
                        return Ok(());
                    }
                    consecutive_errors = 0;
                    self.metrics.record_accepted();
                    debug!(%peer, "conexión aceptada");

                    match queue.push(stream) {
                        Ok(()) => self.metrics.record_queue_depth(queue.len()),
                        Err(PushError::Full(stream)) => self.reject(stream, peer),
                        Err(PushError::Closed(stream)) => {
                            self.refuse_shutting_down(stream);
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    if self.shutdown.is_triggered() {
                        return Ok(());
                    }
                    if e.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }

                    consecutive_errors += 1;
                    self.metrics.record_accept_error();
                    warn!(error = %e, consecutive = consecutive_errors, "error en accept");

                    if consecutive_errors >= MAX_CONSECUTIVE_ACCEPT_ERRORS {
                        return Err(ServerError::Accept(e));
                    }
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
    }

    fn refuse_shutting_down(&self, mut stream: TcpStream) {
        self.metrics.record_rejected();
        send_response(
            &mut stream,
            Response::error(StatusCode::ServiceUnavailable, "Server is shutting down"),
        );
    }

    /// Cola llena con política `reject`: 503 y cierre inmediato
    fn reject(&self, mut stream: TcpStream, peer: SocketAddr) {
        self.metrics.record_rejected();
        warn!(%peer, "cola llena, conexión rechazada");

        let response = Response::error(StatusCode::ServiceUnavailable, "Server is overloaded")
            .with_header("Retry-After", RETRY_AFTER_SECS);
        send_response(&mut stream, response);
    }
}

fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}
