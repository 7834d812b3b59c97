//! # Señal de Apagado
//! src/server/shutdown.rs
//!
//! `accept` bloqueante no se puede interrumpir desde otro thread en forma
//! portable. El handle marca un flag y abre una conexión local contra el
//! listener: el acceptor despierta, ve el flag y sale del loop.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle clonable para pedir el apagado del servidor
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    pub(crate) fn new(listen_addr: SocketAddr) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            wake_addr: loopback_for(listen_addr),
        }
    }

    /// Pide el apagado y despierta al acceptor
    ///
    /// Idempotente: solo la primera llamada hace algo.
    pub fn trigger(&self) {
        if self.requested.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("apagado solicitado");

        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            // El listener ya no existe: no hay nadie a quien despertar
            debug!(addr = %self.wake_addr, error = %e, "no se pudo despertar al acceptor");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// `0.0.0.0:P` → `127.0.0.1:P` (y lo mismo para IPv6)
fn loopback_for(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_loopback_for_unspecified() {
        let addr: SocketAddr = "0.0.0.0:8000".parse().unwrap();
        assert_eq!(loopback_for(addr), "127.0.0.1:8000".parse().unwrap());

        let addr: SocketAddr = "[::]:8000".parse().unwrap();
        assert_eq!(loopback_for(addr), "[::1]:8000".parse().unwrap());

        let addr: SocketAddr = "10.0.0.1:80".parse().unwrap();
        assert_eq!(loopback_for(addr), addr);
    }

    #[test]
    fn test_trigger_wakes_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let handle = ShutdownHandle::new(listener.local_addr().unwrap());
        assert!(!handle.is_triggered());

        handle.trigger();
        assert!(handle.is_triggered());

        // La conexión de despertar quedó en el backlog
        let (_conn, _) = listener.accept().unwrap();
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let handle = ShutdownHandle::new(listener.local_addr().unwrap());
        let clone = handle.clone();

        handle.trigger();
        clone.trigger();
        assert!(clone.is_triggered());

        listener.set_nonblocking(true).unwrap();
        assert!(listener.accept().is_ok());
        // Solo una conexión de despertar
        assert!(listener.accept().is_err());
    }
}
