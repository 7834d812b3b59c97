//! # Errores del Servidor
//! src/error.rs
//!
//! Taxonomía de errores del núcleo:
//! - Fallos de bind/listen: fatales al arrancar.
//! - Fallos de accept: transitorios, se registran y el loop sigue
//!   (solo se vuelven error si se repiten sin pausa).
//! - Fallos del pool: arrancar con 0 workers o no poder crear un thread.
//!
//! Los errores de un handler (archivo inexistente, upstream caído) nunca
//! llegan aquí: el handler los resuelve escribiendo una respuesta.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errores del servidor
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuración inválida
    #[error("configuración inválida: {0}")]
    Config(String),

    /// No se pudo crear, enlazar o poner a escuchar el socket
    #[error("no se pudo escuchar en {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Error al arrancar el pool de workers
    #[error("error en el pool de workers: {0}")]
    Pool(#[from] PoolError),

    /// `accept` falló demasiadas veces seguidas
    #[error("el loop de accept falló de forma persistente: {0}")]
    Accept(#[source] io::Error),

    /// Error de IO genérico
    #[error("error de IO: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        ServerError::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Errores del pool de workers
#[derive(Error, Debug)]
pub enum PoolError {
    /// Se pidió un pool de tamaño cero
    #[error("el pool necesita al menos un worker")]
    NoWorkers,

    /// El sistema operativo no permitió crear un thread
    #[error("no se pudo crear el thread del worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Rechazo de `WorkQueue::push`
///
/// Devuelve el elemento al llamador para que decida qué hacer con la
/// conexión (responder 503, cerrarla...).
pub enum PushError<T> {
    /// La cola está llena y la política es rechazar
    Full(T),

    /// La cola ya no acepta elementos (shutdown en curso)
    Closed(T),
}

impl<T> PushError<T> {
    /// Recupera el elemento rechazado
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "la cola de trabajo está llena"),
            PushError::Closed(_) => write!(f, "la cola de trabajo está cerrada"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}
