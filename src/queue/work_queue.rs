//! # Cola de Trabajo Bloqueante
//! src/queue/work_queue.rs
//!
//! Implementa la cola de conexiones pendientes:
//! - `push`: agrega al final y despierta a un solo worker bloqueado.
//! - `pop`: bloquea mientras la cola esté vacía y siga aceptando.
//! - `unblock_all`: deja de aceptar y despierta a todos los workers.
//!
//! Por defecto la cola no tiene límite (sin backpressure). Con
//! `Backpressure::Block` o `Backpressure::Reject` la capacidad y lo que
//! ocurre al llenarse pasan a ser una decisión explícita.

use crate::error::PushError;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Qué hace `push` cuando la cola está llena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Sin límite: `push` siempre tiene éxito
    Unbounded,

    /// Con capacidad: `push` espera hasta que haya lugar
    Block(usize),

    /// Con capacidad: `push` devuelve `PushError::Full`
    Reject(usize),
}

impl Backpressure {
    /// Capacidad máxima (None = sin límite)
    ///
    /// Una capacidad de 0 se trata como 1: una cola que nunca puede
    /// contener nada bloquearía al productor para siempre.
    pub fn capacity(&self) -> Option<usize> {
        match *self {
            Backpressure::Unbounded => None,
            Backpressure::Block(cap) | Backpressure::Reject(cap) => Some(cap.max(1)),
        }
    }
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Unbounded
    }
}

/// Estado protegido por el mutex
struct QueueState<T> {
    /// Elementos pendientes, en orden de llegada
    items: VecDeque<T>,

    /// false a partir de `unblock_all`
    accepting: bool,
}

/// Cola FIFO bloqueante
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,

    /// Señal para consumidores: hay elementos o se cerró la cola
    not_empty: Condvar,

    /// Señal para productores (solo con `Backpressure::Block`)
    not_full: Condvar,

    backpressure: Backpressure,
}

impl<T> WorkQueue<T> {
    /// Crea una cola sin límite de capacidad
    pub fn new() -> Self {
        Self::with_backpressure(Backpressure::Unbounded)
    }

    /// Crea una cola con la política de backpressure indicada
    pub fn with_backpressure(backpressure: Backpressure) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                accepting: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            backpressure,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Agrega un elemento al final de la cola
    ///
    /// Despierta exactamente a un consumidor bloqueado en `pop`.
    /// Falla solo si la cola está cerrada o llena con `Backpressure::Reject`;
    /// en ambos casos el elemento vuelve al llamador dentro del error.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();

        if !state.accepting {
            return Err(PushError::Closed(item));
        }

        if let Some(capacity) = self.backpressure.capacity() {
            match self.backpressure {
                Backpressure::Reject(_) if state.items.len() >= capacity => {
                    return Err(PushError::Full(item));
                }
                Backpressure::Block(_) => {
                    state = self
                        .not_full
                        .wait_while(state, |s| s.accepting && s.items.len() >= capacity)
                        .unwrap_or_else(PoisonError::into_inner);

                    // unblock_all pudo llegar mientras esperábamos
                    if !state.accepting {
                        return Err(PushError::Closed(item));
                    }
                }
                _ => {}
            }
        }

        state.items.push_back(item);
        self.not_empty.notify_one();

        Ok(())
    }

    /// Remueve y retorna el primer elemento
    ///
    /// Si la cola está vacía y sigue aceptando, bloquea hasta que llegue
    /// un elemento o hasta `unblock_all`. Retorna `None` solo cuando la cola
    /// está vacía y cerrada: la señal para que el worker termine.
    pub fn pop(&self) -> Option<T> {
        let state = self.lock();
        let mut state = self
            .not_empty
            .wait_while(state, |s| s.items.is_empty() && s.accepting)
            .unwrap_or_else(PoisonError::into_inner);

        let item = state.items.pop_front();
        if item.is_some() && self.backpressure.capacity().is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Intenta remover el primer elemento sin bloquear
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        let item = state.items.pop_front();
        if item.is_some() && self.backpressure.capacity().is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Deja de aceptar elementos y despierta a todos los bloqueados
    ///
    /// Idempotente. Los consumidores que esperaban en `pop` sobre una cola
    /// vacía reciben `None`; los productores bloqueados reciben `Closed`.
    pub fn unblock_all(&self) {
        let mut state = self.lock();
        state.accepting = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Vacía la cola y retorna lo que quedaba pendiente, en orden
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        let drained: Vec<T> = state.items.drain(..).collect();
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    /// Número de elementos pendientes
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Verifica si la cola está vacía
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verifica si la cola sigue aceptando elementos
    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    /// Obtiene estadísticas de la cola
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            pending: state.items.len(),
            capacity: self.backpressure.capacity(),
            accepting: state.accepting,
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Estadísticas de la cola
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub capacity: Option<usize>,
    pub accepting: bool,
}
