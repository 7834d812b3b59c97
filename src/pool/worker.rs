//! # Workers y Barreras de Arranque/Parada
//! src/pool/worker.rs

use crate::error::PoolError;
use crate::handlers::RequestHandler;
use crate::metrics::MetricsCollector;
use crate::queue::WorkQueue;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info};

/// Contadores protegidos por el mutex del pool
#[derive(Default)]
struct WorkerCounts {
    /// Workers vivos en este momento
    alive: usize,

    /// Workers que alguna vez se reportaron vivos
    started: usize,
}

/// Estado compartido por el pool y todos sus workers
struct PoolState {
    counts: Mutex<WorkerCounts>,

    /// Se notifica en cada cambio de `counts`
    counts_changed: Condvar,

    /// Los workers lo leen en cada vuelta del loop
    keep_alive: AtomicBool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            counts: Mutex::new(WorkerCounts::default()),
            counts_changed: Condvar::new(),
            keep_alive: AtomicBool::new(true),
        }
    }

    fn lock_counts(&self) -> MutexGuard<'_, WorkerCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bloquea hasta que `done(counts)` sea verdadero
    fn wait_until(&self, done: impl Fn(&WorkerCounts) -> bool) {
        let counts = self.lock_counts();
        let _counts = self
            .counts_changed
            .wait_while(counts, |c| !done(c))
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }
}

/// Registra a un worker como vivo mientras exista
///
/// El decremento ocurre en `Drop`, así el contador es correcto por
/// cualquier camino de salida del thread.
struct AliveGuard<'a> {
    state: &'a PoolState,
}

impl<'a> AliveGuard<'a> {
    fn register(state: &'a PoolState) -> Self {
        let mut counts = state.lock_counts();
        counts.alive += 1;
        counts.started += 1;
        state.counts_changed.notify_all();
        Self { state }
    }
}

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        let mut counts = self.state.lock_counts();
        counts.alive = counts.alive.saturating_sub(1);
        self.state.counts_changed.notify_all();
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

/// Pool de tamaño fijo sobre una `WorkQueue<C>`
pub struct WorkerPool<C> {
    size: usize,
    state: Arc<PoolState>,
    queue: Arc<WorkQueue<C>>,
    workers: Mutex<Vec<Worker>>,
    metrics: MetricsCollector,
}

impl<C: Send + 'static> WorkerPool<C> {
    /// Arranca `size` workers y bloquea hasta que todos estén vivos
    ///
    /// # Errores
    ///
    /// - `PoolError::NoWorkers` si `size == 0`
    /// - `PoolError::Spawn` si el sistema no pudo crear algún thread; los
    ///   workers ya creados se detienen antes de retornar
    pub fn start<H>(
        size: usize,
        queue: Arc<WorkQueue<C>>,
        handler: Arc<H>,
    ) -> Result<Self, PoolError>
    where
        H: RequestHandler<C> + ?Sized + 'static,
    {
        Self::start_with_metrics(size, queue, handler, MetricsCollector::new())
    }

    /// Igual que `start`, registrando en un collector compartido
    pub fn start_with_metrics<H>(
        size: usize,
        queue: Arc<WorkQueue<C>>,
        handler: Arc<H>,
        metrics: MetricsCollector,
    ) -> Result<Self, PoolError>
    where
        H: RequestHandler<C> + ?Sized + 'static,
    {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let pool = Self {
            size,
            state: Arc::new(PoolState::new()),
            queue,
            workers: Mutex::new(Vec::with_capacity(size)),
            metrics,
        };

        for id in 0..size {
            let state = Arc::clone(&pool.state);
            let queue = Arc::clone(&pool.queue);
            let handler = Arc::clone(&handler);
            let metrics = pool.metrics.clone();

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, &state, &queue, &*handler, &metrics));

            match spawned {
                Ok(thread) => pool.lock_workers().push(Worker {
                    id,
                    thread: Some(thread),
                }),
                Err(e) => {
                    error!(worker = id, error = %e, "no se pudo crear el worker");
                    pool.stop();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        // Barrera de arranque: cuenta a los que se reportaron vivos aunque
        // ya hayan salido (p. ej. si la cola llegó cerrada)
        pool.state.wait_until(|c| c.started >= size);
        info!(workers = size, "pool de workers listo");

        Ok(pool)
    }
}

impl<C> WorkerPool<C> {
    fn lock_workers(&self) -> MutexGuard<'_, Vec<Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detiene el pool y bloquea hasta que no quede ningún worker vivo
    ///
    /// Marca `keep_alive = false`, cierra la cola para despertar a los
    /// workers bloqueados en `pop` y espera a que el contador llegue a cero.
    /// Un handler que no termina retiene a su worker, y con él a `stop`.
    /// Llamarlo más de una vez es seguro.
    pub fn stop(&self) {
        self.state.keep_alive.store(false, Ordering::Release);
        self.queue.unblock_all();

        // Barrera de parada
        self.state.wait_until(|c| c.alive == 0);

        let workers = mem::take(&mut *self.lock_workers());
        if workers.is_empty() {
            return;
        }
        for mut worker in workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    error!(worker = worker.id, "el worker terminó con pánico");
                }
            }
        }
        debug!(workers = self.size, "pool de workers detenido");
    }

    /// Tamaño configurado del pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers vivos en este momento
    pub fn alive(&self) -> usize {
        self.state.lock_counts().alive
    }

    /// Verifica si el pool sigue en marcha
    pub fn is_running(&self) -> bool {
        self.state.keep_alive()
    }

    pub fn queue(&self) -> &Arc<WorkQueue<C>> {
        &self.queue
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

impl<C> Drop for WorkerPool<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Loop principal del worker
fn worker_loop<C, H>(
    id: usize,
    state: &PoolState,
    queue: &WorkQueue<C>,
    handler: &H,
    metrics: &MetricsCollector,
) where
    H: RequestHandler<C> + ?Sized,
{
    let _alive = AliveGuard::register(state);
    debug!(worker = id, "worker iniciado");

    while state.keep_alive() {
        // Una conexión ya sacada de la cola se atiende aunque el pool se
        // esté deteniendo; nunca se cierra sin respuesta
        let Some(mut conn) = queue.pop() else {
            break;
        };

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut conn)));

        // Cerrar la conexión pase lo que pase en el handler
        drop(conn);

        match outcome {
            Ok(()) => metrics.record_handled(start.elapsed()),
            Err(_) => {
                metrics.record_handler_panic();
                error!(worker = id, "el handler entró en pánico; el worker sigue atendiendo");
            }
        }
    }

    debug!(worker = id, "worker terminado");
}
