//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta métricas del servidor en tiempo real.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Máximo de latencias a guardar (para calcular percentiles)
const MAX_LATENCIES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Default)]
struct MetricsData {
    /// Conexiones aceptadas por el acceptor
    accepted: u64,

    /// Fallos de `accept`
    accept_errors: u64,

    /// Conexiones rechazadas por backpressure
    rejected: u64,

    /// Conexiones atendidas por algún worker
    handled: u64,

    /// Handlers que terminaron en pánico
    handler_panics: u64,

    /// Mayor largo de cola observado
    peak_queue_depth: usize,

    /// Últimas latencias de handler (en microsegundos)
    latencies: VecDeque<u64>,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                latencies: VecDeque::with_capacity(MAX_LATENCIES),
                ..MetricsData::default()
            })),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_accepted(&self) {
        self.lock().accepted += 1;
    }

    pub fn record_accept_error(&self) {
        self.lock().accept_errors += 1;
    }

    pub fn record_rejected(&self) {
        self.lock().rejected += 1;
    }

    pub fn record_handler_panic(&self) {
        self.lock().handler_panics += 1;
    }

    /// Registra el largo de la cola tras un push
    pub fn record_queue_depth(&self, depth: usize) {
        let mut data = self.lock();
        data.peak_queue_depth = data.peak_queue_depth.max(depth);
    }

    /// Registra una conexión atendida y cuánto tardó su handler
    pub fn record_handled(&self, latency: Duration) {
        let mut data = self.lock();
        data.handled += 1;

        // Si tenemos demasiadas latencias, eliminar las más antiguas
        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.lock();
        let (p50, p95, p99, avg) = calculate_percentiles(&data.latencies);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            connections_accepted: data.accepted,
            accept_errors: data.accept_errors,
            connections_rejected: data.rejected,
            connections_handled: data.handled,
            handler_panics: data.handler_panics,
            peak_queue_depth: data.peak_queue_depth,
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            latency_samples: data.latencies.len(),
        }
    }

    /// Snapshot en formato JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula percentiles de latencia
fn calculate_percentiles(latencies: &VecDeque<u64>) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted: Vec<u64> = latencies.iter().copied().collect();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];

    let sum: u64 = sorted.iter().sum();
    let avg = sum / len as u64;

    (p50, p95, p99, avg)
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections_accepted: u64,
    pub accept_errors: u64,
    pub connections_rejected: u64,
    pub connections_handled: u64,
    pub handler_panics: u64,
    pub peak_queue_depth: usize,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub latency_samples: usize,
}
