//! # Pool Server - Entry Point
//! src/main.rs
//!
//! Arranque: configuración → logging → handler → bind → señales → serve.
//! SIGINT/SIGTERM piden el apagado ordenado.

use clap::Parser;
use pool_server::config::Config;
use pool_server::handlers::build_handler;
use pool_server::server::{Server, ShutdownHandle};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    let config = Config::parse();

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("💥 No se pudo inicializar el logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "configuración inválida");
        process::exit(1);
    }

    config.print_summary();

    let handler = match build_handler(&config) {
        Ok(handler) => handler,
        Err(e) => {
            error!(error = %e, "no se pudo crear el handler");
            process::exit(1);
        }
    };

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "error fatal al abrir el socket");
            process::exit(1);
        }
    };

    install_signal_handler(server.shutdown_handle());

    if let Err(e) = server.serve_forever(handler) {
        error!(error = %e, "el servidor terminó con error");
        process::exit(1);
    }

    info!("hasta luego");
}

/// `RUST_LOG` tiene prioridad sobre `--log-level`
fn init_logging(level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| format!("filtro de logs inválido '{}': {}", level, e))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("no se pudo instalar el subscriber: {}", e))
}

fn install_signal_handler(shutdown: ShutdownHandle) {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "no se pudieron registrar las señales; Ctrl+C terminará sin apagado ordenado");
            return;
        }
    };

    let spawned = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "señal recibida, apagando");
                shutdown.trigger();
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "no se pudo crear el thread de señales");
    }
}
