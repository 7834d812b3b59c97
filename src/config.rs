//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración por argumentos CLI y variables de entorno. Se elige
//! exactamente un modo de atención, una sola vez al arrancar:
//!
//! ### Archivos estáticos
//! ```bash
//! ./pool_server --files www/ --port 8000 --num-threads 5
//! ```
//!
//! ### Proxy
//! ```bash
//! ./pool_server --proxy inst.eecs.berkeley.edu:80 --port 8000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8000 NUM_THREADS=8 FILES_DIR=./www ./pool_server
//! ```

use crate::queue::Backpressure;
use clap::{ArgGroup, Parser, ValueEnum};
use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;

/// Puerto del upstream cuando `--proxy` no lo indica
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// Qué hacer cuando la cola de conexiones se llena
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueuePolicy {
    /// El acceptor espera a que un worker libere lugar
    Block,

    /// Se responde 503 y se cierra la conexión
    Reject,
}

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "pool_server")]
#[command(about = "Servidor HTTP/1.0 con pool fijo de workers: archivos estáticos o proxy")]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).args(["files", "proxy"])))]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "8000", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha (por defecto todas las interfaces)
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Número de workers del pool
    #[arg(short = 'n', long = "num-threads", default_value = "5", env = "NUM_THREADS")]
    pub num_threads: usize,

    /// Directorio raíz a servir (modo archivos)
    #[arg(long, value_name = "DIR", env = "FILES_DIR")]
    pub files: Option<PathBuf>,

    /// Upstream HOST[:PORT] al que reenviar (modo proxy)
    #[arg(long, value_name = "HOST[:PORT]", env = "PROXY_TARGET")]
    pub proxy: Option<String>,

    /// Backlog del socket de escucha
    #[arg(long, default_value = "1024", env = "LISTEN_BACKLOG")]
    pub backlog: i32,

    // === Cola ===
    /// Capacidad de la cola de conexiones (0 = sin límite)
    #[arg(long = "queue-capacity", default_value = "0", env = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Política cuando la cola está llena (solo con capacidad > 0)
    #[arg(long = "queue-policy", value_enum, default_value = "block", env = "QUEUE_POLICY")]
    pub queue_policy: QueuePolicy,

    // === Proxy ===
    /// Tiempo máximo para conectar con el upstream, en milisegundos
    #[arg(
        long = "proxy-connect-timeout-ms",
        default_value = "5000",
        env = "PROXY_CONNECT_TIMEOUT_MS"
    )]
    pub proxy_connect_timeout_ms: u64,

    /// Filtro de logs cuando RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

/// Variante de handler seleccionada
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerMode {
    Files { root: PathBuf },
    Proxy(ProxyTarget),
}

/// Destino del proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
}

impl ProxyTarget {
    /// Parsea `HOST[:PORT]` o `[IPV6][:PORT]`; sin puerto se usa el 80
    ///
    /// Una IPv6 sin corchetes (`::1`) se toma entera como host.
    ///
    /// # Ejemplo
    /// ```
    /// use pool_server::config::ProxyTarget;
    ///
    /// let target = ProxyTarget::parse("example.com:8080").unwrap();
    /// assert_eq!(target.port, 8080);
    /// assert_eq!(ProxyTarget::parse("example.com").unwrap().port, 80);
    /// assert_eq!(ProxyTarget::parse("[::1]:8080").unwrap().host, "::1");
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| format!("Missing ']' in proxy target '{}'", s))?;
            let port = match after {
                "" => DEFAULT_PROXY_PORT,
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| format!("Invalid proxy target '{}'", s))?;
                    parse_port(port, s)?
                }
            };
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(format!("Invalid IPv6 address in '{}'", s));
            }
            (host, port)
        } else if s.parse::<Ipv6Addr>().is_ok() {
            (s, DEFAULT_PROXY_PORT)
        } else {
            match s.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => {
                    return Err(format!("IPv6 proxy targets need brackets: '[host]:port', got '{}'", s));
                }
                Some((host, port)) => (host, parse_port(port, s)?),
                None => (s, DEFAULT_PROXY_PORT),
            }
        };

        if host.is_empty() {
            return Err(format!("Missing proxy host in '{}'", s));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(port: &str, target: &str) -> Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("Invalid proxy port in '{}'", target))
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use pool_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:8000");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.num_threads == 0 {
            return Err("Number of threads must be >= 1".to_string());
        }

        if self.backlog < 1 {
            return Err("Listen backlog must be >= 1".to_string());
        }

        if self.proxy_connect_timeout_ms == 0 {
            return Err("Proxy connect timeout must be > 0".to_string());
        }

        self.handler_mode().map(|_| ())
    }

    /// Modo de atención seleccionado
    pub fn handler_mode(&self) -> Result<HandlerMode, String> {
        match (&self.files, &self.proxy) {
            (Some(root), None) => Ok(HandlerMode::Files { root: root.clone() }),
            (None, Some(target)) => Ok(HandlerMode::Proxy(ProxyTarget::parse(target)?)),
            (Some(_), Some(_)) => Err("Specify only one of --files or --proxy".to_string()),
            (None, None) => Err("Specify either --files DIR or --proxy HOST[:PORT]".to_string()),
        }
    }

    /// Política de la cola según capacidad y política configuradas
    pub fn backpressure(&self) -> Backpressure {
        match (self.queue_capacity, self.queue_policy) {
            (0, _) => Backpressure::Unbounded,
            (cap, QueuePolicy::Block) => Backpressure::Block(cap),
            (cap, QueuePolicy::Reject) => Backpressure::Reject(cap),
        }
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║              Pool Server HTTP/1.0 Configuration             ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Backlog:      {}", self.backlog);
        println!();
        println!("👷 Workers & Queue:");
        println!("   Workers:      {}", self.num_threads);
        match self.backpressure() {
            Backpressure::Unbounded => println!("   Queue:        unbounded"),
            Backpressure::Block(cap) => println!("   Queue:        {} (block when full)", cap),
            Backpressure::Reject(cap) => println!("   Queue:        {} (503 when full)", cap),
        }
        println!();
        println!("📦 Mode:");
        match self.handler_mode() {
            Ok(HandlerMode::Files { root }) => println!("   Files:        {}", root.display()),
            Ok(HandlerMode::Proxy(target)) => {
                println!("   Proxy:        {}", target);
                println!("   Connect:      {} ms", self.proxy_connect_timeout_ms);
            }
            Err(e) => println!("   Invalid:      {}", e),
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto (sin modo seleccionado)
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            num_threads: 5,
            files: None,
            proxy: None,
            backlog: 1024,
            queue_capacity: 0,
            queue_policy: QueuePolicy::Block,
            proxy_connect_timeout_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_config() -> Config {
        let mut config = Config::default();
        config.files = Some(PathBuf::from("./www"));
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.num_threads, 5);
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.backpressure(), Backpressure::Unbounded);
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_validate_success() {
        assert!(files_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_a_mode() {
        let result = Config::default().validate();
        assert!(result.unwrap_err().contains("--files"));
    }

    #[test]
    fn test_validate_rejects_both_modes() {
        let mut config = files_config();
        config.proxy = Some("example.com".to_string());
        assert!(config.validate().unwrap_err().contains("only one"));
    }

    #[test]
    fn test_validate_invalid_threads() {
        let mut config = files_config();
        config.num_threads = 0;
        assert!(config.validate().unwrap_err().contains("threads"));
    }

    #[test]
    fn test_validate_invalid_backlog() {
        let mut config = files_config();
        config.backlog = 0;
        assert!(config.validate().unwrap_err().contains("backlog"));
    }

    #[test]
    fn test_validate_invalid_proxy_timeout() {
        let mut config = files_config();
        config.proxy_connect_timeout_ms = 0;
        assert!(config.validate().unwrap_err().contains("timeout"));
    }

    #[test]
    fn test_handler_mode_files() {
        let mode = files_config().handler_mode().unwrap();
        assert_eq!(
            mode,
            HandlerMode::Files {
                root: PathBuf::from("./www")
            }
        );
    }

    #[test]
    fn test_handler_mode_proxy() {
        let mut config = Config::default();
        config.proxy = Some("inst.eecs.berkeley.edu:8080".to_string());

        match config.handler_mode().unwrap() {
            HandlerMode::Proxy(target) => {
                assert_eq!(target.host, "inst.eecs.berkeley.edu");
                assert_eq!(target.port, 8080);
                assert_eq!(target.to_string(), "inst.eecs.berkeley.edu:8080");
            }
            other => panic!("expected proxy mode, got {:?}", other),
        }
    }

    #[test]
    fn test_proxy_target_default_port() {
        let target = ProxyTarget::parse("localhost").unwrap();
        assert_eq!(target.port, DEFAULT_PROXY_PORT);
    }

    #[test]
    fn test_proxy_target_ipv6() {
        let target = ProxyTarget::parse("[::1]:8080").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 8080);
        assert_eq!(target.to_string(), "[::1]:8080");

        let target = ProxyTarget::parse("[::1]").unwrap();
        assert_eq!(target.port, DEFAULT_PROXY_PORT);

        let target = ProxyTarget::parse("::1").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, DEFAULT_PROXY_PORT);

        assert!(ProxyTarget::parse("[::1").is_err());
        assert!(ProxyTarget::parse("[::1]8080").is_err());
        assert!(ProxyTarget::parse("[nope]:80").is_err());
        assert!(ProxyTarget::parse("fe80::1::x:80").is_err());
    }

    #[test]
    fn test_proxy_target_invalid() {
        assert!(ProxyTarget::parse("localhost:http").is_err());
        assert!(ProxyTarget::parse("localhost:70000").is_err());
        assert!(ProxyTarget::parse(":80").is_err());
    }

    #[test]
    fn test_backpressure_mapping() {
        let mut config = files_config();
        config.queue_capacity = 16;
        assert_eq!(config.backpressure(), Backpressure::Block(16));

        config.queue_policy = QueuePolicy::Reject;
        assert_eq!(config.backpressure(), Backpressure::Reject(16));

        config.queue_capacity = 0;
        assert_eq!(config.backpressure(), Backpressure::Unbounded);
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "pool_server",
            "--files",
            "www",
            "--port",
            "9000",
            "--num-threads",
            "3",
            "--queue-capacity",
            "10",
            "--queue-policy",
            "reject",
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.files, Some(PathBuf::from("www")));
        assert_eq!(config.backpressure(), Backpressure::Reject(10));
    }

    #[test]
    fn test_cli_requires_exactly_one_mode() {
        assert!(Config::try_parse_from(["pool_server", "--port", "9000"]).is_err());
        assert!(Config::try_parse_from([
            "pool_server",
            "--files",
            "www",
            "--proxy",
            "localhost:80"
        ])
        .is_err());
    }

    #[test]
    fn test_config_print_summary() {
        // No debe entrar en pánico, ni siquiera sin modo válido
        files_config().print_summary();
        Config::default().print_summary();
    }
}
