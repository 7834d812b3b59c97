//! Tests de integración del servidor completo
//! tests/integration_test.rs
//!
//! Cada test levanta su propio servidor en 127.0.0.1 con puerto efímero,
//! habla con él por TCP real y lo apaga con `ShutdownHandle`.

use pool_server::config::{Config, QueuePolicy};
use pool_server::error::ServerError;
use pool_server::handlers::{build_handler, RequestHandler};
use pool_server::server::{Server, ShutdownHandle};
use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: thread::JoinHandle<Result<(), ServerError>>,
}

impl Running {
    fn stop(self) {
        self.shutdown.trigger();
        let result = self.thread.join().expect("server thread panicked");
        assert!(result.is_ok(), "serve_forever failed: {:?}", result);
    }
}

fn local_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.num_threads = 4;
    config
}

fn start(config: Config, handler: Arc<dyn RequestHandler>) -> Running {
    let server = Server::bind(config).expect("bind");
    let addr = server.local_addr();
    let shutdown = server.shutdown_handle();
    let thread = thread::spawn(move || server.serve_forever(handler));

    Running {
        addr,
        shutdown,
        thread,
    }
}

fn start_from_config(config: Config) -> Running {
    let handler = build_handler(&config).expect("handler");
    start(config, handler)
}

/// Envía un request crudo y lee la respuesta hasta el cierre
fn send_raw(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn get(addr: SocketAddr, path: &str) -> String {
    send_raw(addr, &format!("GET {} HTTP/1.0\r\n\r\n", path))
}

fn body(response: &str) -> &str {
    match response.find("\r\n\r\n") {
        Some(pos) => &response[pos + 4..],
        None => "",
    }
}

fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "hello").unwrap();
    fs::create_dir(dir.path().join("pub")).unwrap();
    fs::write(dir.path().join("pub").join("notes.txt"), "notes").unwrap();
    dir
}

fn files_config(dir: &TempDir) -> Config {
    let mut config = local_config();
    config.files = Some(dir.path().to_path_buf());
    config
}

#[test]
fn test_files_index_and_missing() {
    let dir = site();
    let server = start_from_config(files_config(&dir));

    let response = get(server.addr, "/");
    assert!(response.starts_with("HTTP/1.0 200 OK"), "got: {}", response);
    assert_eq!(body(&response), "hello");

    let response = get(server.addr, "/missing");
    assert!(response.starts_with("HTTP/1.0 404"), "got: {}", response);

    server.stop();
}

#[test]
fn test_files_listing_and_plain_file() {
    let dir = site();
    let server = start_from_config(files_config(&dir));

    let listing = get(server.addr, "/pub/");
    assert!(listing.starts_with("HTTP/1.0 200 OK"));
    assert!(listing.contains("href=\"/pub/notes.txt\""));

    let file = get(server.addr, "/pub/notes.txt");
    assert!(file.contains("Content-Type: text/plain"));
    assert_eq!(body(&file), "notes");

    server.stop();
}

#[test]
fn test_files_traversal_rejected() {
    let dir = site();
    let server = start_from_config(files_config(&dir));

    let response = get(server.addr, "/../../etc/passwd");
    assert!(response.starts_with("HTTP/1.0 403"), "got: {}", response);

    server.stop();
}

#[test]
fn test_concurrent_requests() {
    let dir = site();
    let server = start_from_config(files_config(&dir));
    let addr = server.addr;

    let clients: Vec<_> = (0..20)
        .map(|_| thread::spawn(move || get(addr, "/")))
        .collect();

    for client in clients {
        let response = client.join().unwrap();
        assert_eq!(body(&response), "hello");
    }

    server.stop();
}

#[test]
fn test_proxy_unreachable_upstream() {
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut config = local_config();
    config.proxy = Some(format!("127.0.0.1:{}", closed_port));
    let server = start_from_config(config);

    let response = get(server.addr, "/");
    assert!(response.starts_with("HTTP/1.0 502 Bad Gateway"), "got: {}", response);

    // El worker sigue vivo después del 502
    let response = get(server.addr, "/again");
    assert!(response.starts_with("HTTP/1.0 502 Bad Gateway"));

    server.stop();
}

#[test]
fn test_proxy_relays_to_upstream() {
    let upstream = TcpListener::bind("127.0.0.1:0").unwrap();
    let upstream_addr = upstream.local_addr().unwrap();

    let fake_upstream = thread::spawn(move || {
        let (mut conn, _) = upstream.accept().unwrap();
        let mut request = Vec::new();
        conn.read_to_end(&mut request).unwrap();
        let reply = format!("HTTP/1.0 200 OK\r\n\r\nseen {} bytes", request.len());
        conn.write_all(reply.as_bytes()).unwrap();
    });

    let mut config = local_config();
    config.proxy = Some(upstream_addr.to_string());
    let server = start_from_config(config);

    let request = "GET /x HTTP/1.0\r\n\r\n";
    let mut client = TcpStream::connect(server.addr).unwrap();
    client.write_all(request.as_bytes()).unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    let mut response = String::new();
    client.read_to_string(&mut response).unwrap();
    assert_eq!(
        response,
        format!("HTTP/1.0 200 OK\r\n\r\nseen {} bytes", request.len())
    );

    fake_upstream.join().unwrap();
    server.stop();
}

#[test]
fn test_reject_policy_answers_503() {
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    // Ocupa al único worker hasta que el test lo libere
    let handler = move |conn: &mut TcpStream| {
        let _ = started_tx.lock().unwrap().send(());
        let _ = release_rx.lock().unwrap().recv();
        let _ = conn.write_all(b"HTTP/1.0 200 OK\r\n\r\ndone");
    };

    let mut config = local_config();
    config.num_threads = 1;
    config.queue_capacity = 1;
    config.queue_policy = QueuePolicy::Reject;
    let server = start(config, Arc::new(handler));

    let mut busy = TcpStream::connect(server.addr).unwrap();
    started_rx.recv().unwrap();

    // Entra a la cola
    let mut queued = TcpStream::connect(server.addr).unwrap();
    // No hay lugar: 503 inmediato
    let mut rejected = TcpStream::connect(server.addr).unwrap();

    let mut response = String::new();
    rejected.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.0 503 Service Unavailable"), "got: {}", response);
    assert!(response.contains("Retry-After: 1"));

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();

    let mut response = String::new();
    busy.read_to_string(&mut response).unwrap();
    assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\ndone");

    let mut response = String::new();
    queued.read_to_string(&mut response).unwrap();
    assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\ndone");

    server.stop();
}

#[test]
fn test_queued_connections_get_503_on_shutdown() {
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let handler = move |conn: &mut TcpStream| {
        let _ = started_tx.lock().unwrap().send(());
        let _ = release_rx.lock().unwrap().recv();
        let _ = conn.write_all(b"HTTP/1.0 200 OK\r\n\r\ndone");
    };

    let mut config = local_config();
    config.num_threads = 1;
    let server = Server::bind(config).expect("bind");
    let addr = server.local_addr();
    let shutdown = server.shutdown_handle();
    let metrics = server.metrics().clone();
    let served = thread::spawn(move || server.serve_forever(Arc::new(handler)));

    let mut busy = TcpStream::connect(addr).unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let queued: Vec<TcpStream> = (0..2).map(|_| TcpStream::connect(addr).unwrap()).collect();

    // Esperar a que ambas estén en la cola antes de apagar
    let mut waited = Duration::ZERO;
    while metrics.snapshot().connections_accepted < 3 {
        assert!(waited < Duration::from_secs(5), "queued connections never accepted");
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    shutdown.trigger();

    // Las pendientes reciben 503 mientras el worker sigue ocupado
    for mut stream in queued {
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(
            response.starts_with("HTTP/1.0 503 Service Unavailable"),
            "got: {:?}",
            response
        );
        assert_eq!(response.matches("HTTP/1.0").count(), 1);
    }

    drop(release_tx);
    let mut response = String::new();
    busy.read_to_string(&mut response).unwrap();
    assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\ndone");

    served.join().unwrap().unwrap();
    assert!(metrics.snapshot().connections_rejected >= 2);
}

#[test]
fn test_shutdown_returns_ok_and_closes_listener() {
    let dir = site();
    let server = start_from_config(files_config(&dir));
    let addr = server.addr;

    assert!(get(addr, "/").starts_with("HTTP/1.0 200 OK"));
    server.stop();

    // El listener se cerró junto con el servidor
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_bind_conflict_is_error() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = local_config();
    config.port = taken.local_addr().unwrap().port();

    assert!(matches!(Server::bind(config), Err(ServerError::Bind { .. })));
}
