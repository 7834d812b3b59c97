//! # Lectura y Parsing de Requests HTTP/1.0
//! src/http/request.rs
//!
//! ## Formato de un Request HTTP/1.0
//!
//! ```text
//! GET /docs/index.html?lang=es HTTP/1.0\r\n
//! Host: localhost:8000\r\n
//! User-Agent: curl/7.68.0\r\n
//! \r\n
//! ```
//!
//! 1. **Request Line**: `METHOD /path?query HTTP/1.0`
//! 2. **Headers**: Pares `Name: Value` (uno por línea)
//! 3. **Empty Line**: `\r\n` que separa headers del body

use std::collections::HashMap;
use std::io::{self, Read};

/// Tamaño máximo de la cabecera que se lee de un cliente
pub const MAX_HEAD_BYTES: usize = 8192;

/// Métodos HTTP reconocidos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
}

impl Method {
    fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "OPTIONS" => Ok(Method::OPTIONS),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
        }
    }
}

/// Representa un request HTTP/1.0 parseado
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,

    /// Path tal como llegó, sin query string (ej: "/docs/a%20b.txt")
    path: String,

    /// Query string cruda, si la hay
    query: Option<String>,

    headers: HashMap<String, String>,

    version: String,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line con formato inválido
    InvalidRequestLine,

    /// Método HTTP no soportado
    UnsupportedMethod(String),

    /// Versión HTTP incorrecta (debe ser HTTP/1.0 o HTTP/1.1)
    InvalidHttpVersion(String),

    /// El path no empieza con '/'
    InvalidPath(String),

    /// Header malformado
    InvalidHeader(String),

    /// Request vacío
    EmptyRequest,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidRequestLine => write!(f, "Invalid request line format"),
            ParseError::UnsupportedMethod(m) => write!(f, "Unsupported HTTP method: {}", m),
            ParseError::InvalidHttpVersion(v) => write!(f, "Invalid HTTP version: {}", v),
            ParseError::InvalidPath(p) => write!(f, "Invalid request path: {}", p),
            ParseError::InvalidHeader(h) => write!(f, "Invalid header: {}", h),
            ParseError::EmptyRequest => write!(f, "Empty request"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Lee la cabecera de un request (hasta `\r\n\r\n`)
///
/// Se detiene al encontrar la línea vacía, al llegar a `MAX_HEAD_BYTES` o
/// cuando el cliente cierra su lado. Retorna un buffer vacío si el cliente
/// cerró sin enviar nada.
pub fn read_head<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while head.len() < MAX_HEAD_BYTES {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // Solo hace falta revisar la zona donde pudo completarse el terminador
        let search_from = head.len().saturating_sub(3);
        head.extend_from_slice(&chunk[..n]);
        if find_subsequence(&head[search_from..], b"\r\n\r\n").is_some() {
            break;
        }
    }

    head.truncate(MAX_HEAD_BYTES);
    Ok(head)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Request {
    /// Parsea un request HTTP/1.0 desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use pool_server::http::Request;
    ///
    /// let raw = b"GET /docs/index.html?lang=es HTTP/1.0\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/docs/index.html");
    /// assert_eq!(request.query(), Some("lang=es"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let request_str =
            std::str::from_utf8(buffer).map_err(|_| ParseError::InvalidRequestLine)?;

        if request_str.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let lines: Vec<&str> = request_str.split("\r\n").collect();

        // 1. Request line
        let (method, path, query, version) = Self::parse_request_line(lines[0])?;

        // 2. Headers hasta la línea vacía
        let headers = Self::parse_headers(&lines[1..])?;

        Ok(Request {
            method,
            path,
            query,
            headers,
            version,
        })
    }

    /// Formato: `GET /path?query HTTP/1.0`
    fn parse_request_line(
        line: &str,
    ) -> Result<(Method, String, Option<String>, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD PATH VERSION
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::parse(parts[0])?;

        let target = parts[1];
        if !target.starts_with('/') {
            return Err(ParseError::InvalidPath(target.to_string()));
        }
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, path, query, version))
    }

    /// Cada header tiene formato: "Name: Value"
    fn parse_headers(lines: &[&str]) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        for line in lines {
            // La línea vacía marca el fin de los headers
            if line.trim().is_empty() {
                break;
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Path sin decodificar y sin query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path con las secuencias `%XX` decodificadas
    ///
    /// Retorna `None` si hay un escape inválido o el resultado no es UTF-8.
    pub fn decoded_path(&self) -> Option<String> {
        percent_decode(&self.path)
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Obtiene un header (el nombre no distingue mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Decodifica secuencias `%XX` de una URL
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.query(), None);
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[test]
    fn test_parse_strips_query() {
        let request = Request::parse(b"GET /index.html?v=2 HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.query(), Some("v=2"));
    }

    #[test]
    fn test_parse_with_headers_case_insensitive() {
        let raw = b"GET / HTTP/1.0\r\nHost: localhost:8000\r\nUser-Agent: test\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("Host"), Some("localhost:8000"));
        assert_eq!(request.header("user-agent"), Some("test"));
    }

    #[test]
    fn test_parse_head_method() {
        let request = Request::parse(b"HEAD /a HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.method(), Method::HEAD);
    }

    #[test]
    fn test_decoded_path() {
        let request = Request::parse(b"GET /my%20docs/caf%C3%A9.txt HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.decoded_path().as_deref(), Some("/my docs/café.txt"));
    }

    #[test]
    fn test_decoded_path_invalid_escape() {
        let request = Request::parse(b"GET /bad%zz HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.decoded_path(), None);

        let request = Request::parse(b"GET /trunc%4 HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.decoded_path(), None);
    }

    #[test]
    fn test_unsupported_method() {
        let result = Request::parse(b"BREW /pot HTTP/1.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::UnsupportedMethod(_))));
    }

    #[test]
    fn test_invalid_version() {
        let result = Request::parse(b"GET / HTTP/2.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHttpVersion(_))));
    }

    #[test]
    fn test_invalid_path() {
        let result = Request::parse(b"GET index.html HTTP/1.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));
    }

    #[test]
    fn test_invalid_header() {
        let result = Request::parse(b"GET / HTTP/1.0\r\nNoColonHere\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader(_))));
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(Request::parse(b""), Err(ParseError::EmptyRequest)));
    }

    #[test]
    fn test_invalid_request_line() {
        let result = Request::parse(b"GET\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidRequestLine)));
    }

    #[test]
    fn test_read_head_stops_at_blank_line() {
        let mut input = Cursor::new(b"GET / HTTP/1.0\r\nHost: x\r\n\r\nBODY".to_vec());
        let head = read_head(&mut input).unwrap();
        assert!(head.starts_with(b"GET / HTTP/1.0"));
        assert!(Request::parse(&head).is_ok());
    }

    #[test]
    fn test_read_head_handles_eof_and_empty() {
        let mut input = Cursor::new(Vec::new());
        assert!(read_head(&mut input).unwrap().is_empty());

        let mut input = Cursor::new(b"GET / HTTP/1.0\r\n".to_vec());
        assert_eq!(read_head(&mut input).unwrap(), b"GET / HTTP/1.0\r\n");
    }

    #[test]
    fn test_read_head_is_bounded() {
        let mut input = Cursor::new(vec![b'a'; MAX_HEAD_BYTES * 3]);
        let head = read_head(&mut input).unwrap();
        assert_eq!(head.len(), MAX_HEAD_BYTES);
    }
}
