//! # Construcción de Respuestas HTTP
//!
//! API para construir respuestas HTTP/1.0 y convertirlas a bytes.
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 5\r\n
//! \r\n
//! hello
//! ```

use super::StatusCode;
use std::collections::HashMap;

/// Representa una respuesta HTTP/1.0 completa
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,

    /// Usamos HashMap para evitar duplicados
    headers: HashMap<String, String>,

    body: Vec<u8>,
}

impl Response {
    /// Crea una nueva respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Agrega un header (si ya existe, se sobrescribe)
    ///
    /// # Ejemplo
    /// ```
    /// use pool_server::http::{Response, StatusCode};
    ///
    /// let response = Response::new(StatusCode::Ok)
    ///     .with_header("Content-Type", "text/plain");
    /// assert_eq!(response.header("Content-Type"), Some("text/plain"));
    /// ```
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega un header a una respuesta existente (versión mutable)
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Establece el cuerpo desde un string y actualiza `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el cuerpo desde bytes (archivos binarios)
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self.headers
            .insert("Content-Length".to_string(), self.body.len().to_string());
        self
    }

    /// Respuesta HTML exitosa (200 OK)
    pub fn html(body: &str) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", "text/html")
            .with_body(body)
    }

    /// Crea una respuesta de error con mensaje JSON
    ///
    /// Formato del JSON: `{"error": "mensaje", "status": 404}`
    ///
    /// # Ejemplo
    /// ```
    /// use pool_server::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, "no \"such\" file");
    /// let body = String::from_utf8(response.body().to_vec()).unwrap();
    /// assert!(body.contains(r#"no \"such\" file"#));
    /// ```
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(&body.to_string())
    }

    /// Quita el body pero conserva `Content-Length` (respuestas a HEAD)
    pub fn into_head(mut self) -> Self {
        self.body.clear();
        self
    }

    /// Convierte la respuesta a bytes listos para enviar por el socket
    ///
    /// - Status line: `HTTP/1.0 200 OK\r\n`
    /// - Headers: `Header-Name: Value\r\n`
    /// - Línea vacía: `\r\n`
    /// - Body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(128 + self.body.len());

        result.extend_from_slice(format!("HTTP/1.0 {}\r\n", self.status).as_bytes());

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        result.extend_from_slice(b"\r\n");
        result.extend_from_slice(&self.body);

        result
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Obtiene un header específico
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
