//! # Módulo HTTP
//!
//! Frontera HTTP/1.0 que usan los handlers. No implementa keep-alive,
//! chunked encoding ni pipelining: una conexión, un request, una respuesta.
//!
//! - Lectura de la cabecera del request desde el socket
//! - Parsing de la request line y headers
//! - Construcción de responses
//! - Códigos de estado
//!
//! ### Formato de Request
//!
//! ```text
//! GET /path?query=value HTTP/1.0\r\n
//! Header-Name: Header-Value\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 5\r\n
//! \r\n
//! hello
//! ```

pub mod request;
pub mod response;
pub mod status;

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{read_head, Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
