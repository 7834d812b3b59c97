//! # Códigos de Estado HTTP
//!
//! Códigos HTTP/1.0 que producen los handlers:
//!
//! - **2xx**: Éxito (200 OK)
//! - **4xx**: Error del cliente (400, 403, 404, 405)
//! - **5xx**: Error del servidor (500, 502, 503)

/// Representa los códigos de estado HTTP que soporta nuestro servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK - La petición fue exitosa
    Ok = 200,

    /// 400 Bad Request - Request malformado
    BadRequest = 400,

    /// 403 Forbidden - El path sale del directorio raíz
    Forbidden = 403,

    /// 404 Not Found - Archivo o directorio inexistente
    NotFound = 404,

    /// 405 Method Not Allowed - Solo se sirven GET y HEAD
    MethodNotAllowed = 405,

    /// 500 Internal Server Error - Error leyendo el archivo
    InternalServerError = 500,

    /// 502 Bad Gateway - No se pudo conectar con el upstream
    BadGateway = 502,

    /// 503 Service Unavailable - Cola llena o servidor deteniéndose
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use pool_server::http::StatusCode;
    /// assert_eq!(StatusCode::BadGateway.as_u16(), 502);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_values() {
        assert_eq!(StatusCode::Ok.as_u16(), 200);
        assert_eq!(StatusCode::Forbidden.as_u16(), 403);
        assert_eq!(StatusCode::NotFound.as_u16(), 404);
        assert_eq!(StatusCode::BadGateway.as_u16(), 502);
    }

    #[test]
    fn test_classification() {
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::MethodNotAllowed.is_client_error());
        assert!(!StatusCode::MethodNotAllowed.is_server_error());
        assert!(StatusCode::ServiceUnavailable.is_server_error());
        assert!(!StatusCode::BadGateway.is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        assert_eq!(StatusCode::BadGateway.to_string(), "502 Bad Gateway");
    }
}
