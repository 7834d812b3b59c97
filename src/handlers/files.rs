//! # Handler de Archivos Estáticos
//! src/handlers/files.rs
//!
//! Resuelve el path del request bajo un directorio raíz:
//!
//! - Archivo regular → 200 con su contenido y `Content-Type` por extensión
//! - Directorio con `index.html` → 200 con ese archivo
//! - Directorio sin `index.html` → 200 con un listado HTML
//! - Cualquier otra cosa → 404
//!
//! Ningún path puede salir de la raíz: segmentos `..` y symlinks que apuntan
//! afuera se responden con 403.

use super::{send_response, RequestHandler};
use crate::http::{read_head, Method, Request, Response, StatusCode};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Sirve archivos desde un directorio raíz fijo
#[derive(Debug, Clone)]
pub struct FileHandler {
    /// Raíz canónica (absoluta, sin symlinks)
    root: PathBuf,
}

/// Resultado de mapear un path del request al sistema de archivos
#[derive(Debug, PartialEq, Eq)]
enum Resolved {
    File(PathBuf),
    Directory(PathBuf),
    NotFound,
    Forbidden,
}

impl FileHandler {
    /// Crea el handler; la raíz debe existir y ser un directorio
    pub fn new(root: &Path) -> io::Result<Self> {
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} no es un directorio", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atiende un request completo sobre cualquier stream
    pub fn serve<S: Read + Write>(&self, stream: &mut S) {
        let head = match read_head(stream) {
            Ok(head) if head.is_empty() => return,
            Ok(head) => head,
            Err(e) => {
                debug!(error = %e, "error leyendo request");
                return;
            }
        };

        let request = match Request::parse(&head) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "request inválido");
                send_response(stream, Response::error(StatusCode::BadRequest, &e.to_string()));
                return;
            }
        };

        let response = self.respond(&request);
        let response = send_response(stream, response);

        info!(
            method = request.method().as_str(),
            path = request.path(),
            status = response.status().as_u16(),
            "request atendido"
        );
    }

    /// Construye la respuesta para un request ya parseado
    fn respond(&self, request: &Request) -> Response {
        let head_only = match request.method() {
            Method::GET => false,
            Method::HEAD => true,
            _ => {
                return Response::error(StatusCode::MethodNotAllowed, "Only GET and HEAD are allowed")
                    .with_header("Allow", "GET, HEAD");
            }
        };

        let Some(path) = request.decoded_path() else {
            return Response::error(StatusCode::BadRequest, "Malformed percent-encoding in path");
        };

        let response = match self.resolve(&path) {
            Resolved::File(file) => serve_file(&file),
            Resolved::Directory(dir) => {
                let index = dir.join("index.html");
                if index.is_file() {
                    serve_file(&index)
                } else {
                    self.serve_listing(&dir, &path)
                }
            }
            Resolved::NotFound => Response::error(StatusCode::NotFound, "Not found"),
            Resolved::Forbidden => Response::error(StatusCode::Forbidden, "Path outside of root"),
        };

        if head_only {
            response.into_head()
        } else {
            response
        }
    }

    /// Mapea un path decodificado (siempre empieza con `/`) bajo la raíz
    fn resolve(&self, path: &str) -> Resolved {
        let relative = Path::new(path.trim_start_matches('/'));

        let mut candidate = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => candidate.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Resolved::Forbidden;
                }
            }
        }

        // Resolver symlinks y confirmar que seguimos dentro de la raíz
        let canonical = match candidate.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => return Resolved::NotFound,
        };
        if !canonical.starts_with(&self.root) {
            return Resolved::Forbidden;
        }

        match fs::metadata(&canonical) {
            Ok(meta) if meta.is_dir() => Resolved::Directory(canonical),
            Ok(meta) if meta.is_file() => Resolved::File(canonical),
            _ => Resolved::NotFound,
        }
    }

    /// Listado HTML de un directorio sin `index.html`
    fn serve_listing(&self, dir: &Path, request_path: &str) -> Response {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "no se pudo listar el directorio");
                return Response::error(StatusCode::InternalServerError, "Cannot read directory");
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.path().is_dir() {
                    name.push('/');
                }
                name
            })
            .collect();
        names.sort();

        let base = if request_path.ends_with('/') {
            request_path.to_string()
        } else {
            format!("{}/", request_path)
        };

        let mut body = String::new();
        body.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">");
        body.push_str(&format!("<title>Index of {}</title></head>\n", escape_html(&base)));
        body.push_str(&format!("<body>\n<h1>Index of {}</h1>\n<ul>\n", escape_html(&base)));

        if dir != self.root {
            body.push_str(&format!(
                "<li><a href=\"{}\">Parent directory</a></li>\n",
                escape_html(&encode_path(&parent_of(&base)))
            ));
        }

        for name in &names {
            let href = encode_path(&format!("{}{}", base, name));
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                escape_html(&href),
                escape_html(name)
            ));
        }

        body.push_str("</ul>\n</body>\n</html>\n");

        Response::html(&body)
    }
}

impl<S: Read + Write> RequestHandler<S> for FileHandler {
    fn handle(&self, conn: &mut S) {
        self.serve(conn);
    }
}

fn serve_file(path: &Path) -> Response {
    match fs::read(path) {
        Ok(contents) => Response::new(StatusCode::Ok)
            .with_header("Content-Type", mime_type(path))
            .with_body_bytes(contents),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no se pudo leer el archivo");
            Response::error(StatusCode::InternalServerError, "Cannot read file")
        }
    }
}

/// Tipo MIME según la extensión
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        _ => "text/plain",
    }
}

/// `/a/b/` → `/a/`, `/a/` → `/`
fn parent_of(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => "/".to_string(),
    }
}

/// Codifica con `%XX` todo byte que no sea unreserved ni `/`
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
