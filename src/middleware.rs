use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use percent_encoding::percent_decode_str;
use tokio::fs;

/// Access-log decorator for [`axum::middleware::from_fn`].
///
/// Runs the inner handler, then logs the client IP, method and URL of the request.
/// An `X-Real-IP` header overrides the connection's remote address, so the log stays
/// meaningful behind a reverse proxy.
pub async fn logging_middleware(req: Request<Body>, next: Next<Body>) -> impl IntoResponse {
    let ip = client_ip(&req);
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    tracing::info!("[http] {} {} {}", ip, method, uri);
    response
}

fn client_ip<B>(req: &Request<B>) -> String {
    if let Some(real_ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        return real_ip.to_owned();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Catch-all static-file handler with single-page-app fallback, resolving against the
/// current working directory.
///
/// Mount it as a router fallback:
///
/// ```
/// # fn main() {}
/// use axum::handler::Handler;
/// use axum::Router;
///
/// use service_kit::spa_handler;
///
/// fn router() -> Router {
///     Router::new().fallback(spa_handler.into_service())
/// }
/// ```
pub async fn spa_handler(req: Request<Body>) -> Response<Body> {
    serve_spa(Path::new("."), req.uri().path()).await
}

/// Resolves `request_path` against `root` and serves the matching file.
///
/// Resolution order, first match wins:
/// 1. the root path serves `index.html`, or `default.html` if there is none
/// 2. `<path>.html`, unless the path is literally `index`
/// 3. a directory serves its `index.html`, or `default.html` if there is none
/// 4. a plain file is served as-is
///
/// Anything that does not exist falls back to `default.html`, the app shell, so a
/// client-side router can take over. Paths that cannot be resolved are a 400;
/// filesystem errors other than "not found" are a 500.
pub async fn serve_spa(root: &Path, request_path: &str) -> Response<Body> {
    let rel = match resolve_request_path(request_path) {
        Some(rel) => rel,
        None => return error_response(StatusCode::BAD_REQUEST, "invalid request path"),
    };

    if rel.as_os_str().is_empty() {
        // handle root
        let index = root.join("index.html");
        if fs::metadata(&index).await.is_ok() {
            tracing::debug!("path {} handle root index", request_path);
            return serve_file(&index).await;
        }
        return serve_file(&root.join("default.html")).await;
    }

    let path = root.join(&rel);

    // implicit .html extension, except for the literal path "index"
    let mut with_ext = path.clone().into_os_string();
    with_ext.push(".html");
    let with_ext = PathBuf::from(with_ext);
    if rel != Path::new("index") && fs::metadata(&with_ext).await.is_ok() {
        return serve_file(&with_ext).await;
    }

    match fs::metadata(&path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("path {} handle default", request_path);
            serve_file(&root.join("default.html")).await
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        Ok(meta) if meta.is_dir() => {
            let index = path.join("index.html");
            if fs::metadata(&index).await.is_ok() {
                serve_file(&index).await
            } else {
                tracing::debug!("path {} handle dir default", request_path);
                serve_file(&root.join("default.html")).await
            }
        }
        Ok(_) => serve_file(&path).await,
    }
}

/// Canonicalizes a request path to a working-directory-relative path: percent-decodes
/// it, then resolves `..` lexically so the result can never escape the root.
fn resolve_request_path(request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }
    let mut resolved = PathBuf::new();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::CurDir => {}
            Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

async fn serve_file(path: &Path) -> Response<Body> {
    match fs::read(path).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            let mut response = Response::new(Body::from(contents));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(mime.as_ref())
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            response
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "file not found")
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;
    response
}
