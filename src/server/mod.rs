//! Development server
//!
//! Provides a local development server with:
//! - Static file serving from the configured directory
//! - WebSocket-based live reload, fed by the watch task

mod reload;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use walkdir::WalkDir;

use crate::config::Config;
use crate::utils::{is_subpath, relative_path};

pub use reload::{inject_client, ReloadMessage, RELOAD_ROUTE};

/// Shared server state
struct ServerState {
    /// Directory files are served from
    serve_dir: PathBuf,

    /// Where bundles are written, listed on the default index
    output_dir: PathBuf,

    title: String,

    reload_tx: broadcast::Sender<ReloadMessage>,

    live_reload: bool,
}

/// Development server options
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
    pub live_reload: bool,
}

impl DevServerOptions {
    pub fn from_config(config: &Config) -> Self {
        let dev = &config.build.dev;
        Self {
            host: dev.host.clone(),
            port: dev.port,
            live_reload: dev.live_reload,
        }
    }
}

/// Development server
pub struct DevServer {
    config: Arc<Config>,

    options: DevServerOptions,

    reload_tx: broadcast::Sender<ReloadMessage>,
}

impl DevServer {
    /// Create a server that forwards `reload_tx` messages to its pages
    pub fn new(
        config: Arc<Config>,
        options: DevServerOptions,
        reload_tx: broadcast::Sender<ReloadMessage>,
    ) -> Self {
        Self {
            config,
            options,
            reload_tx,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.options.host, self.options.port)
    }

    /// Routes of the dev server
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            serve_dir: self.config.root.join(&self.config.build.dev.serve_dir),
            output_dir: self.config.output_dir(),
            title: self.config.display_name(false),
            reload_tx: self.reload_tx.clone(),
            live_reload: self.options.live_reload,
        });

        Router::new()
            .route("/", get(serve_index))
            .route(RELOAD_ROUTE, get(reload::reload_websocket))
            .route("/*path", get(serve_file))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Start the development server; runs until the process exits
    pub async fn start(&self) -> Result<()> {
        let addr = self.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let local: SocketAddr = listener.local_addr()?;

        info!("Server listening on http://{}", local);
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Serve `index.html` from the serve directory, or a generated listing
async fn serve_index(State(state): State<Arc<ServerState>>) -> Response {
    let index_path = state.serve_dir.join("index.html");

    if index_path.is_file() {
        match std::fs::read_to_string(&index_path) {
            Ok(content) => Html(with_client(&state, content)).into_response(),
            Err(e) => {
                error!("Failed to read index.html: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read index.html").into_response()
            }
        }
    } else {
        let html = generate_default_index(&state.title, &state.serve_dir, &state.output_dir);
        Html(with_client(&state, html)).into_response()
    }
}

/// Serve static files
async fn serve_file(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(path): axum::extract::Path<String>,
) -> Response {
    let file_path = state.serve_dir.join(&path);

    if !file_path.is_file() || !is_subpath(&file_path, &state.serve_dir) {
        return (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response();
    }

    let content_type = get_content_type(&file_path);

    if content_type.starts_with("text/html") {
        return match std::fs::read_to_string(&file_path) {
            Ok(content) => Html(with_client(&state, content)).into_response(),
            Err(e) => {
                error!("Failed to read file {}: {}", path, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
            }
        };
    }

    match std::fs::read(&file_path) {
        Ok(content) => {
            let mut response = content.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            response
        }
        Err(e) => {
            error!("Failed to read file {}: {}", path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

fn with_client(state: &ServerState, html: String) -> String {
    if state.live_reload {
        inject_client(&html)
    } else {
        html
    }
}

/// Get content type for a file
fn get_content_type(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" | "cjs" => "application/javascript; charset=utf-8",
        "map" | "json" => "application/json; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// A page linking every built artifact
fn generate_default_index(title: &str, serve_dir: &Path, output_dir: &Path) -> String {
    let mut artifacts: Vec<String> = WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("js"))
        .filter_map(|e| relative_path(serve_dir, e.path()))
        .collect();
    artifacts.sort();

    let items = if artifacts.is_empty() {
        "    <li>No artifacts built yet</li>\n".to_string()
    } else {
        artifacts
            .iter()
            .map(|a| format!("    <li><a href=\"/{0}\">{0}</a></li>\n", a))
            .collect()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>{}</title>
  </head>
  <body>
    <ul>
{}    </ul>
  </body>
</html>
"#,
        title, items
    )
}
