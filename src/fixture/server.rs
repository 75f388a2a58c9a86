use super::EchoResponse;
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::eyre;
use serde_json::{json, Value};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

type Result<T> = color_eyre::eyre::Result<T>;

/// Capabilities of the stub server
///
/// Health checking and CORS differ between the servers the harness is
/// pointed at, so both are switchable here.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bind IPv6 and accept IPv4 on the same socket where the OS allows it
    pub ipv6: bool,
    /// Answer CORS preflights and add CORS headers
    pub cors: bool,
    /// Path of the health endpoint, `None` to serve none
    pub health_path: Option<String>,
    /// Log every handled request
    pub verbose: bool,
    /// Wait this long before binding
    pub startup_delay: Option<Duration>,
    /// Exit with an error this long after start, without ever binding
    pub crash_after: Option<Duration>,
    /// Keep running when interrupted
    pub ignore_interrupt: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            ipv6: false,
            cors: false,
            health_path: Some("/health".to_string()),
            verbose: false,
            startup_delay: None,
            crash_after: None,
            ignore_interrupt: false,
        }
    }
}

/// Route table of the stub server
pub fn router(config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/get", get(handle_get))
        .route("/post", post(handle_post));
    match health_route(config) {
        Some(path) if path == "/get" => {
            debug!("health path {} is served by the GET route", path)
        }
        Some(path) => router = router.route(&path, get(handle_health)),
        None => {}
    }
    router = router.fallback(handle_not_found);

    if config.verbose {
        router = router.layer(middleware::from_fn(log_request));
    }
    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

/// Health path with a leading `/`, as routes require
fn health_route(config: &ServerConfig) -> Option<String> {
    config.health_path.as_ref().map(|path| {
        if path.starts_with('/') {
            path.clone()
        } else {
            format!("/{path}")
        }
    })
}

async fn handle_get() -> Json<EchoResponse> {
    Json(EchoResponse {
        method: "GET".to_string(),
        path: "/get".to_string(),
        message: "GET request successful".to_string(),
        received_data: None,
    })
}

async fn handle_post(body: String) -> Json<EchoResponse> {
    let received = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_str::<Value>(&body).unwrap_or_else(|_| json!({ "raw": body }))
    };
    Json(EchoResponse {
        method: "POST".to_string(),
        path: "/post".to_string(),
        message: "POST request successful".to_string(),
        received_data: Some(received),
    })
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not Found", "path": uri.path() })),
    )
        .into_response()
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    info!(
        "HTTP Server: Handled {} request: {} ({})",
        method,
        path,
        response.status()
    );
    response
}

/// Binds the listening socket described by `config`
///
/// With `ipv6` set an IPv6 address is preferred and the socket is made
/// dual-stack; otherwise an IPv4 address is preferred.
pub async fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    let addresses: Vec<SocketAddr> = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await?
        .collect();
    let address = addresses
        .iter()
        .find(|address| address.is_ipv6() == config.ipv6)
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", config.host),
            )
        })?;

    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    if address.is_ipv6() {
        if let Err(e) = socket.set_only_v6(!config.ipv6) {
            warn!("could not configure dual-stack socket: {}", e);
        }
    }
    socket.set_reuse_address(true)?;
    socket.bind(&address.into())?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}

/// Serves the route table on `listener` until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, config: &ServerConfig, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Runs the stub server until it is interrupted
pub async fn run(config: ServerConfig) -> Result<()> {
    if let Some(delay) = config.crash_after {
        info!("HTTP Server: Simulating a crash in {:?}", delay);
        sleep(delay).await;
        error!("HTTP Server: Crashing before becoming ready");
        return Err(eyre!("simulated crash after {:?}", delay));
    }
    if let Some(delay) = config.startup_delay {
        info!("HTTP Server: Delaying startup by {:?}", delay);
        sleep(delay).await;
    }

    info!("HTTP Server: Starting on {}:{}", config.host, config.port);
    let listener = bind(&config).await?;
    info!(
        "HTTP Server: Ready to accept connections on {}",
        listener.local_addr()?
    );

    serve_on(listener, &config, interrupted(config.ignore_interrupt)).await?;
    info!("HTTP Server: Shutting down");
    Ok(())
}

/// Resolves on the first interrupt, or never when interrupts are ignored
async fn interrupted(ignore: bool) {
    if ignore {
        // Listening replaces the default action, so the process survives
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            warn!("HTTP Server: Ignoring interrupt");
        }
        std::future::pending::<()>().await;
    } else if let Err(e) = tokio::signal::ctrl_c().await {
        error!("HTTP Server: Failed to listen for interrupt: {}", e);
        std::future::pending::<()>().await;
    }
}
