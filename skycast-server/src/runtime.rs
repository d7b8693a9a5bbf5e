use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use skycast_cache::FileCache;
use skycast_core::SourceFactory;
use skycast_sources::{FeedRegistry, HttpUpstream, SourceContext, StationTable};

use crate::config::ServerConfig;
use crate::connection::{Connection, Flow};
use crate::error::{io_err, ServerError};
use crate::outbox::{Frame, Outbox, Outgoing};
use crate::stats::{Shared, StatusSnapshot};
use crate::timer::{Timer, TimerGauge};

/// Station metadata for mesonet observations, relative to the static dir.
pub const STATION_FILE: &str = "okmesonet.json";

const GOING_AWAY: u16 = 1001;
const NORMAL_CLOSURE: u16 = 1000;
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    factory: Arc<dyn SourceFactory>,
    shared: Shared,
    shutdown: CancellationToken,
    connections: TaskTracker,
    outbound_buffer: usize,
    send_timeout: Duration,
}

impl AppState {
    pub fn new(factory: Arc<dyn SourceFactory>, outbound_buffer: usize) -> Self {
        Self {
            factory,
            shared: Shared::new(),
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
            outbound_buffer,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Bound on a single socket write before the client is dropped.
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    /// Upper bound on waiting for persistence jobs at shutdown.
    pub persist_drain: Duration,
    pub heartbeat: Duration,
}

impl From<&ServerConfig> for ServeOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            persist_drain: config.persist_drain(),
            heartbeat: config.heartbeat(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.shared.snapshot())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_cancelled() {
        return (axum::http::StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    ws.on_upgrade(move |socket| {
        let tracker = state.connections.clone();
        tracker.track_future(handle_socket(socket, peer, state))
    })
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outgoing) = Outbox::channel(state.outbound_buffer);
    let send_timeout = state.send_timeout;

    let mut writer = tokio::spawn(async move {
        while let Some(item) = outgoing.recv().await {
            let (message, last) = match item {
                Outgoing::Deliver(envelope) => match Frame::encode(&envelope) {
                    Ok(Frame::Text(text)) => (Message::Text(text.into()), false),
                    Ok(Frame::Binary(bytes)) => (Message::Binary(bytes.into()), false),
                    Err(err) => {
                        error!(peer = %peer, feed = %envelope.handler(), error = %err, "cannot frame envelope");
                        continue;
                    }
                },
                Outgoing::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    (Message::Close(Some(frame)), true)
                }
            };
            match timeout(send_timeout, sink.send(message)).await {
                Ok(Ok(())) if last => break,
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(peer = %peer, error = %err, "send failed");
                    break;
                }
                Err(_) => {
                    warn!(peer = %peer, timeout = ?send_timeout, "client stopped reading; dropping it");
                    break;
                }
            }
        }
    });

    let mut connection = Connection::new(
        peer.to_string(),
        Arc::clone(&state.factory),
        outbox.clone(),
        state.shared.clone(),
    );
    info!(peer = %peer, "client connected");

    let mut going_away = false;
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                going_away = true;
                break;
            }
            _ = outbox.closed() => break,
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(peer = %peer, "ignoring non-UTF-8 binary message");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(peer = %peer, error = %err, "receive failed");
                        break;
                    }
                };
                if connection.handle_text(&text).await == Flow::Close {
                    break;
                }
            }
        }
    }

    // Subscriptions stop before the close frame so nothing follows it.
    connection.close().await;
    let (code, reason) = if going_away {
        (GOING_AWAY, "Server is shutting down")
    } else {
        (NORMAL_CLOSURE, "")
    };
    if timeout(send_timeout, outbox.close(code, reason)).await.is_err() {
        warn!(peer = %peer, "close frame not queued in time; aborting writer");
        writer.abort();
    }
    drop(outbox);
    drop(connection);

    match timeout(send_timeout, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_cancelled() => {}
        Ok(Err(err)) => error!(peer = %peer, error = %err, "writer task failed"),
        Err(_) => {
            warn!(peer = %peer, "writer did not finish; aborting it");
            writer.abort();
        }
    }
    info!(peer = %peer, "client disconnected");
}

/// Serve on `listener` until `signal` resolves, then shut down in order:
/// connections close (timers disarmed first), the heartbeat stops, and
/// outstanding persistence jobs get `persist_drain` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    signal: F,
    options: ServeOptions,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| io_err("listener", e))?;
    info!(addr = %addr, "listening");

    let mut heartbeat = Timer::new(TimerGauge::new());
    {
        let shared = state.shared.clone();
        heartbeat.start_repeating(options.heartbeat, move || {
            let s = shared.snapshot();
            info!(
                connections = s.connections,
                subscriptions = s.subscriptions,
                armed_timers = s.armed_timers,
                pending_persist = s.pending_persist,
                "heartbeat"
            );
        });
    }

    let shutdown = state.shutdown.clone();
    let app = router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await;

    state.shutdown.cancel();
    state.connections.close();
    state.connections.wait().await;
    heartbeat.stop();

    let abandoned = state.shared.persist.drain(options.persist_drain).await;
    info!(abandoned, "server stopped");
    served.map_err(|e| io_err(addr.to_string(), e))
}

/// Build the production state from `config` and serve until ctrl-c or
/// SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let cache = Arc::new(FileCache::new(&config.cache_dir, config.cache_ttl()));
    let upstream = HttpUpstream::new(config.sources.http_timeout())
        .map_err(|e| ServerError::Setup(format!("http client: {e}")))?;
    let stations = StationTable::load(&config.static_dir.join(STATION_FILE))?;

    let ctx = SourceContext::new(
        config.sources.clone(),
        &config.static_dir,
        &config.data_dir,
        cache,
        Arc::new(upstream),
        Arc::new(stations),
    );
    let factory = Arc::new(FeedRegistry::new(Arc::new(ctx)));
    let state = AppState::new(factory, config.outbound_buffer).with_send_timeout(config.send_timeout());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(addr.to_string(), e))?;
    serve(listener, state, shutdown_signal(), ServeOptions::from(&config)).await
}

/// Start the runtime and block the current thread until it exits.
pub fn start_blocking(config: ServerConfig) -> Result<(), ServerError> {
    init_tracing(&config.log_level, config.log_json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// `RUST_LOG` wins over `level`. Safe to call more than once.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
