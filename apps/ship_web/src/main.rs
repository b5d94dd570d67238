use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use getrandom::getrandom;
use shipcore::{Engine, ModelGateway};
use shipproto::{
    ClientMsg, CommandRequest, LocationUpdate, RadiationToggle, RegisterRequest, ServerMsg,
};
use shipstore::{Store, StoreConfig};
use tokio::sync::{mpsc, watch, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

fn usage_and_exit() -> ! {
    eprintln!(
        "ship_web\n\n\
USAGE:\n  ship_web [--bind HOST:PORT] [--redis-addr HOST:PORT] [--model-url URL]\n           [--mock-model] [--memory-store]\n\n\
ENV:\n  BIND                default 0.0.0.0:8080\n  REDIS_ADDR          default 127.0.0.1:6379\n  REDIS_PASSWORD      optional\n  USE_MEMORY_STORE    skip redis entirely when \"true\"\n  MODEL_URL           chat-completions endpoint; empty selects the mock model\n  MODEL_NAME          default local-model\n  MODEL_API_KEY       optional bearer token\n  USE_MOCK_MODEL      force the mock model when \"true\"\n  ADMIN_TOKEN         radiation-event admin token (generated if unset)\n  LEAK_INTERVAL_SECS  world-event roll interval, default 120\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    redis_addr: String,
    redis_password: Option<String>,
    use_memory_store: bool,
    model_url: String,
    model_name: String,
    model_api_key: Option<String>,
    use_mock_model: bool,
    admin_token: Option<String>,
    leak_interval_secs: u64,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut redis_addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    let redis_password = std::env::var("REDIS_PASSWORD").ok();
    let mut use_memory_store = env_flag("USE_MEMORY_STORE");

    let mut model_url = std::env::var("MODEL_URL").unwrap_or_default();
    let model_name = std::env::var("MODEL_NAME").unwrap_or_else(|_| "local-model".to_string());
    let model_api_key = std::env::var("MODEL_API_KEY").ok();
    let mut use_mock_model = env_flag("USE_MOCK_MODEL");

    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let leak_interval_secs = std::env::var("LEAK_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--redis-addr" => {
                redis_addr = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "--model-url" => {
                model_url = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "--mock-model" => use_mock_model = true,
            "--memory-store" => use_memory_store = true,
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        redis_addr,
        redis_password,
        use_memory_store,
        model_url,
        model_name,
        model_api_key,
        use_mock_model,
        admin_token,
        leak_interval_secs,
    }
}

type Sessions = Arc<Mutex<HashMap<u64, mpsc::Sender<ServerMsg>>>>;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    sessions: Sessions,
    admin_token: String,
}

fn random_hex(bytes: usize) -> String {
    let mut b = vec![0u8; bytes];
    getrandom(&mut b).expect("getrandom");
    let mut out = String::with_capacity(bytes * 2);
    for x in b {
        out.push_str(&format!("{:02x}", x));
    }
    out
}

fn new_session_id() -> u64 {
    let mut b = [0u8; 8];
    getrandom(&mut b).expect("getrandom");
    u64::from_be_bytes(b)
}

/// Push one message to every connected session; sessions whose channel has
/// closed are dropped, and a full buffer skips the slow session rather than
/// holding up the rest.
async fn broadcast(state: &AppState, msg: ServerMsg) {
    let snapshot = {
        let m = state.sessions.lock().await;
        m.iter().map(|(id, tx)| (*id, tx.clone())).collect::<Vec<_>>()
    };

    let mut dead = Vec::new();
    for (id, tx) in snapshot {
        match tx.try_send(msg.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = id, "ws session lagging; dropping broadcast frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
        }
    }

    if !dead.is_empty() {
        let mut m = state.sessions.lock().await;
        for id in dead {
            m.remove(&id);
        }
    }
}

/// Re-read authoritative ship state and fan it out.
async fn broadcast_state(state: &AppState) {
    match state.engine.current_state().await {
        Ok(systems) => broadcast(state, ServerMsg::State { systems }).await,
        Err(e) => warn!(err = %e, "failed to read ship state for broadcast"),
    }
}

async fn healthz() -> &'static str {
    "ok\n"
}

async fn get_status(State(st): State<AppState>) -> axum::response::Response {
    match st.engine.current_state().await {
        Ok(systems) => Json(serde_json::json!({ "systems": systems })).into_response(),
        Err(e) => {
            warn!(err = %e, "status read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable\n").into_response()
        }
    }
}

async fn post_command(
    State(st): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> axum::response::Response {
    let outcome = st.engine.process(&req.text, &req.user_id).await;
    if !outcome.updates.is_empty() {
        broadcast_state(&st).await;
    }
    Json(outcome).into_response()
}

async fn post_user(
    State(st): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> axum::response::Response {
    match st.engine.register(&req.user_id, &req.name).await {
        Ok(rank) => Json(serde_json::json!({ "status": "registered", "rank": rank })).into_response(),
        Err(e) => {
            warn!(user = %req.user_id, err = %e, "registration failed");
            Json(serde_json::json!({ "status": "error", "message": "registration failed" }))
                .into_response()
        }
    }
}

async fn post_location(
    State(st): State<AppState>,
    Json(req): Json<LocationUpdate>,
) -> axum::response::Response {
    match st.engine.set_location(&req.user_id, &req.token).await {
        Ok(location) => Json(serde_json::json!({
            "status": "success",
            "location": location.as_str(),
        }))
        .into_response(),
        Err(e) => {
            info!(user = %req.user_id, err = %e, "location update rejected");
            Json(serde_json::json!({ "status": "error", "message": e.to_string() }))
                .into_response()
        }
    }
}

async fn get_leaderboard(
    State(st): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let n = q
        .get("n")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10)
        .min(100);
    match st.engine.top(n).await {
        Ok(entries) => Json(serde_json::json!({ "entries": entries })).into_response(),
        Err(e) => {
            warn!(err = %e, "leaderboard read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable\n").into_response()
        }
    }
}

async fn post_admin_radiation(
    State(st): State<AppState>,
    Json(req): Json<RadiationToggle>,
) -> axum::response::Response {
    if req.token != st.admin_token {
        return (StatusCode::FORBIDDEN, "forbidden\n").into_response();
    }
    if let Err(e) = st.engine.set_radiation(req.active).await {
        warn!(err = %e, "radiation toggle failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable\n").into_response();
    }

    let (alert, message) = if req.active {
        (
            "radiation_leak",
            "Radiation leak detected in engineering. Bridge controls are locked out.",
        )
    } else {
        (
            "radiation_cleared",
            "Radiation levels nominal. Bridge control restored.",
        )
    };
    warn!(active = req.active, "radiation event toggled by admin");
    broadcast(
        &st,
        ServerMsg::Alert {
            alert: alert.to_string(),
            message: message.to_string(),
        },
    )
    .await;
    broadcast_state(&st).await;

    Json(serde_json::json!({ "status": "ok", "radiation_leak": req.active })).into_response()
}

async fn ws_route(
    ws: ws::WebSocketUpgrade,
    State(st): State<AppState>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move { ws_session_task(socket, st).await })
}

async fn ws_session_task(socket: ws::WebSocket, state: AppState) {
    let sid = new_session_id();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMsg>(64);

    state.sessions.lock().await.insert(sid, tx.clone());
    info!(session = sid, "ws client connected");

    // Writer task: everything sent to this session funnels through one place.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(s) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(ws::Message::Text(s)).await.is_err() {
                break;
            }
        }
    });

    let _ = tx
        .send(ServerMsg::Hello {
            mode: "json".to_string(),
        })
        .await;
    if let Ok(systems) = state.engine.current_state().await {
        let _ = tx.send(ServerMsg::State { systems }).await;
    }

    while let Some(m) = stream.next().await {
        let m = match m {
            Ok(m) => m,
            Err(_) => break,
        };
        match m {
            ws::Message::Text(s) => {
                let Ok(msg) = serde_json::from_str::<ClientMsg>(&s) else {
                    let _ = tx
                        .send(ServerMsg::Err {
                            text: "bad json".to_string(),
                        })
                        .await;
                    continue;
                };
                match msg {
                    ClientMsg::Command { text, user_id } => {
                        let outcome = state.engine.process(&text, &user_id).await;
                        let changed = !outcome.updates.is_empty();
                        let _ = tx.send(ServerMsg::Outcome { outcome }).await;
                        if changed {
                            broadcast_state(&state).await;
                        }
                    }
                    ClientMsg::Ping {} => {
                        let _ = tx.send(ServerMsg::Pong {}).await;
                    }
                }
            }
            ws::Message::Close(_) => break,
            ws::Message::Ping(_) | ws::Message::Pong(_) | ws::Message::Binary(_) => {}
        }
    }

    // Cleanup.
    state.sessions.lock().await.remove(&sid);
    drop(tx);
    let _ = writer.await;
    info!(session = sid, "ws client disconnected");
}

/// Periodic world event: roll a die, maybe spring a radiation leak. Uses the
/// same store operations as the admin path; a concurrent clear simply wins
/// or loses the last write.
async fn radiation_task(state: AppState, interval_secs: u64) {
    let d = Duration::from_secs(interval_secs.max(1));
    loop {
        tokio::time::sleep(d).await;

        let active = match state.engine.radiation_active().await {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "radiation roll skipped; store unavailable");
                continue;
            }
        };
        if active || !one_in_ten() {
            continue;
        }

        if let Err(e) = state.engine.set_radiation(true).await {
            warn!(err = %e, "failed to set radiation leak");
            continue;
        }
        warn!("radiation leak event triggered");
        broadcast(
            &state,
            ServerMsg::Alert {
                alert: "radiation_leak".to_string(),
                message: "Radiation leak detected in engineering. Bridge controls are locked out."
                    .to_string(),
            },
        )
        .await;
        broadcast_state(&state).await;
    }
}

fn one_in_ten() -> bool {
    let mut b = [0u8; 1];
    getrandom(&mut b).expect("getrandom");
    b[0] % 10 == 0
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();

    let store = Store::open(&StoreConfig {
        addr: cfg.redis_addr.clone(),
        password: cfg.redis_password.clone(),
        use_memory: cfg.use_memory_store,
    })
    .await;

    let gateway = if cfg.use_mock_model || cfg.model_url.is_empty() {
        info!("using mock model gateway");
        ModelGateway::mock()
    } else {
        info!(url = %cfg.model_url, model = %cfg.model_name, "using http model gateway");
        ModelGateway::http(&cfg.model_url, &cfg.model_name, cfg.model_api_key.clone())
            .map_err(|e| anyhow::anyhow!("model gateway init failed: {e}"))?
    };

    let engine = Arc::new(Engine::new(store, gateway));
    engine
        .bootstrap()
        .await
        .map_err(|e| anyhow::anyhow!("store bootstrap failed: {e}"))?;

    let admin_token = match cfg.admin_token.clone() {
        Some(t) => t,
        None => {
            let t = random_hex(16);
            info!(admin_token = %t, "generated admin token");
            t
        }
    };

    let state = AppState {
        engine,
        sessions: Arc::new(Mutex::new(HashMap::new())),
        admin_token,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(get_status))
        .route("/command", post(post_command))
        .route("/user", post(post_user))
        .route("/location", post(post_location))
        .route("/leaderboard", get(get_leaderboard))
        .route("/admin/radiation", post(post_admin_radiation))
        .route("/ws", get(ws_route))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    tokio::spawn(radiation_task(state.clone(), cfg.leak_interval_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
        info!("shutdown signal received");
    });

    info!(bind = %cfg.bind, "ship_web listening");
    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    Ok(())
}
