use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::db::models::MatchSnapshot;
use crate::db::Database;
use crate::live_scores::MatchFeed;
use crate::tracker::MatchRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: MatchRegistry,
    /// Snapshot stream fanned out to WebSocket clients
    pub snapshots: broadcast::Sender<MatchSnapshot>,
    pub feed: Arc<dyn MatchFeed>,
}

/// Build the Axum router for the dashboard and API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/matches", get(list_matches_handler))
        .route(
            "/api/matches/:id",
            get(get_match_handler).delete(delete_match_handler),
        )
        .route("/api/start-analysis", post(start_analysis_handler))
        .route("/api/live-matches", get(live_matches_handler))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// GET /api/matches
async fn list_matches_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.list_snapshots().map(Json).map_err(internal)
}

/// GET /api/matches/:id
async fn get_match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.latest_snapshot(&match_id).map_err(internal)? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err((StatusCode::NOT_FOUND, format!("no snapshot for match {}", match_id))),
    }
}

/// DELETE /api/matches/:id: stop tracking and forget the stored snapshot
async fn delete_match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let was_tracked = state.registry.untrack(&match_id);
    let had_snapshot = state.db.delete_snapshot(&match_id).map_err(internal)?;
    if !was_tracked && !had_snapshot {
        return Err((StatusCode::NOT_FOUND, format!("unknown match {}", match_id)));
    }
    if was_tracked {
        state
            .db
            .save_active_matches(&state.registry.tracked_ids())
            .map_err(internal)?;
    }
    info!("Match {} removed", match_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAnalysisRequest {
    match_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartAnalysisResponse {
    status: &'static str,
    match_count: usize,
}

/// POST /api/start-analysis {"matchIds": [...]}
async fn start_analysis_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartAnalysisRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut ids: Vec<String> = Vec::with_capacity(req.match_ids.len());
    for id in req.match_ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "matchIds must not be empty".to_string()));
    }

    let match_count = state.registry.select(&ids);
    state.db.save_active_matches(&ids).map_err(internal)?;
    info!("Analysis started for {} matches: {:?}", match_count, ids);

    Ok(Json(StartAnalysisResponse {
        status: "started",
        match_count,
    }))
}

/// GET /api/live-matches: fixtures the provider reports as live
async fn live_matches_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.feed.live_fixtures().await.map(Json).map_err(|e| {
        warn!("{}: live fixture lookup failed: {:#}", state.feed.name(), e);
        (StatusCode::BAD_GATEWAY, e.to_string())
    })
}

/// GET /ws: stream of snapshot JSON
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.snapshots.subscribe();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let snapshot = match rx.recv().await {
                Ok(s) => s,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, {} snapshots skipped", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&snapshot) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize snapshot: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            other => debug!("Ignoring WebSocket message: {:?}", other),
        }
    }

    send_task.abort();
    info!("WebSocket connection closed");
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Match Analytics</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --amber: #ff9800;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .status-dot { width: 10px; height: 10px; border-radius: 50%; background: var(--muted); display: inline-block; }
  .status-dot.on { background: var(--green); animation: pulse 1.5s infinite; }
  @keyframes pulse { 0%,100% { opacity: 1; } 50% { opacity: .3; } }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  tr:last-child td { border-bottom: none; }
  .pill { display: inline-block; padding: .15rem .55rem; border-radius: 20px; font-size: .75rem; font-weight: 600; background: rgba(108,99,255,.2); color: var(--accent); }
  .pill.warn { background: rgba(255,152,0,.15); color: var(--amber); }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
  .btn { background: none; border: 1px solid var(--border); color: var(--muted); padding: .3rem .8rem; border-radius: 6px; cursor: pointer; font-size: .8rem; }
  .btn:hover { border-color: var(--accent); color: var(--accent); }
</style>
</head>
<body>
<header>
  <span class="status-dot" id="dot"></span>
  <h1>Match Analytics</h1>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="last-updated"></span>
</header>

<main>
  <div class="panel">
    <div class="panel-header">Analysed Matches</div>
    <table>
      <thead><tr><th>Match</th><th>Min</th><th>Score</th><th>State</th><th>Home / Draw / Away</th><th>Expected</th><th>Trend</th><th>Confidence</th><th></th></tr></thead>
      <tbody id="matches-tbody"><tr><td colspan="9" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>

  <div class="panel">
    <div class="panel-header">Live Fixtures <button class="btn" onclick="loadLive()">↻ Refresh</button></div>
    <table>
      <thead><tr><th></th><th>League</th><th>Match</th><th>Min</th><th>Score</th></tr></thead>
      <tbody id="live-tbody"><tr><td colspan="5" class="empty">Loading…</td></tr></tbody>
    </table>
    <div style="padding:.9rem 1.2rem;"><button class="btn" onclick="startSelected()">Analyse selected</button></div>
  </div>
</main>

<script>
const pct = v => (v*100).toFixed(1)+'%';
const snapshots = new Map();

function render() {
  const tbody = document.getElementById('matches-tbody');
  const rows = [...snapshots.values()];
  if (!rows.length) { tbody.innerHTML = '<tr><td colspan="9" class="empty">No analysed matches yet</td></tr>'; return; }
  tbody.innerHTML = rows.map(s => {
    const o = s.analysis.outcome;
    const recal = s.analysis.needsRecalibration ? ' <span class="pill warn">recalibrate</span>' : '';
    return `<tr>
      <td>${s.homeTeam} vs ${s.awayTeam}</td>
      <td>${s.minute ?? '–'}</td>
      <td>${s.homeScore}–${s.awayScore}</td>
      <td><span class="pill">${s.matchState.replace(/_/g,' ').toLowerCase()}</span>${recal}</td>
      <td>${pct(o.probabilityHomeWin)} / ${pct(o.probabilityDraw)} / ${pct(o.probabilityAwayWin)}</td>
      <td>${o.expectedFinalScore}</td>
      <td>${s.analysis.trendSignal.description}</td>
      <td>${pct(s.analysis.integrationConfidence)}</td>
      <td><button class="btn" onclick="removeMatch('${s.matchId}')">✕</button></td>
    </tr>`;
  }).join('');
  document.getElementById('last-updated').textContent = 'Updated ' + new Date().toLocaleTimeString();
}

async function loadMatches() {
  const r = await fetch('/api/matches');
  if (!r.ok) return;
  (await r.json()).forEach(s => snapshots.set(s.matchId, s));
  render();
}

async function loadLive() {
  const tbody = document.getElementById('live-tbody');
  const r = await fetch('/api/live-matches');
  if (!r.ok) { tbody.innerHTML = '<tr><td colspan="5" class="empty">Provider unavailable</td></tr>'; return; }
  const live = await r.json();
  if (!live.length) { tbody.innerHTML = '<tr><td colspan="5" class="empty">No live fixtures</td></tr>'; return; }
  tbody.innerHTML = live.map(f => `<tr>
    <td><input type="checkbox" value="${f.matchId}"></td>
    <td>${f.league}</td>
    <td>${f.homeTeam} vs ${f.awayTeam}</td>
    <td>${f.minute ?? '–'}</td>
    <td>${f.homeScore}–${f.awayScore}</td>
  </tr>`).join('');
}

async function startSelected() {
  const ids = [...document.querySelectorAll('#live-tbody input:checked')].map(c => c.value);
  if (!ids.length) return;
  await fetch('/api/start-analysis', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ matchIds: ids }),
  });
}

async function removeMatch(id) {
  await fetch('/api/matches/' + encodeURIComponent(id), { method: 'DELETE' });
  snapshots.delete(id);
  render();
}

function connect() {
  const proto = location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(`${proto}://${location.host}/ws`);
  const dot = document.getElementById('dot');
  ws.onopen = () => dot.classList.add('on');
  ws.onmessage = ev => { const s = JSON.parse(ev.data); snapshots.set(s.matchId, s); render(); };
  ws.onclose = () => { dot.classList.remove('on'); setTimeout(connect, 3000); };
}

loadMatches();
loadLive();
connect();
</script>
</body>
</html>"#;
