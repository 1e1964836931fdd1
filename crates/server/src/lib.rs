use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};
use warboard_engine::{
    board_document, BoardError, GroupChange, HistoryStep, Session, SqliteStore, SystemClock,
};
use warboard_protocol::{
    events, BoardDocument, BoardSummary, ExportDocument, MarkerKind, Member, MemberDraft,
    MemberId, Notice, Point, RoleCount, Stroke, TeamKey, UiUpdate,
};

pub mod config;

pub use config::ServerConfig;

pub struct AppState {
    pub session: Mutex<Session>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, Session>, ApiError> {
        self.session
            .lock()
            .map_err(|_| ApiError::internal("session lock poisoned"))
    }
}

/// Error response: status plus a `rejected` update carrying the notice.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub UiUpdate);

impl ApiError {
    fn internal(message: &str) -> Self {
        Self(
            StatusCode::INTERNAL_SERVER_ERROR,
            UiUpdate::new(events::REJECTED).with_notice(Notice::error(message)),
        )
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let (status, notice) = match &err {
            BoardError::AlreadyPlaced { .. }
            | BoardError::CapacityExceeded { .. }
            | BoardError::NoEligibleMembers { .. }
            | BoardError::SingleTeamGroup { .. }
            | BoardError::RosterFull { .. } => (StatusCode::CONFLICT, Notice::warn(err.to_string())),
            BoardError::InvalidFormat { .. } | BoardError::InvalidMember { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Notice::error(err.to_string()),
            ),
            BoardError::UnknownMember { .. }
            | BoardError::UnknownGroup { .. }
            | BoardError::UnknownMarker { .. }
            | BoardError::NotInGroup { .. } => (StatusCode::NOT_FOUND, Notice::error(err.to_string())),
        };
        debug!(%status, %err, "request rejected");
        Self(status, UiUpdate::new(events::REJECTED).with_notice(notice))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(self.1)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/revision", get(api_revision))
        .route("/api/board", get(api_board))
        .route("/api/board/clear", post(api_board_clear))
        .route("/api/roster", get(api_roster).post(api_roster_add))
        .route("/api/roster/{id}", put(api_roster_edit).delete(api_roster_delete))
        .route("/api/members/{id}/place", post(api_member_place))
        .route("/api/members/{id}/move", post(api_member_move))
        .route("/api/members/{id}/placement", delete(api_member_remove))
        .route("/api/teams/{team}/place", post(api_team_place))
        .route("/api/teams/{team}/name", put(api_team_rename))
        .route("/api/groups/{id}", delete(api_group_remove))
        .route("/api/groups/{id}/drag", post(api_group_drag))
        .route("/api/groups/{id}/split", post(api_group_split_teams))
        .route(
            "/api/groups/{id}/members/{member_id}/split",
            post(api_group_split_member),
        )
        .route("/api/groups/{id}/roles", get(api_group_roles))
        .route("/api/markers/{kind}", post(api_marker_place))
        .route(
            "/api/markers/{kind}/{id}",
            put(api_marker_move).delete(api_marker_remove),
        )
        .route("/api/drawing", get(api_drawing))
        .route("/api/drawing/mode", post(api_drawing_mode))
        .route("/api/drawing/color", post(api_drawing_color))
        .route("/api/drawing/stroke/begin", post(api_stroke_begin))
        .route("/api/drawing/stroke/extend", post(api_stroke_extend))
        .route("/api/drawing/stroke/end", post(api_stroke_end))
        .route("/api/drawing/stroke/cancel", post(api_stroke_cancel))
        .route("/api/drawing/undo", post(api_drawing_undo))
        .route("/api/drawing/redo", post(api_drawing_redo))
        .route("/api/drawing/auto-delete", post(api_drawing_auto_delete))
        .route("/api/drawing/clear", post(api_drawing_clear))
        .route("/api/export", get(api_export))
        .route("/api/export/download", get(api_export_download))
        .route("/api/import", post(api_import))
        .route("/api/theme", get(api_theme).put(api_theme_set))
        .with_state(state)
        // Never use `Access-Control-Allow-Origin: *` here; the board is local
        // state and a random website must not be able to read or rewrite it.
        .layer(
            ServiceBuilder::new()
                .layer(local_only_cors())
                .layer(middleware::from_fn(ip_allowlist)),
        )
}

async fn health() -> &'static str {
    "ok"
}

fn payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(%err, "payload serialization failed");
        serde_json::Value::Null
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    #[serde(flatten)]
    pub board: BoardDocument,
    pub summary: BoardSummary,
    pub team_names: BTreeMap<String, String>,
}

impl BoardView {
    fn of(session: &Session) -> Self {
        Self {
            board: board_document(session.board()),
            summary: session.summary(),
            team_names: session.team_names().to_raw(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingView {
    pub strokes: Vec<Stroke>,
    pub mode: bool,
    pub drawing: bool,
    pub color: String,
    pub auto_delete: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl DrawingView {
    fn of(session: &Session) -> Self {
        let d = session.drawing();
        Self {
            strokes: d.strokes().to_vec(),
            mode: d.mode(),
            drawing: d.is_drawing(),
            color: d.color().to_string(),
            auto_delete: d.auto_delete(),
            can_undo: d.can_undo(),
            can_redo: d.can_redo(),
        }
    }
}

fn board_update(session: &Session) -> UiUpdate {
    UiUpdate::new(events::BOARD_CHANGED).with_payload(payload(&BoardView::of(session)))
}

fn roster_update(session: &Session) -> UiUpdate {
    UiUpdate::new(events::ROSTER_CHANGED).with_payload(payload(&session.roster().members()))
}

fn drawing_update(session: &Session) -> UiUpdate {
    UiUpdate::new(events::DRAWING_CHANGED).with_payload(payload(&DrawingView::of(session)))
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct At {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
pub struct Toggle {
    pub on: bool,
}

#[derive(Debug, Deserialize)]
pub struct NameInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ColorInput {
    pub color: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThemeBody {
    pub theme: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Revision {
    pub revision: i64,
}

async fn api_revision(State(state): State<Arc<AppState>>) -> ApiResult<Revision> {
    let session = state.session()?;
    Ok(Json(Revision {
        revision: session.revision(),
    }))
}

async fn api_board(State(state): State<Arc<AppState>>) -> ApiResult<BoardView> {
    let session = state.session()?;
    Ok(Json(BoardView::of(&session)))
}

async fn api_board_clear(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.clear_board();
    Ok(Json(board_update(&session).with_notice(Notice::info("Map cleared"))))
}

async fn api_roster(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Member>> {
    let session = state.session()?;
    Ok(Json(session.roster().members().to_vec()))
}

async fn api_roster_add(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<MemberDraft>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let member = session.add_member(draft)?;
    Ok(Json(
        roster_update(&session).with_notice(Notice::info(format!("{} added", member.name))),
    ))
}

async fn api_roster_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemberId>,
    Json(draft): Json<MemberDraft>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.edit_member(id, draft)?;
    Ok(Json(roster_update(&session)))
}

async fn api_roster_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemberId>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let member = session.delete_member(id)?;
    Ok(Json(
        roster_update(&session).with_notice(Notice::info(format!("{} removed", member.name))),
    ))
}

async fn api_member_place(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemberId>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.place_member(id, at.x, at.y)?;
    Ok(Json(board_update(&session)))
}

async fn api_member_move(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemberId>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    if !session.move_member(id, at.x, at.y) {
        return Err(BoardError::UnknownMember { member_id: id }.into());
    }
    Ok(Json(board_update(&session)))
}

async fn api_member_remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemberId>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.remove_member(id);
    Ok(Json(board_update(&session)))
}

async fn api_team_place(
    State(state): State<Arc<AppState>>,
    Path(team): Path<TeamKey>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let change = session.place_team(team, at.x, at.y)?;
    let mut update = board_update(&session);
    if let GroupChange::Merged { .. } = change {
        update = update.with_notice(Notice::info(format!("{team} merged into nearby group")));
    }
    Ok(Json(update))
}

async fn api_team_rename(
    State(state): State<Arc<AppState>>,
    Path(team): Path<TeamKey>,
    Json(input): Json<NameInput>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.rename_team(team, &input.name);
    Ok(Json(
        UiUpdate::new(events::TEAMS_CHANGED).with_payload(payload(&session.team_names().to_raw())),
    ))
}

async fn api_group_remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.remove_group(&id);
    Ok(Json(board_update(&session)))
}

async fn api_group_drag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.drag_group(&id, at.x, at.y)?;
    Ok(Json(board_update(&session)))
}

async fn api_group_split_teams(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let created = session.split_group_by_team(&id)?;
    Ok(Json(board_update(&session).with_notice(Notice::info(format!(
        "Split into {} groups",
        created.len()
    )))))
}

async fn api_group_split_member(
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, MemberId)>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.split_member_from_group(&id, member_id)?;
    Ok(Json(board_update(&session)))
}

async fn api_group_roles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RoleCount> {
    let session = state.session()?;
    Ok(Json(session.role_breakdown(&id)?))
}

async fn api_marker_place(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MarkerKind>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.place_marker(kind, at.x, at.y)?;
    Ok(Json(board_update(&session)))
}

async fn api_marker_move(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(MarkerKind, String)>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.move_marker(kind, &id, at.x, at.y)?;
    Ok(Json(board_update(&session)))
}

async fn api_marker_remove(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(MarkerKind, String)>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.remove_marker(kind, &id);
    Ok(Json(board_update(&session)))
}

async fn api_drawing(State(state): State<Arc<AppState>>) -> ApiResult<DrawingView> {
    let session = state.session()?;
    Ok(Json(DrawingView::of(&session)))
}

async fn api_drawing_mode(
    State(state): State<Arc<AppState>>,
    Json(input): Json<Toggle>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.set_drawing_mode(input.on);
    Ok(Json(drawing_update(&session)))
}

async fn api_drawing_color(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ColorInput>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.set_stroke_color(&input.color);
    Ok(Json(drawing_update(&session)))
}

async fn api_stroke_begin(
    State(state): State<Arc<AppState>>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let mut update = drawing_update_if(&mut session, |s| s.begin_stroke(Point::new(at.x, at.y)));
    if !session.drawing().mode() {
        update = update.with_notice(Notice::info("Drawing mode is off"));
    }
    Ok(Json(update))
}

async fn api_stroke_extend(
    State(state): State<Arc<AppState>>,
    Json(at): Json<At>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    Ok(Json(drawing_update_if(&mut session, |s| {
        s.extend_stroke(Point::new(at.x, at.y))
    })))
}

async fn api_stroke_end(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    Ok(Json(drawing_update_if(&mut session, |s| {
        s.end_stroke().is_some()
    })))
}

async fn api_stroke_cancel(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.cancel_stroke();
    Ok(Json(drawing_update(&session)))
}

/// Runs `op`; the update only carries the drawing payload when it changed
/// something, so pointer moves outside a stroke stay cheap.
fn drawing_update_if(session: &mut Session, op: impl FnOnce(&mut Session) -> bool) -> UiUpdate {
    if op(session) {
        drawing_update(session)
    } else {
        UiUpdate::new(events::DRAWING_CHANGED)
    }
}

fn history_notice(step: HistoryStep, what: &str) -> Option<Notice> {
    match step {
        HistoryStep::Applied => None,
        HistoryStep::Nothing => Some(Notice::info(format!("Nothing to {what}"))),
        HistoryStep::Disabled => Some(Notice::warn(format!(
            "Cannot {what} while auto-delete is on"
        ))),
    }
}

async fn api_drawing_undo(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let step = session.undo_drawing();
    let mut update = drawing_update(&session);
    update.notice = history_notice(step, "undo");
    Ok(Json(update))
}

async fn api_drawing_redo(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let step = session.redo_drawing();
    let mut update = drawing_update(&session);
    update.notice = history_notice(step, "redo");
    Ok(Json(update))
}

async fn api_drawing_auto_delete(
    State(state): State<Arc<AppState>>,
    Json(input): Json<Toggle>,
) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.set_auto_delete(input.on);
    Ok(Json(drawing_update(&session)))
}

async fn api_drawing_clear(State(state): State<Arc<AppState>>) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    let cleared = session.clear_drawings();
    let mut update = drawing_update(&session);
    if !cleared {
        update = update.with_notice(Notice::info("No drawings to clear"));
    }
    Ok(Json(update))
}

async fn api_export(State(state): State<Arc<AppState>>) -> ApiResult<ExportDocument> {
    let session = state.session()?;
    Ok(Json(session.export_board()))
}

/// The export as a pretty-printed file attachment.
async fn api_export_download(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session()?;
    let body = session.export_json().map_err(|err| {
        warn!("export failed: {err:#}");
        ApiError::internal("export failed")
    })?;
    let disposition = format!(
        "attachment; filename=\"guild-war-strategy-{}.json\"",
        session.now_ms()
    );
    Ok((
        [
            (axum::http::header::CONTENT_TYPE, "application/json".to_string()),
            (axum::http::header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn api_import(State(state): State<Arc<AppState>>, body: String) -> ApiResult<UiUpdate> {
    let mut session = state.session()?;
    session.import_board(&body)?;
    let update = UiUpdate::new(events::BOARD_IMPORTED)
        .with_payload(payload(&BoardView::of(&session)))
        .with_notice(Notice::info("Configuration imported successfully"));
    Ok(Json(update))
}

async fn api_theme(State(state): State<Arc<AppState>>) -> ApiResult<ThemeBody> {
    let session = state.session()?;
    Ok(Json(ThemeBody {
        theme: session.theme(),
    }))
}

async fn api_theme_set(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ThemeBody>,
) -> ApiResult<ThemeBody> {
    let mut session = state.session()?;
    if let Some(theme) = &body.theme {
        session.set_theme(theme);
    }
    Ok(Json(ThemeBody {
        theme: session.theme(),
    }))
}

/// One pass of the auto-delete ticker. Returns how many strokes expired.
pub fn expire_tick(state: &AppState) -> usize {
    match state.session.lock() {
        Ok(mut session) => session.expire_drawings(),
        Err(_) => {
            warn!("session lock poisoned; skipping expiry tick");
            0
        }
    }
}

pub fn spawn_expiry_ticker(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let removed = expire_tick(&state);
            if removed > 0 {
                debug!(removed, "auto-delete removed strokes");
            }
        }
    })
}

pub fn open_state(config: &ServerConfig) -> Arc<AppState> {
    let store = SqliteStore::new(config.db_path.clone());
    info!(db = %store.db_path().display(), "opening board store");
    Arc::new(AppState::new(Session::open(store, Arc::new(SystemClock))))
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let state = open_state(&config);
    serve_listener(listener, state, config.tick_interval(), async {
        std::future::pending::<()>().await
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    tick_interval: Duration,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let ticker = spawn_expiry_ticker(state.clone(), tick_interval);
    let app = build_router(state);
    let addr = listener.local_addr()?;
    info!(%addr, "warboard server listening");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    ticker.abort();
    served?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    warn!(%ip, "refusing non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
