//! Ambassador Ledger Server
//!
//! HTTP surface over the auth, contribution and projection services.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::WalletCredentials;
use crate::contributions::ContributionService;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Contribution, ContributionActivity, ContributionStatus, DashboardStats, LeaderboardEntry,
    Role, User,
};
use crate::projections::Projections;
use crate::sessions::{AuthService, IssuedSession};
use crate::storage::LedgerStorage;

pub struct AppState {
    pub auth: AuthService,
    pub contributions: ContributionService,
    pub projections: Projections,
    pub storage: Arc<LedgerStorage>,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/wallet/connect", post(connect_handler))
        .route("/api/wallet/disconnect", post(disconnect_handler))
        .route(
            "/api/contributions",
            post(submit_handler).get(my_contributions_handler),
        )
        .route("/api/contributions/review/pending", get(pending_handler))
        .route("/api/contributions/:id", get(contribution_handler))
        .route("/api/contributions/:id/review", patch(review_handler))
        .route("/api/users/:id/points", post(adjust_points_handler))
        .route("/api/users/:id/approve", post(approve_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/dashboard/:wallet", get(wallet_dashboard_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/activity", get(activity_handler))
        .route("/api/activity/:wallet", get(wallet_activity_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// ERRORS AND AUTH HELPERS
// ============================================================================

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Auth(_) => StatusCode::UNAUTHORIZED,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::Storage(_) | LedgerError::Internal(_) => {
                error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for LedgerError {
    fn from(rejection: JsonRejection) -> Self {
        LedgerError::validation(rejection.body_text())
    }
}

fn bearer_token(headers: &HeaderMap) -> LedgerResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| LedgerError::auth("Missing bearer token"))
}

fn current_user(state: &AppState, headers: &HeaderMap) -> LedgerResult<User> {
    state.auth.validate(bearer_token(headers)?)
}

fn user_id_for_wallet(state: &AppState, wallet: &str) -> LedgerResult<Option<i64>> {
    Ok(state.storage.find_user_by_wallet(wallet)?.map(|u| u.id))
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

// ============================================================================
// AUTH AND WALLET
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub wallet_address: String,
    #[serde(flatten)]
    pub credentials: WalletCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub wallet_address: String,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> LedgerResult<Json<IssuedSession>> {
    let Json(request) = payload?;
    let issued = state
        .auth
        .login(&request.wallet_address, &request.credentials)?;
    Ok(Json(issued))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> LedgerResult<Json<serde_json::Value>> {
    let revoked = state.auth.logout(bearer_token(&headers)?)?;
    Ok(Json(serde_json::json!({ "success": revoked })))
}

async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> LedgerResult<Json<User>> {
    Ok(Json(current_user(&state, &headers)?))
}

async fn connect_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> LedgerResult<Json<User>> {
    let Json(request) = payload?;
    Ok(Json(state.auth.connect_wallet(&request.wallet_address)?))
}

async fn disconnect_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> LedgerResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    state.auth.disconnect_wallet(&request.wallet_address)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: ContributionStatus,
    pub points: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    pub delta: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub role: Role,
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> LedgerResult<(StatusCode, Json<Contribution>)> {
    let Json(request) = payload?;
    let user = current_user(&state, &headers)?;
    let contribution =
        state
            .contributions
            .submit(user.id, &request.kind, &request.url, request.description)?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

async fn my_contributions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> LedgerResult<Json<Vec<Contribution>>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.contributions.list_for_user(user.id)?))
}

async fn pending_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> LedgerResult<Json<Vec<Contribution>>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(
        state
            .contributions
            .list_by_status(&user, ContributionStatus::Pending)?,
    ))
}

async fn contribution_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> LedgerResult<Json<Contribution>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.contributions.get(&user, id)?))
}

async fn review_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> LedgerResult<Json<Contribution>> {
    let Json(request) = payload?;
    let user = current_user(&state, &headers)?;
    let reviewed = state
        .contributions
        .review(&user, id, request.status, request.points)?;
    Ok(Json(reviewed))
}

async fn adjust_points_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    payload: Result<Json<AdjustPointsRequest>, JsonRejection>,
) -> LedgerResult<Json<User>> {
    let Json(request) = payload?;
    let admin = current_user(&state, &headers)?;
    let user = state.contributions.adjust_points(
        &admin,
        user_id,
        request.delta,
        request.reason.as_deref(),
    )?;
    Ok(Json(user))
}

async fn approve_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> LedgerResult<Json<User>> {
    let Json(request) = payload?;
    let admin = current_user(&state, &headers)?;
    Ok(Json(state.auth.approve_user(&admin, user_id, request.role)?))
}

// ============================================================================
// PROJECTIONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
) -> LedgerResult<Json<DashboardStats>> {
    Ok(Json(state.projections.dashboard_stats(None)?))
}

async fn wallet_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> LedgerResult<Json<DashboardStats>> {
    let user_id = user_id_for_wallet(&state, &wallet)?;
    Ok(Json(state.projections.dashboard_stats(user_id)?))
}

async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> LedgerResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.projections.leaderboard(query.limit)?))
}

async fn activity_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> LedgerResult<Json<Vec<ContributionActivity>>> {
    Ok(Json(state.projections.recent_activity(None, query.limit)?))
}

async fn wallet_activity_handler(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
    Query(query): Query<LimitQuery>,
) -> LedgerResult<Json<Vec<ContributionActivity>>> {
    // An unknown wallet has no activity rather than everyone's
    let Some(user_id) = user_id_for_wallet(&state, &wallet)? else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(
        state.projections.recent_activity(Some(user_id), query.limit)?,
    ))
}

/// Run the server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting Ambassador Ledger server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AmbassadorPolicy, MockSignatureVerifier};
    use crate::config::DisplayConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const WALLET: &str = "QUBIC1234ROUTERWALLETXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";
    const ADMIN_WALLET: &str = "ADMINWALLETXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";

    fn test_state() -> Arc<AppState> {
        let storage = Arc::new(LedgerStorage::in_memory().unwrap());
        let policy = AmbassadorPolicy::new(
            vec!["QUBIC1234".to_string()],
            Vec::new(),
            vec![ADMIN_WALLET.to_string()],
        );
        Arc::new(AppState {
            auth: AuthService::new(
                storage.clone(),
                Arc::new(MockSignatureVerifier),
                policy,
                chrono::Duration::days(7),
            ),
            contributions: ContributionService::new(storage.clone(), true),
            projections: Projections::new(storage.clone(), DisplayConfig::default()),
            storage,
            started_at: std::time::Instant::now(),
        })
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn login(state: &Arc<AppState>, wallet: &str) -> String {
        let (status, body) = call(
            state,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({
                "walletAddress": wallet,
                "publicKey": "K".repeat(64),
                "signature": "mock_signature_1",
                "timestamp": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
    }

    #[tokio::test]
    async fn test_login_submit_and_dashboard() {
        let state = test_state();
        let token = login(&state, WALLET).await;

        let (status, me) = call(&state, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "ambassador");
        assert_eq!(me["isApproved"], true);

        let (status, created) = call(
            &state,
            "POST",
            "/api/contributions",
            Some(&token),
            Some(serde_json::json!({
                "type": "twitter",
                "url": "https://twitter.com/qubic/status/99"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["points"], 1);
        assert_eq!(created["status"], "approved");

        let (status, stats) =
            call(&state, "GET", &format!("/api/dashboard/{}", WALLET), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalPoints"], 1);
        assert_eq!(stats["userContributions"], 1);
        assert_eq!(stats["userRank"], 1);
        assert_eq!(stats["weeklyGrowth"], 12);

        let (_, activity) =
            call(&state, "GET", &format!("/api/activity/{}", WALLET), None, None).await;
        assert_eq!(activity[0]["description"], "Posted about Qubic on Twitter");

        let (_, board) = call(&state, "GET", "/api/leaderboard?limit=5", None, None).await;
        assert_eq!(board[0]["walletAddress"], WALLET);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let state = test_state();

        let (status, body) = call(&state, "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let token = login(&state, WALLET).await;
        let (status, _) = call(
            &state,
            "POST",
            "/api/contributions",
            Some(&token),
            Some(serde_json::json!({ "type": "medium", "url": "not-a-url" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let duplicate = serde_json::json!({
            "type": "discord",
            "url": "https://discord.com/channels/1/2/3"
        });
        call(&state, "POST", "/api/contributions", Some(&token), Some(duplicate.clone())).await;
        let (status, _) =
            call(&state, "POST", "/api/contributions", Some(&token), Some(duplicate)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &state,
            "PATCH",
            "/api/contributions/1/review",
            Some(&token),
            Some(serde_json::json!({ "status": "rejected" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&state, "GET", "/api/contributions/999", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let state = test_state();
        let token = login(&state, WALLET).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/contributions",
            Some(&token),
            Some(serde_json::json!({ "type": "twitter" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(
            &state,
            "PATCH",
            "/api/contributions/1/review",
            Some(&token),
            Some(serde_json::json!({ "status": "bogus" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = call(
            &state,
            "POST",
            "/api/wallet/connect",
            None,
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recased_connect_does_not_approve() {
        let state = test_state();
        let visitor = "qubic1234visitorwallet";

        let (_, first) = call(
            &state,
            "POST",
            "/api/wallet/connect",
            None,
            Some(serde_json::json!({ "walletAddress": visitor })),
        )
        .await;
        assert_eq!(first["role"], "visitor");

        let (status, second) = call(
            &state,
            "POST",
            "/api/wallet/connect",
            None,
            Some(serde_json::json!({ "walletAddress": visitor.to_uppercase() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["id"], first["id"]);
        assert_eq!(second["role"], "visitor");
        assert_eq!(second["isApproved"], false);
    }

    #[tokio::test]
    async fn test_admin_review_and_logout() {
        let state = test_state();
        let token = login(&state, WALLET).await;
        let admin_token = login(&state, ADMIN_WALLET).await;

        let (_, created) = call(
            &state,
            "POST",
            "/api/contributions",
            Some(&token),
            Some(serde_json::json!({
                "type": "github",
                "url": "https://github.com/qubic/core/pull/5"
            })),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (status, reviewed) = call(
            &state,
            "PATCH",
            &format!("/api/contributions/{}/review", id),
            Some(&admin_token),
            Some(serde_json::json!({ "status": "rejected", "points": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviewed["status"], "rejected");

        let (_, me) = call(&state, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(me["totalPoints"], 0);

        let (status, body) = call(&state, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = call(&state, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
