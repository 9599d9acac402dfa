use admission::RateLimiter;
use aggregator::{AggregateError, Aggregator, UserDetails};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub limiter: Arc<RateLimiter>,
}

/// Builds the gateway's route table. The health endpoint is exempt from
/// admission control; `/account/info` is gated by the limiter middleware.
pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/account/info", get(account_info))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_layer,
        ));

    Router::new()
        .route("/", get(health))
        .merge(limited)
        .with_state(state)
}

async fn health() -> &'static str {
    "User profile aggregation gateway. Query /account/info?userid=<id> or /account/info?username=<name>.\n"
}

#[derive(Debug, Deserialize)]
struct AccountInfoParams {
    userid: Option<u64>,
    username: Option<String>,
}

async fn account_info(
    State(state): State<AppState>,
    Query(params): Query<AccountInfoParams>,
) -> Result<Json<UserDetails>, ApiError> {
    let username = params.username.filter(|u| !u.is_empty());

    // The username path wins when both identifiers are supplied.
    let user_id = match (params.userid, username) {
        (_, Some(username)) => state.aggregator.resolve_identifier(&username).await?,
        (Some(id), None) => id,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Either userid or username must be provided".into(),
            ));
        }
    };

    let details = state.aggregator.fetch_details(user_id).await?;
    Ok(Json(details))
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Upstream(String),
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::NotFound => ApiError::NotFound,
            AggregateError::Upstream(cause) => ApiError::Upstream(cause),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            detail: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct RateLimitedBody {
    detail: &'static str,
    reset_in_seconds: u64,
}

/// Admission middleware: rejects over-quota clients with 429 and attaches
/// the rate-limit headers to every response that passes through it.
async fn admission_layer(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    if state.limiter.is_limited(&key) {
        metrics::counter!("gateway.rate_limited").increment(1);
        tracing::warn!(client = %key, "request rejected by admission limiter");

        let reset = state
            .limiter
            .reset_time(&key)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let body = Json(RateLimitedBody {
            detail: "Rate limit exceeded. Try again later.",
            reset_in_seconds: reset,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        attach_rate_limit_headers(&mut response, &state.limiter, &key);
        return response;
    }

    let mut response = next.run(request).await;
    attach_rate_limit_headers(&mut response, &state.limiter, &key);
    response
}

fn attach_rate_limit_headers(response: &mut Response, limiter: &RateLimiter, key: &str) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.limit()));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(limiter.remaining(key)));
    if let Some(reset) = limiter.reset_time(key) {
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset.as_secs()));
    }
}
