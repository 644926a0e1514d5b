use actix_web::{HttpRequest, HttpResponse, get, post, web};
use downdetector::ServiceId;
use downdetector::stats::window_stats;
use serde::Deserialize;

use crate::api::{ApiError, AppState};

macros_utils::routes! {
    route ping_service,
    route service_stats,
}

const OWNER_HEADER: &str = "X-Owner-Id";
const DEFAULT_STATS_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub exclude_timeouts: bool,
}

fn caller(req: &HttpRequest) -> Result<&str, ApiError> {
    req.headers()
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingCaller)
}

/// Probe a single service on behalf of its owner
#[post("/services/{id}/ping")]
pub async fn ping_service(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<ServiceId>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller(&req)?;
    let outcome = state.scheduler.engine().ping_service(caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Uptime and latency over the latest pings of a service
#[get("/services/{id}/stats")]
pub async fn service_stats(
    state: web::Data<AppState>,
    path: web::Path<ServiceId>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_STATS_LIMIT);
    let exclude = query.exclude_timeouts.then_some(state.probe_timeout_ms);
    let stats = window_stats(state.metrics.as_ref(), path.into_inner(), limit, exclude).await?;
    Ok(HttpResponse::Ok().json(stats))
}
