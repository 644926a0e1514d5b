use actix_web::{HttpResponse, get, post, put, web};
use downdetector::RunPhase;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiError, AppState};

macros_utils::routes! {
    route trigger_run,
    route change_interval,
    route scheduler_status,
}

#[derive(Debug, Deserialize)]
pub struct IntervalBody {
    pub seconds: u64,
}

#[derive(Debug, Serialize)]
struct SchedulerStatus {
    running: bool,
    interval_seconds: u64,
    phase: RunPhase,
    completed_runs: u64,
}

/// Run every probe now, or join the run already in progress
#[post("/ping")]
pub async fn trigger_run(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let report = state.scheduler.trigger_now().await?;
    Ok(HttpResponse::Ok().json(report))
}

#[put("/interval")]
pub async fn change_interval(
    state: web::Data<AppState>,
    body: web::Json<IntervalBody>,
) -> Result<HttpResponse, ApiError> {
    state.scheduler.set_interval(body.seconds)?;
    info!("Probe interval set to {}s", body.seconds);
    Ok(HttpResponse::NoContent().finish())
}

#[get("/status")]
pub async fn scheduler_status(state: web::Data<AppState>) -> HttpResponse {
    let engine = state.scheduler.engine();
    HttpResponse::Ok().json(SchedulerStatus {
        running: state.scheduler.is_running(),
        interval_seconds: state.scheduler.interval().as_secs(),
        phase: engine.phase(),
        completed_runs: engine.completed_runs(),
    })
}
