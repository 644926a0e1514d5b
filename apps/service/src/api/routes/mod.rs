use actix_web::web::ServiceConfig;

mod health;
mod runs;
mod services;

/// Register every route of the control API
pub fn routes(cfg: &mut ServiceConfig) {
    health::routes(cfg);
    runs::routes(cfg);
    services::routes(cfg);
}
