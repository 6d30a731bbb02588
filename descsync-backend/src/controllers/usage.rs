use actix_web::{web, HttpRequest, Responder};
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::{current_user, respond};
use crate::AppState;
use crate::error::Error;

/// Default reporting window
const DEFAULT_WINDOW_HOURS: i64 = 24;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/usage").route(web::get().to(usage_summary)))
        .service(web::resource("/api/usage/log").route(web::get().to(usage_log)))
        .service(web::resource("/api/plan").route(web::get().to(plan_limits)));
}

#[derive(Deserialize)]
struct UsageQuery {
    hours: Option<i64>,
}

#[derive(Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn usage_summary(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<UsageQuery>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let hours = query.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    if !(1..=24 * 90).contains(&hours) {
        return super::error_response(&Error::Validation(
            "hours must be between 1 and 2160".to_string(),
        ));
    }
    respond(state.ops.usage_summary(user_id, Utc::now() - Duration::hours(hours)))
}

async fn plan_limits(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.plan_limits(user_id))
}

async fn usage_log(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LogQuery>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.recent_usage(user_id, query.limit.unwrap_or(100)))
}
