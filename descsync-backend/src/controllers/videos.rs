use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{current_user, error_response, respond};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/videos/assign").route(web::post().to(assign_container)))
        .service(
            web::resource("/api/videos/{id}/variables")
                .route(web::get().to(list_variables))
                .route(web::put().to(save_variables)),
        )
        .service(web::resource("/api/videos/{id}").route(web::delete().to(delete_video)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest {
    video_ids: Vec<i64>,
    container_id: Option<i64>,
}

async fn assign_container(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<AssignRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .assign_container(user_id, &body.video_ids, body.container_id)
            .await,
    )
}

async fn list_variables(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.list_video_variables(user_id, path.into_inner()))
}

/// The body is taken as raw JSON so a non-array payload is a validation error
/// rather than a deserializer rejection
async fn save_variables(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state
        .ops
        .save_video_variables(user_id, path.into_inner(), &body)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

async fn delete_video(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.ops.delete_video(user_id, path.into_inner()).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}
