use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{current_user, respond};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/channels").route(web::get().to(list_channels)))
        .service(web::resource("/api/channels/connect").route(web::post().to(connect_channel)))
        .service(web::resource("/api/channels/{id}/sync").route(web::post().to(sync_channel)))
        .service(
            web::resource("/api/channels/{id}/default-container")
                .route(web::put().to(set_default_container)),
        )
        .service(web::resource("/api/channels/{id}/videos").route(web::get().to(list_videos)))
        .service(web::resource("/api/channels/{id}/search").route(web::get().to(search_videos)))
        .service(web::resource("/api/channels/{id}/metrics").route(web::get().to(channel_metrics)));
}

#[derive(Deserialize)]
struct ConnectRequest {
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultContainerRequest {
    container_id: Option<i64>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Deserialize)]
struct MetricsQuery {
    start: String,
    end: String,
}

async fn list_channels(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.list_channels(user_id))
}

/// OAuth callback: exchange the code and store the channel
async fn connect_channel(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ConnectRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.connect_channel(user_id, &body.code).await)
}

async fn sync_channel(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.request_channel_sync(user_id, path.into_inner()).await)
}

async fn set_default_container(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<DefaultContainerRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state
        .ops
        .set_default_container(user_id, path.into_inner(), body.container_id)
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => super::error_response(&e),
    }
}

async fn list_videos(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.list_videos(user_id, path.into_inner()))
}

async fn search_videos(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .search_channel_videos(user_id, path.into_inner(), &query.q)
            .await,
    )
}

async fn channel_metrics(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<MetricsQuery>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .channel_metrics(user_id, path.into_inner(), &query.start, &query.end)
            .await,
    )
}
