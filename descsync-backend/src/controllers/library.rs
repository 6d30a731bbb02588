//! Template and container routes

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{current_user, error_response, respond};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/templates")
            .route(web::get().to(list_templates))
            .route(web::post().to(create_template)),
    )
    .service(
        web::resource("/api/templates/{id}")
            .route(web::put().to(update_template))
            .route(web::delete().to(delete_template)),
    )
    .service(web::resource("/api/containers").route(web::post().to(create_container)))
    .service(
        web::resource("/api/containers/{id}")
            .route(web::put().to(update_container))
            .route(web::delete().to(delete_container)),
    );
}

#[derive(Deserialize)]
struct TemplateRequest {
    name: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerRequest {
    name: String,
    #[serde(default)]
    template_ids: Vec<i64>,
}

async fn list_templates(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.list_templates(user_id))
}

async fn create_template(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<TemplateRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(state.ops.save_template(user_id, None, &body.name, &body.content).await)
}

async fn update_template(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<TemplateRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .save_template(user_id, Some(path.into_inner()), &body.name, &body.content)
            .await,
    )
}

async fn delete_template(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.ops.delete_template(user_id, path.into_inner()).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

async fn create_container(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ContainerRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .save_container(user_id, None, &body.name, &body.template_ids)
            .await,
    )
}

async fn update_container(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<ContainerRequest>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        state
            .ops
            .save_container(user_id, Some(path.into_inner()), &body.name, &body.template_ids)
            .await,
    )
}

async fn delete_container(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let user_id = match current_user(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.ops.delete_container(user_id, path.into_inner()) {
        Ok(detached) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "detachedVideoIds": detached
        })),
        Err(e) => error_response(&e),
    }
}
