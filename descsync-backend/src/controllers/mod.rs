pub mod channels;
pub mod health;
pub mod library;
pub mod usage;
pub mod videos;

use actix_web::{HttpRequest, HttpResponse, http::StatusCode, web};
use serde::Serialize;

use crate::AppState;
use crate::error::{Error, Result};
use crate::middleware::session_auth;

/// Resolve the session user or produce the 401 response
pub(crate) fn current_user(state: &web::Data<AppState>, req: &HttpRequest) -> std::result::Result<i64, HttpResponse> {
    session_auth::authenticate(&state.db, req)
}

pub(crate) fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::AccessDenied => StatusCode::FORBIDDEN,
        Error::NotFound(_) | Error::RemoteNotFound(_) => StatusCode::NOT_FOUND,
        Error::LimitReached { .. } | Error::AlreadySyncing(_) => StatusCode::CONFLICT,
        Error::NotConnected | Error::ScopeInsufficient | Error::TokenRefreshFailed(_) => {
            StatusCode::UNAUTHORIZED
        }
        Error::RemoteTransient(_) | Error::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::RemoteError { .. } => StatusCode::BAD_GATEWAY,
        Error::Crypto(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: &Error) -> HttpResponse {
    let status = status_for(error);
    if status.is_server_error() {
        log::error!("Request failed: {}", error);
    }
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": error.to_string(),
        "kind": error.kind(),
        "reconnect": error.requires_reconnect(),
    }))
}

/// 200 with the serialized value, or the mapped error
pub(crate) fn respond<T: Serialize>(result: Result<T>) -> HttpResponse {
    match result {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LimitedResource, PlanTier};

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::AlreadySyncing(1)), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::LimitReached {
                resource: LimitedResource::Channels,
                limit: 1,
                tier: PlanTier::Free
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&Error::ScopeInsufficient), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&Error::RemoteTransient("429".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&Error::RemoteError {
                status: Some(400),
                message: "bad".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
