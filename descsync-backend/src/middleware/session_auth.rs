// Session authentication for protected routes.
// Sessions are issued by the external auth service into `api_sessions`;
// this module only resolves a bearer token to the user it belongs to.

use actix_web::{HttpRequest, HttpResponse};

use crate::db::Database;

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The user id behind the request's session token
pub fn authenticate(db: &Database, req: &HttpRequest) -> Result<i64, HttpResponse> {
    let token = extract_token(req).ok_or_else(|| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "No authorization token provided"
        }))
    })?;

    match db.validate_session(&token) {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_authenticate() {
        let db = Database::new(":memory:").unwrap();
        db.create_session("good-token", 7, chrono::Duration::hours(1)).unwrap();
        db.create_session("old-token", 7, chrono::Duration::hours(-1)).unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer good-token"))
            .to_http_request();
        assert_eq!(authenticate(&db, &req).ok(), Some(7));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer old-token"))
            .to_http_request();
        assert!(authenticate(&db, &req).is_err());

        let req = TestRequest::default().to_http_request();
        assert!(extract_token(&req).is_none());
        assert!(authenticate(&db, &req).is_err());
    }
}
