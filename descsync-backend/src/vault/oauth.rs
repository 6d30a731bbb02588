//! OAuth token endpoint: authorization-code exchange and refresh

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::gateway::RemoteFailure;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Present on first authorization and when the provider rotates it
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
}

impl TokenGrant {
    pub fn has_scope(&self, required: &str) -> bool {
        match &self.scope {
            Some(scope) => scope.split_whitespace().any(|s| s == required),
            // Providers omit the scope when it matches the request
            None => true,
        }
    }
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, RemoteFailure>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RemoteFailure>;
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        token_url: Option<&str>,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            token_url: token_url.unwrap_or(DEFAULT_TOKEN_URL).to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenGrant, RemoteFailure> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| RemoteFailure::network(format!("Token endpoint request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteFailure::network(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<OAuthErrorResponse>(&text) {
                Ok(err) => RemoteFailure::http(
                    status.as_u16(),
                    Some(err.error.clone()),
                    err.error_description.unwrap_or(err.error),
                ),
                Err(_) => RemoteFailure::http(status.as_u16(), None, text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| RemoteFailure::malformed(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, RemoteFailure> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RemoteFailure> {
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(scope: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: "a".into(),
            expires_in: 3600,
            refresh_token: None,
            scope: scope.map(str::to_string),
        }
    }

    #[test]
    fn test_has_scope() {
        let required = "https://www.googleapis.com/auth/youtube.force-ssl";
        assert!(grant(Some("openid https://www.googleapis.com/auth/youtube.force-ssl")).has_scope(required));
        assert!(!grant(Some("https://www.googleapis.com/auth/youtube.readonly")).has_scope(required));
        assert!(grant(None).has_scope(required));
    }

    #[test]
    fn test_parse_grant() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"ya29.x","expires_in":3599,"token_type":"Bearer","scope":"s"}"#,
        )
        .unwrap();
        assert_eq!(grant.access_token, "ya29.x");
        assert_eq!(grant.expires_in, 3599);
        assert!(grant.refresh_token.is_none());
    }
}
