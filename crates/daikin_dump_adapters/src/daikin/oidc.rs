use daikin_dump_core::config::CloudSettings;
use daikin_dump_core::entities::{now_epoch_secs, Credentials, TokenSet};
use daikin_dump_core::error::AuthError;
use daikin_dump_core::Error;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::network::send_with_retries;

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    id_token: Option<String>,
    scope: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// OAuth2 error response body
#[derive(Debug, Deserialize)]
struct OauthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Token endpoint client for the Daikin identity provider
pub struct OidcClient {
    client: Client,
    idp_base_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    retries: u32,
}

impl OidcClient {
    pub fn new(client: Client, cloud: &CloudSettings) -> Self {
        Self {
            client,
            idp_base_url: cloud.idp_base_url.trim_end_matches('/').to_string(),
            client_id: cloud.client_id.clone(),
            client_secret: cloud.client_secret.clone(),
            scope: cloud.scope.clone(),
            retries: cloud.communication_retries,
        }
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.idp_base_url)
    }

    /// Authorization page the operator is sent to for interactive login
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, Error> {
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.idp_base_url),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", self.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| Error::Configuration(format!("invalid identity provider URL: {}", e)))?;
        Ok(url.to_string())
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn password_grant(&self, credentials: &Credentials) -> Result<TokenSet, Error> {
        let token_set = self
            .request_token(
                &[
                    ("grant_type", "password"),
                    ("username", credentials.email.as_str()),
                    ("password", credentials.password.as_str()),
                    ("scope", self.scope.as_str()),
                ],
                "password login",
            )
            .await?;
        info!("direct login successful");
        Ok(token_set)
    }

    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, Error> {
        let token_set = self
            .request_token(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                ],
                "authorization code exchange",
            )
            .await?;
        info!("authorization code exchanged for tokens");
        Ok(token_set)
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, Error> {
        let mut token_set = self
            .request_token(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
                "token refresh",
            )
            .await?;

        // Providers may omit the refresh token when it is not rotated.
        if token_set.refresh_token.is_none() {
            token_set.refresh_token = Some(refresh_token.to_string());
        }
        debug!(expires_at = ?token_set.expires_at, "token set refreshed");
        Ok(token_set)
    }

    async fn request_token(&self, params: &[(&str, &str)], what: &str) -> Result<TokenSet, Error> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.client_id.as_str()));
        if !self.client_secret.is_empty() {
            form.push(("client_secret", self.client_secret.as_str()));
        }

        let request = self.client.post(self.token_url()).form(&form);
        let response = send_with_retries(request, self.retries, what).await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read {} response: {}", what, e)))?;

        parse_token_response(status, &body, now_epoch_secs())
    }
}

/// Turn a token endpoint response into a token set or a typed error.
fn parse_token_response(status: StatusCode, body: &str, now: i64) -> Result<TokenSet, Error> {
    if status.is_success() {
        let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
            Error::InvalidServerResponse(format!("malformed token response: {}", e))
        })?;

        return Ok(TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: response.expires_in.map(|secs| now + secs),
            id_token: response.id_token,
            scope: response.scope,
            extra: response.extra,
        });
    }

    if let Ok(error) = serde_json::from_str::<OauthErrorResponse>(body) {
        warn!(status = %status, error = %error.error, "token request rejected");
        return Err(Error::Authentication(AuthError::from_oauth(
            &error.error,
            error.error_description.as_deref(),
        )));
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication(AuthError::InvalidCredentials));
    }

    Err(Error::InvalidServerResponse(format!(
        "token endpoint returned {}",
        status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn oidc_client() -> OidcClient {
        let mut cloud = CloudSettings::default();
        cloud.client_id = "my-client".to_string();
        OidcClient::new(Client::new(), &cloud)
    }

    #[test]
    fn test_authorize_url() {
        let url = oidc_client()
            .authorize_url("http://127.0.0.1:8888/callback", "abc123")
            .unwrap();
        let url = Url::parse(&url).unwrap();

        assert_eq!(url.host_str(), Some("idp.onecta.daikineurope.com"));
        assert_eq!(url.path(), "/v1/oidc/authorize");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "my-client".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://127.0.0.1:8888/callback".to_string()
        )));
        assert!(pairs.contains(&("state".to_string(), "abc123".to_string())));
    }

    #[test]
    fn test_parse_success_response() {
        let body = json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid",
            "session_state": "s1"
        })
        .to_string();

        let token_set = parse_token_response(StatusCode::OK, &body, 1_000).unwrap();

        assert_eq!(token_set.access_token, "at");
        assert_eq!(token_set.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token_set.expires_at, Some(4_600));
        assert_eq!(token_set.extra.get("session_state"), Some(&json!("s1")));
        assert!(!token_set.extra.contains_key("expires_in"));
    }

    #[rstest]
    #[case::invalid_grant(
        StatusCode::BAD_REQUEST,
        r#"{"error":"invalid_grant","error_description":"Invalid user credentials"}"#
    )]
    #[case::bare_unauthorized(StatusCode::UNAUTHORIZED, "")]
    fn test_parse_rejected_credentials(#[case] status: StatusCode, #[case] body: &str) {
        let err = parse_token_response(status, body, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication(AuthError::InvalidCredentials)
        ));
    }

    #[rstest]
    #[case::html_gateway_error(StatusCode::BAD_GATEWAY, "<html>oops</html>")]
    #[case::success_without_token(StatusCode::OK, "{}")]
    fn test_parse_unusable_response(#[case] status: StatusCode, #[case] body: &str) {
        let err = parse_token_response(status, body, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidServerResponse(_)));
    }
}
