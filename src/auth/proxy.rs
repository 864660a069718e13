/*!
 * # Auth Proxy Client
 *
 * Passwords are checked by an external authentication proxy. The service
 * never stores them: it forwards the lowercase hex SHA-256 digest of the
 * password and trusts the proxy's verdict.
 */

use super::AuthError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

/// Body sent to the proxy.
#[derive(Debug, Serialize)]
struct ProxyLoginRequest<'a> {
    username: &'a str,
    password: String,
}

/// Body returned by the proxy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProxyLoginResponse {
    pub success: bool,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Verified identity handed back on a successful proxy login.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyIdentity {
    pub username: String,
    pub employee_id: Option<String>,
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct AuthProxyClient {
    client: Client,
    url: String,
}

impl AuthProxyClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::InternalError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Checks the credentials against the proxy.
    ///
    /// A rejected login maps to `InvalidCredentials`; transport failures and
    /// unreadable replies map to `ProxyError`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<ProxyIdentity, AuthError> {
        let body = ProxyLoginRequest {
            username,
            password: hash_password(password),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Auth proxy unreachable");
                AuthError::ProxyError(e.to_string())
            })?;

        let status = response.status();
        let reply: ProxyLoginResponse = response.json().await.map_err(|e| {
            warn!(%status, error = %e, "Auth proxy returned an unreadable body");
            AuthError::ProxyError(format!("unexpected reply ({})", status))
        })?;

        if !reply.success {
            debug!(username, message = ?reply.message, "Auth proxy rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(ProxyIdentity {
            username: username.to_string(),
            employee_id: reply.employee_id.filter(|e| !e.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn password_digest_is_lowercase_hex() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn forwards_hashed_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({
                "username": "somchai",
                "password": hash_password("secret"),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "employee_id": "E042",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            AuthProxyClient::new(format!("{}/login", server.uri()), Duration::from_secs(5)).unwrap();
        let identity = client.verify("somchai", "secret").await.unwrap();
        assert_eq!(identity.employee_id.as_deref(), Some("E042"));
    }

    #[tokio::test]
    async fn rejection_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "wrong password",
            })))
            .mount(&server)
            .await;

        let client = AuthProxyClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert_matches!(
            client.verify("somchai", "nope").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn garbage_reply_is_a_proxy_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = AuthProxyClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert_matches!(
            client.verify("somchai", "secret").await,
            Err(AuthError::ProxyError(_))
        );
    }
}
