/// REST collaborators: roster, message history, durable writes, and the
/// session refresh contract.
use crate::error::{ChatError, Result};
use crate::types::{Message, Peer};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

/// The REST surface the messaging core consumes. Implemented by `ApiClient`
/// in production and by in-memory fakes in tests.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Fetch the addressable user list. The local user is included here;
    /// the roster loader filters it out.
    fn fetch_users(&self) -> impl Future<Output = Result<Vec<Peer>>> + Send;

    /// Fetch the ordered message history between the local user and `peer_id`.
    fn fetch_history(&self, peer_id: &str) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Durable write of an outgoing message. The conversation store never
    /// waits for this before updating the view.
    fn store_message(&self, receiver: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// User record as the REST API returns it
#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "firstName")]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<UserRecord>,
}

/// Error body shape used to detect an expired session
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    expired: bool,
}

/// HTTP client for the REST API.
///
/// Carries the session cookie jar and the one resilience policy of the whole
/// application: a 401 response whose body marks the session as expired
/// triggers exactly one silent `POST /refresh-token` followed by one retry of
/// the original request. Nothing else is ever retried automatically.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        let mut attempted_refresh = false;

        loop {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }
            let res = req.send().await?;
            let status = res.status();

            if status == StatusCode::UNAUTHORIZED && !attempted_refresh {
                let error: ErrorBody = res.json().await.unwrap_or_default();
                if error.expired {
                    attempted_refresh = true;
                    debug!("Session expired, attempting silent refresh");
                    let refresh = self.http.post(self.url("refresh-token")).send().await?;
                    if refresh.status().is_success() {
                        continue;
                    }
                    warn!("Session refresh rejected with {}", refresh.status());
                    return Err(ChatError::Session(
                        "refresh-token request rejected".to_string(),
                    ));
                }
                return Err(ChatError::Api(format!("{} {} unauthorized", method, path)));
            }

            if !status.is_success() {
                return Err(ChatError::Api(format!(
                    "{} {} returned {}",
                    method, path, status
                )));
            }

            return Ok(res);
        }
    }
}

impl Backend for ApiClient {
    async fn fetch_users(&self) -> Result<Vec<Peer>> {
        let res = self.request(Method::GET, "users", None).await?;
        let body: UsersResponse = res.json().await?;
        Ok(body
            .users
            .into_iter()
            .map(|u| Peer::new(u.id, u.first_name))
            .collect())
    }

    async fn fetch_history(&self, peer_id: &str) -> Result<Vec<Message>> {
        let res = self
            .request(Method::GET, &format!("message/{}", peer_id), None)
            .await?;
        Ok(res.json().await?)
    }

    async fn store_message(&self, receiver: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "receiver": receiver, "text": text });
        self.request(Method::POST, "message", Some(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_cleanly() {
        let client = ApiClient::new("http://localhost:3000/api/").unwrap();
        assert_eq!(client.url("users"), "http://localhost:3000/api/users");
        assert_eq!(client.url("/message/p1"), "http://localhost:3000/api/message/p1");
    }

    #[test]
    fn test_user_record_field_names() {
        let body: UsersResponse =
            serde_json::from_str(r#"{"users":[{"_id":"u1","firstName":"Ada"}]}"#).unwrap();
        assert_eq!(body.users.len(), 1);
        assert_eq!(body.users[0].id, "u1");
        assert_eq!(body.users[0].first_name, "Ada");
    }

    #[test]
    fn test_error_body_defaults_to_not_expired() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert!(!body.expired);
    }
}
