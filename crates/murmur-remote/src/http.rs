use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use murmur_storage_traits::{
    BackendError, Contact, ConversationSummary, Message, MessageBackend, MessageId, Profile,
    UserId,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// [`MessageBackend`] speaking the hosted REST API.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

#[derive(Debug, serde::Serialize)]
struct CreateMessageRequest<'a> {
    receiver_email: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct UnreadCountResponse {
    unread_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url).with_context(|| format!("parse api url {base_url}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("api url cannot be a base: {base_url}");
        }
        // Keep any path prefix, but without a trailing slash so segments append cleanly.
        let trimmed = base.path().trim_end_matches('/').to_string();
        base.set_path(&trimmed);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Transient(format!("bad base url {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> Result<T, BackendError> {
        let resp = Self::check(resp, what).await?;
        resp.json::<T>()
            .await
            .map_err(|e| BackendError::Transient(format!("decode {what}: {e}")))
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or(text);
        Err(map_status(status, &format!("{what}: {detail}")))
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn map_status(status: StatusCode, detail: &str) -> BackendError {
    let detail = format!("{} {detail}", status.as_u16());
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BackendError::Validation(detail)
        }
        StatusCode::UNAUTHORIZED => BackendError::Auth(detail),
        StatusCode::FORBIDDEN => BackendError::Forbidden(detail),
        StatusCode::NOT_FOUND => BackendError::NotFound(detail),
        _ => BackendError::Transient(detail),
    }
}

fn network(what: &str, e: reqwest::Error) -> BackendError {
    BackendError::Transient(format!("{what}: {e}"))
}

#[async_trait]
impl MessageBackend for HttpBackend {
    async fn fetch_conversation(
        &self,
        user: &UserId,
        peer: &UserId,
    ) -> Result<Vec<Message>, BackendError> {
        let url = self.url(&["api", "messages", "conversation", peer.as_str()])?;
        let resp = self
            .client
            .get(url)
            .query(&[("user_email", user.as_str())])
            .send()
            .await
            .map_err(|e| network("fetch conversation", e))?;
        let mut history: Vec<Message> = Self::read_json(resp, "fetch conversation").await?;
        history.sort_by_key(|m| m.created_at);
        Ok(history)
    }

    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<Message, BackendError> {
        let url = self.url(&["api", "messages", ""])?;
        let body = CreateMessageRequest {
            receiver_email: receiver.as_str(),
            content,
        };
        let resp = self
            .client
            .post(url)
            .query(&[("sender_email", sender.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| network("create message", e))?;
        Self::read_json(resp, "create message").await
    }

    async fn mark_read(&self, id: &MessageId, user: &UserId) -> Result<(), BackendError> {
        let url = self.url(&["api", "messages", id.as_str(), "read"])?;
        let resp = self
            .client
            .put(url)
            .query(&[("user_email", user.as_str())])
            .send()
            .await
            .map_err(|e| network("mark read", e))?;
        Self::check(resp, "mark read").await?;
        Ok(())
    }

    async fn unread_count(&self, user: &UserId) -> Result<u64, BackendError> {
        let url = self.url(&["api", "messages", "unread-count"])?;
        let resp = self
            .client
            .get(url)
            .query(&[("user_email", user.as_str())])
            .send()
            .await
            .map_err(|e| network("unread count", e))?;
        let body: UnreadCountResponse = Self::read_json(resp, "unread count").await?;
        Ok(body.unread_count)
    }

    async fn fetch_directory(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        let url = self.url(&["api", "messages", "conversations"])?;
        let resp = self
            .client
            .get(url)
            .query(&[("user_email", user.as_str())])
            .send()
            .await
            .map_err(|e| network("fetch directory", e))?;
        let mut dir: Vec<ConversationSummary> = Self::read_json(resp, "fetch directory").await?;
        dir.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(dir)
    }

    async fn fetch_profile(&self, user: &UserId) -> Result<Profile, BackendError> {
        let url = self.url(&["api", "profiles", user.as_str()])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network("fetch profile", e))?;
        Self::read_json(resp, "fetch profile").await
    }

    async fn list_users(&self) -> Result<Vec<Contact>, BackendError> {
        let url = self.url(&["api", "auth", "users"])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network("list users", e))?;
        Self::read_json(resp, "list users").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "self"),
            BackendError::Validation(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, ""),
            BackendError::Forbidden(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, ""),
            BackendError::NotFound(_)
        ));
        let err = map_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "transient error: 500 boom");
    }

    #[test]
    fn test_urls_escape_identities() {
        let backend =
            HttpBackend::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        let url = backend
            .url(&["api", "messages", "conversation", "a b/c@x.io"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/messages/conversation/a%20b%2Fc@x.io"
        );
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let backend = HttpBackend::new("https://host/v2/", Duration::from_secs(5)).unwrap();
        let url = backend.url(&["api", "messages", ""]).unwrap();
        assert_eq!(url.as_str(), "https://host/v2/api/messages/");
    }
}
