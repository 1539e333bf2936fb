//! REST adapter for the message, assignment and notification services.

use crate::domain::entities::{
    Assignment, ChatMessage, Notification, PageBody, SendMessageRequest, UnreadCountPayload,
};
use crate::domain::errors::{RealtimeError, RealtimeResult};
use crate::domain::ports::assignment_api::AssignmentApi;
use crate::domain::ports::message_api::MessageApi;
use crate::domain::ports::notification_api::NotificationApi;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest error body carried into an error message
const MAX_ERROR_BODY: usize = 500;

#[derive(Clone)]
pub struct RestClient {
    base: Url,
    http: Client,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> RealtimeResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RealtimeError::Validation(format!("invalid API base URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(RealtimeError::Validation(format!(
                "API base URL cannot carry a path: {}",
                base_url
            )));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http, token })
    }

    /// Base URL joined with path segments; each segment is percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> RealtimeResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.text().await {
            Ok(body) if !body.trim().is_empty() => truncate(&body, MAX_ERROR_BODY),
            _ => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        warn!(status = status.as_u16(), "API request failed: {}", message);
        Err(RealtimeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> RealtimeResult<T> {
        debug!(%url, "GET");
        let response = self.execute(self.request(Method::GET, url)).await?;
        Ok(response.json::<T>().await?)
    }

    async fn put_empty(&self, url: Url) -> RealtimeResult<()> {
        debug!(%url, "PUT");
        self.execute(self.request(Method::PUT, url)).await?;
        Ok(())
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}

#[async_trait]
impl MessageApi for RestClient {
    async fn get_conversation(
        &self,
        other_user_id: &str,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<ChatMessage>> {
        let mut url = self.endpoint(&["api", "messages", "conversation", other_user_id]);
        url.query_pairs_mut()
            .append_pair("userId", user_id)
            .append_pair("page", &page.to_string())
            .append_pair("size", &page_size.to_string());
        let body: PageBody<ChatMessage> = self.get_json(url).await?;
        Ok(body.into_items())
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
        user_id: &str,
    ) -> RealtimeResult<ChatMessage> {
        let mut url = self.endpoint(&["api", "messages"]);
        url.query_pairs_mut().append_pair("userId", user_id);
        debug!(%url, "POST");
        let response = self
            .execute(self.request(Method::POST, url).json(request))
            .await?;
        Ok(response.json::<ChatMessage>().await?)
    }

    async fn get_unread_count(&self, user_id: &str) -> RealtimeResult<u64> {
        let mut url = self.endpoint(&["api", "messages", "unread-count"]);
        url.query_pairs_mut().append_pair("userId", user_id);
        let payload: UnreadCountPayload = self.get_json(url).await?;
        Ok(payload.count())
    }

    async fn mark_conversation_as_read(
        &self,
        other_user_id: &str,
        user_id: &str,
    ) -> RealtimeResult<()> {
        let mut url = self.endpoint(&["api", "messages", "conversation", other_user_id, "read"]);
        url.query_pairs_mut().append_pair("userId", user_id);
        self.put_empty(url).await
    }
}

#[async_trait]
impl AssignmentApi for RestClient {
    async fn current_assignment(&self, user_id: &str) -> RealtimeResult<Option<Assignment>> {
        let url = self.endpoint(&["api", "assignments", "user", user_id, "current"]);
        debug!(%url, "GET");
        let response = match self.execute(self.request(Method::GET, url)).await {
            Ok(response) => response,
            Err(RealtimeError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(body)?))
    }

    async fn list_assignments_for_staff(&self, staff_id: &str) -> RealtimeResult<Vec<Assignment>> {
        let url = self.endpoint(&["api", "assignments", "staff", staff_id]);
        let body: PageBody<Assignment> = self.get_json(url).await?;
        Ok(body.into_items().into_iter().filter(|a| a.active).collect())
    }
}

#[async_trait]
impl NotificationApi for RestClient {
    async fn list_notifications(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> RealtimeResult<Vec<Notification>> {
        let mut url = self.endpoint(&["api", "notifications", "user", user_id]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &page_size.to_string());
        let body: PageBody<Notification> = self.get_json(url).await?;
        Ok(body.into_items())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> RealtimeResult<()> {
        let url = self.endpoint(&["api", "notifications", notification_id, "read"]);
        self.put_empty(url).await
    }

    async fn mark_all_read(&self, user_id: &str) -> RealtimeResult<()> {
        let url = self.endpoint(&["api", "notifications", "user", user_id, "read-all"]);
        self.put_empty(url).await
    }
}
