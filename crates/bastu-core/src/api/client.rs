//! API client for the club's hosted backend.
//!
//! The backend exposes auto-generated REST endpoints per table, RPC
//! endpoints for stored procedures, one-time-password auth and a couple of
//! edge functions. This module wraps them in typed methods.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::access::AccessEventQuery;
use crate::auth::{AdminSession, Contact};
use crate::models::{
    AccessEvent, ChatMessage, Member, MemberRelation, SendReport, SmsGroup, SmsMessage, VisitStats,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on rows requested from the message log in one call.
const MESSAGE_PAGE_SIZE: usize = 500;

/// Query parameters, already in PostgREST filter syntax.
pub type Params = Vec<(&'static str, String)>;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    recipients: &'a [String],
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    reply: String,
}

/// API client for the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    anon_key: Arc<str>,
    token: Option<Arc<String>>,
}

impl ApiClient {
    /// Create a new API client for a project URL and its public anon key.
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            anon_key: Arc::from(anon_key),
            token: None,
        })
    }

    /// Create a client acting for `session`, sharing the connection pool.
    pub fn with_session(&self, session: &AdminSession) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            anon_key: Arc::clone(&self.anon_key),
            token: Some(Arc::new(session.access_token.clone())),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    // ===== URLs =====

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    pub fn function_url(&self, function: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, function)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(&self.anon_key)?);
        let bearer = self
            .token
            .as_deref()
            .map(String::as_str)
            .unwrap_or(&*self.anon_key);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", bearer))?,
        );
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        params: &[(&'static str, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.auth_headers()?)
                .query(params);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, params: &[(&'static str, String)]) -> Result<T> {
        let response = self.send::<()>(Method::GET, url, params, None).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<T> {
        let response = self.send(Method::POST, url, &[], Some(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// POST where the response body carries nothing of interest.
    async fn post_discard<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        self.send(Method::POST, url, &[], Some(body)).await?;
        Ok(())
    }

    // ===== Generic table and procedure access =====

    /// Read rows from a table. `params` use PostgREST syntax, e.g. `("status", "eq.KÖANDE")`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<T>> {
        let rows: Vec<T> = self.get(&self.rest_url(table), params).await?;
        debug!(table = table, count = rows.len(), "Rows fetched");
        Ok(rows)
    }

    /// Call a stored procedure by name.
    pub async fn rpc<T: DeserializeOwned, B: Serialize + ?Sized>(&self, function: &str, args: &B) -> Result<T> {
        self.post(&self.rpc_url(function), args)
            .await
            .with_context(|| format!("Procedure {} failed", function))
    }

    // ===== Authentication =====

    /// Ask the backend to send a one-time login code.
    pub async fn request_otp(&self, contact: &Contact) -> Result<()> {
        let body = match contact {
            Contact::Phone(phone) => serde_json::json!({ "phone": phone, "create_user": false }),
            Contact::Email(email) => serde_json::json!({ "email": email, "create_user": false }),
        };
        self.post_discard(&self.auth_url("otp"), &body)
            .await
            .context("Failed to request login code")
    }

    /// Exchange a one-time code for a session.
    pub async fn verify_otp(&self, contact: &Contact, code: &str) -> Result<AdminSession> {
        let body = match contact {
            Contact::Phone(phone) => {
                serde_json::json!({ "type": "sms", "phone": phone, "token": code })
            }
            Contact::Email(email) => {
                serde_json::json!({ "type": "email", "email": email, "token": code })
            }
        };
        let auth: AuthResponse = self
            .post(&self.auth_url("verify"), &body)
            .await
            .context("Failed to verify login code")?;
        Ok(Self::session_from_auth(auth, contact.clone(), Utc::now()))
    }

    /// Trade a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str, contact: &Contact) -> Result<AdminSession> {
        let url = self.auth_url("token");
        let response = self
            .send(
                Method::POST,
                &url,
                &[("grant_type", "refresh_token".to_string())],
                Some(&serde_json::json!({ "refresh_token": refresh_token })),
            )
            .await
            .context("Failed to refresh session")?;
        let auth: AuthResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;
        Ok(Self::session_from_auth(auth, contact.clone(), Utc::now()))
    }

    fn session_from_auth(auth: AuthResponse, contact: Contact, now: DateTime<Utc>) -> AdminSession {
        AdminSession {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user_id: auth.user.id,
            contact,
            expires_at: now + chrono::Duration::seconds(auth.expires_in),
        }
    }

    /// Whether the current session belongs to an administrator.
    pub async fn is_admin(&self) -> Result<bool> {
        self.rpc("is_admin", &serde_json::json!({})).await
    }

    // ===== Member directory =====

    /// Fetch all member rows, without enrichment.
    pub async fn fetch_members(&self) -> Result<Vec<Member>> {
        self.select(
            "members",
            &[
                ("select", "*".to_string()),
                ("order", "customer_number.asc".to_string()),
            ],
        )
        .await
        .context("Failed to fetch members")
    }

    /// Fetch visit aggregates for every member.
    pub async fn fetch_visit_stats(&self) -> Result<Vec<VisitStats>> {
        self.rpc("member_visit_stats", &serde_json::json!({})).await
    }

    /// Fetch medbadare links.
    pub async fn fetch_relations(&self) -> Result<Vec<MemberRelation>> {
        self.select(
            "member_relations",
            &[
                ("select", "member_id,related_member_id".to_string()),
                ("relation_type", "eq.medbadare".to_string()),
            ],
        )
        .await
        .context("Failed to fetch member relations")
    }

    // ===== Access events =====

    pub async fn fetch_access_events(&self, query: &AccessEventQuery) -> Result<Vec<AccessEvent>> {
        self.select("access_events", &query.to_params())
            .await
            .context("Failed to fetch access events")
    }

    // ===== SMS =====

    pub async fn fetch_sms_groups(&self) -> Result<Vec<SmsGroup>> {
        self.select(
            "sms_groups",
            &[
                (
                    "select",
                    "id,name,description,kind,sms_group_members(member_id)".to_string(),
                ),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
        .context("Failed to fetch SMS groups")
    }

    /// Fetch the message log, oldest first, optionally only after `since`.
    pub async fn fetch_sms_messages(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SmsMessage>> {
        let mut params: Params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.asc".to_string()),
            ("limit", MESSAGE_PAGE_SIZE.to_string()),
        ];
        if let Some(since) = since {
            params.push(("created_at", format!("gt.{}", since.to_rfc3339())));
        }
        self.select("sms_messages", &params)
            .await
            .context("Failed to fetch SMS messages")
    }

    /// Send one message body to every recipient (E.164 numbers).
    pub async fn send_sms(&self, recipients: &[String], message: &str) -> Result<SendReport> {
        let report: SendReport = self
            .post(
                &self.function_url("send-sms"),
                &SendSmsRequest {
                    recipients,
                    message,
                },
            )
            .await
            .context("Failed to send SMS")?;
        debug!(sent = report.sent, failed = report.failed.len(), "SMS dispatched");
        Ok(report)
    }

    // ===== AI chat =====

    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let response: ChatResponse = self
            .post(&self.function_url("ai-chat"), &ChatRequest { messages })
            .await
            .context("Chat request failed")?;
        Ok(response.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let api = ApiClient::new("https://abc.example.co/", "anon").unwrap();
        assert_eq!(api.rest_url("members"), "https://abc.example.co/rest/v1/members");
        assert_eq!(api.rpc_url("is_admin"), "https://abc.example.co/rest/v1/rpc/is_admin");
        assert_eq!(api.function_url("send-sms"), "https://abc.example.co/functions/v1/send-sms");
        assert_eq!(api.auth_url("otp"), "https://abc.example.co/auth/v1/otp");
    }

    #[test]
    fn test_auth_headers_fall_back_to_anon_key() {
        let api = ApiClient::new("https://abc.example.co", "anon-key").unwrap();
        let headers = api.auth_headers().unwrap();
        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer anon-key");
        assert!(!api.is_authenticated());
    }

    #[test]
    fn test_with_session_uses_access_token() {
        let api = ApiClient::new("https://abc.example.co", "anon-key").unwrap();
        let session = AdminSession {
            access_token: "jwt".to_string(),
            refresh_token: "r".to_string(),
            user_id: "u".to_string(),
            contact: Contact::Phone("+46701234567".to_string()),
            expires_at: Utc::now(),
        };
        let authed = api.with_session(&session);
        let headers = authed.auth_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer jwt");
        assert_eq!(headers["apikey"], "anon-key");
        assert!(authed.is_authenticated());
    }

    #[test]
    fn test_session_from_auth_sets_expiry() {
        let auth: AuthResponse = serde_json::from_str(
            r#"{"access_token": "a", "token_type": "bearer", "expires_in": 3600,
                "refresh_token": "r", "user": {"id": "u1", "phone": "46701234567"}}"#,
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let session =
            ApiClient::session_from_auth(auth, Contact::Phone("+46701234567".to_string()), now);
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.expires_at, now + chrono::Duration::hours(1));
    }
}
