//! Messaging client backed by an external protocol gateway.
//!
//! The gateway speaks the upstream wire protocol; this client only exchanges
//! JSON with it. Every request is a `POST {base}/v1/{method}` carrying the
//! application credentials and the current session blob (base64). Successful
//! responses return the (possibly updated) blob and a method-specific
//! `result`; failures return the upstream RPC error name:
//!
//! ```json
//! { "error": "FLOOD_WAIT_30", "code": 420, "seconds": 30 }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::config::ApiCredentials;
use crate::session::{SessionStore, is_temp_session_name};
use crate::{Error, Result};

use super::{
    ClientError, ClientFactory, IncomingMessage, MessagingClient, SelfIdentity, classify_rpc_error,
};

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuthorizedResult {
    authorized: bool,
}

#[derive(Debug, Deserialize)]
struct SentCodeResult {
    phone_code_hash: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResult {
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    text: Option<String>,
    /// Unix seconds.
    date: i64,
}

/// Client for one session, talking to the gateway.
pub struct GatewayClient {
    http: Client,
    base: Url,
    api: ApiCredentials,
    session_name: String,
    store: Arc<dyn SessionStore>,
    /// Current blob; `None` until connected.
    blob: Option<Vec<u8>>,
    phone_code_hash: Option<String>,
}

impl GatewayClient {
    pub fn new(
        http: Client,
        base: Url,
        api: ApiCredentials,
        session_name: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            http,
            base,
            api,
            session_name: session_name.into(),
            store,
            blob: None,
            phone_code_hash: None,
        }
    }

    async fn call<T: DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: Value,
    ) -> std::result::Result<T, ClientError> {
        let url = self
            .base
            .join(&format!("v1/{method}"))
            .map_err(|e| ClientError::Protocol(format!("bad gateway url: {e}")))?;

        let mut body = json!({
            "api_id": self.api.api_id,
            "api_hash": self.api.api_hash,
            "session": self.blob.as_deref().map(|b| BASE64.encode(b)),
        });
        if let (Value::Object(body), Value::Object(params)) = (&mut body, params) {
            body.extend(params);
        }

        let response: GatewayResponse = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(name) = response.error {
            return Err(classify_rpc_error(
                response.code.unwrap_or(400),
                &name,
                response.seconds,
            ));
        }

        if let Some(session) = response.session {
            let bytes = BASE64
                .decode(session.as_bytes())
                .map_err(|e| ClientError::Protocol(format!("invalid session encoding: {e}")))?;
            self.blob = Some(bytes);
        }

        serde_json::from_value(response.result)
            .map_err(|e| ClientError::Protocol(format!("unexpected {method} result: {e}")))
    }

    async fn persist(&self) -> std::result::Result<(), ClientError> {
        if let Some(blob) = &self.blob {
            self.store.save(&self.session_name, blob).await?;
        }
        Ok(())
    }

    fn ensure_connected(&self) -> std::result::Result<(), ClientError> {
        if self.blob.is_none() {
            return Err(ClientError::Protocol("client is not connected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for GatewayClient {
    #[instrument(skip(self), fields(session = %self.session_name))]
    async fn connect(&mut self) -> std::result::Result<(), ClientError> {
        // Only a login in flight may start from nothing; a published session
        // whose blob is gone has been deleted.
        let blob = match self.store.load(&self.session_name).await? {
            Some(blob) => blob,
            None if is_temp_session_name(&self.session_name) => Vec::new(),
            None => return Err(ClientError::Unauthorized),
        };
        self.blob = Some(blob);
        let _: Value = self.call("connect", json!({})).await?;
        self.persist().await?;
        debug!("Connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> std::result::Result<(), ClientError> {
        if self.blob.is_none() {
            return Ok(());
        }
        let persisted = self.persist().await;
        self.blob = None;
        self.phone_code_hash = None;
        persisted
    }

    async fn is_authorized(&mut self) -> std::result::Result<bool, ClientError> {
        self.ensure_connected()?;
        match self.call::<AuthorizedResult>("is_authorized", json!({})).await {
            Ok(r) => Ok(r.authorized),
            Err(ClientError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn request_code(&mut self, phone: &str) -> std::result::Result<(), ClientError> {
        self.ensure_connected()?;
        let sent: SentCodeResult = self.call("send_code", json!({ "phone": phone })).await?;
        self.phone_code_hash = Some(sent.phone_code_hash);
        Ok(())
    }

    async fn sign_in(&mut self, phone: &str, code: &str) -> std::result::Result<(), ClientError> {
        self.ensure_connected()?;
        let hash = self
            .phone_code_hash
            .clone()
            .ok_or_else(|| ClientError::Protocol("sign_in before request_code".to_string()))?;
        let _: Value = self
            .call(
                "sign_in",
                json!({ "phone": phone, "code": code.trim(), "phone_code_hash": hash }),
            )
            .await?;
        self.persist().await
    }

    async fn check_password(&mut self, password: &str) -> std::result::Result<(), ClientError> {
        self.ensure_connected()?;
        let _: Value = self
            .call("check_password", json!({ "password": password }))
            .await?;
        self.persist().await
    }

    async fn recent_messages(
        &mut self,
        sender_id: i64,
        limit: usize,
    ) -> std::result::Result<Vec<IncomingMessage>, ClientError> {
        self.ensure_connected()?;
        let result: MessagesResult = self
            .call(
                "get_messages",
                json!({ "peer_id": sender_id, "limit": limit }),
            )
            .await?;

        Ok(result
            .messages
            .into_iter()
            .filter_map(|m| {
                let date = DateTime::<Utc>::from_timestamp(m.date, 0)?;
                Some(IncomingMessage {
                    text: m.text.unwrap_or_default(),
                    date,
                })
            })
            .collect())
    }

    async fn get_self(&mut self) -> std::result::Result<SelfIdentity, ClientError> {
        self.ensure_connected()?;
        self.call("get_me", json!({})).await
    }
}

/// Builds [`GatewayClient`]s that share one HTTP connection pool.
pub struct GatewayClientFactory {
    http: Client,
    base: Url,
    api: ApiCredentials,
    store: Arc<dyn SessionStore>,
}

impl GatewayClientFactory {
    pub fn new(base_url: &str, api: ApiCredentials, store: Arc<dyn SessionStore>) -> Result<Self> {
        Ok(Self {
            http: Client::new(),
            base: parse_base_url(base_url)?,
            api,
            store,
        })
    }
}

impl ClientFactory for GatewayClientFactory {
    fn create(&self, session_name: &str) -> Box<dyn MessagingClient> {
        Box::new(GatewayClient::new(
            self.http.clone(),
            self.base.clone(),
            self.api.clone(),
            session_name,
            Arc::clone(&self.store),
        ))
    }
}

/// Parse the gateway base URL, ensuring it ends with `/` so joins keep the path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| Error::config(format!("invalid GATEWAY_URL {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileSessionStore;

    #[tokio::test]
    async fn test_connect_to_missing_published_session_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::open(dir.path()).await.unwrap());
        // Nothing listens here; the request must never be made.
        let mut client = GatewayClient::new(
            Client::new(),
            parse_base_url("http://127.0.0.1:9").unwrap(),
            ApiCredentials {
                api_id: 1,
                api_hash: "hash".to_string(),
            },
            "user_42_10000000001",
            Arc::clone(&store),
        );

        assert!(client.connect().await.unwrap_err().is_unauthorized());
        client.disconnect().await.unwrap();
        assert!(!store.exists("user_42_10000000001").await.unwrap());
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let base = parse_base_url("http://gateway:8081/mtproto").unwrap();
        assert_eq!(
            base.join("v1/send_code").unwrap().as_str(),
            "http://gateway:8081/mtproto/v1/send_code"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_error_response_parses() {
        let raw = r#"{"error":"PHONE_CODE_INVALID","code":400}"#;
        let response: GatewayResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.error.as_deref(), Some("PHONE_CODE_INVALID"));
        assert!(response.session.is_none());
        assert!(response.result.is_null());
    }

    #[test]
    fn test_messages_result_parses_missing_text() {
        let raw = r#"{"messages":[{"text":"Login code: 12345","date":1760000000},{"date":1760000001}]}"#;
        let result: MessagesResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.messages.len(), 2);
        assert!(result.messages[1].text.is_none());
    }
}
