use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Request body for the downstream matrix gateway send endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub contact: String,
    pub platform_name: String,
    pub text: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub message_id: String,
}

/// Client for the downstream gateway that actually delivers a message to a
/// contact. Any non-2xx response is surfaced as `DispatchError::GatewayStatus`.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn send_message(
        &self,
        device_id: &str,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, DispatchError>;
}

/// `reqwest`-backed implementation. Timeout and base URL are fixed at
/// construction; never mutates the request it's given.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DispatchError::Gateway(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn send_message(
        &self,
        device_id: &str,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, DispatchError> {
        let url = format!(
            "{}/api/v1/devices/{}/message",
            self.base_url.trim_end_matches('/'),
            device_id
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::GatewayStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SendMessageResponse>()
            .await
            .map_err(|e| DispatchError::Gateway(e.to_string()))
    }
}
