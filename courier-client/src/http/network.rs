//! HTTP implementation of the delivery API

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::client::ErrorBody;
use shared::models::decode_orders;
use shared::{
    ApiResponse, DeliveryOrder, LocationReport, LoginRequest, LoginResponse, StatusUpdateRequest,
};

use super::{DeliveryApi, paths};
use crate::config::{AuthHeader, ClientConfig};
use crate::error::{ClientError, ClientResult};

/// Network delivery API client
#[derive(Debug, Clone)]
pub struct NetworkDeliveryApi {
    client: Client,
    api_root: String,
    auth_header: AuthHeader,
}

impl NetworkDeliveryApi {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        // No request timeout: calls rely on the transport default
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            api_root: config.api_root.trim_end_matches('/').to_string(),
            auth_header: config.auth_header.clone(),
        })
    }

    /// REST root
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path)
    }

    fn authorize(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        match &self.auth_header {
            AuthHeader::Bearer => request.bearer_auth(token),
            AuthHeader::Named(name) => request.header(name.as_str(), token),
        }
    }

    /// Map non-2xx responses to the error taxonomy
    async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await?;
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if text.trim().is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    text.clone()
                }
            });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth(message)),
            _ => Err(ClientError::Network(message)),
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl DeliveryApi for NetworkDeliveryApi {
    async fn login(&self, request: &LoginRequest) -> ClientResult<LoginResponse> {
        let response = self
            .client
            .post(self.url(paths::LOGIN))
            .json(request)
            .send()
            .await?;

        let response: LoginResponse = match Self::read_json(response).await {
            Ok(r) => r,
            Err(ClientError::Auth(message) | ClientError::Network(message)) => {
                return Err(ClientError::LoginFailed(message));
            }
            Err(e) => return Err(e),
        };

        if !response.is_success() {
            return Err(ClientError::LoginFailed(response.message.clone().unwrap_or_else(
                || "Login failed. Please check your credentials.".to_string(),
            )));
        }
        Ok(response)
    }

    async fn fetch_orders(&self, token: &str) -> ClientResult<Vec<DeliveryOrder>> {
        let request = self.authorize(self.client.get(self.url(paths::ORDERS)), token);
        let body: ApiResponse<Vec<serde_json::Value>> =
            Self::read_json(request.send().await?).await?;

        if !body.success {
            return Err(ClientError::Network(body.message_or("Failed to fetch orders.")));
        }
        let values = body
            .data
            .ok_or_else(|| ClientError::InvalidResponse("Missing order data".into()))?;

        let (orders, rejected) = decode_orders(values);
        for reject in &rejected {
            tracing::warn!(id = ?reject.id, "Skipping undecodable order: {}", reject.reason);
        }
        Ok(orders)
    }

    async fn post_status(&self, token: &str, request: &StatusUpdateRequest) -> ClientResult<()> {
        let builder = self.authorize(
            self.client.post(self.url(paths::ORDER_STATUS)).json(request),
            token,
        );
        let body: ApiResponse<serde_json::Value> = Self::read_json(builder.send().await?).await?;

        if !body.success {
            return Err(ClientError::Network(
                body.message_or("Failed to update order status."),
            ));
        }
        Ok(())
    }

    async fn post_location(&self, token: &str, report: &LocationReport) -> ClientResult<()> {
        let builder = self.authorize(
            self.client.post(self.url(paths::LOCATION)).json(report),
            token,
        );
        // Any 2xx counts; the body is not inspected
        Self::check_status(builder.send().await?).await?;
        Ok(())
    }
}
