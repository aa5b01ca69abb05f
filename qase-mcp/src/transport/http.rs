//! `reqwest`-backed [`HttpSender`].

use super::{ApiResponse, HttpSender, SendError};
use crate::config::ConfigError;
use crate::request::{ApiRequest, RequestBody};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

/// Sends requests with a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: Client,
}

impl ReqwestSender {
    /// Create a sender whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("qase-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(error: reqwest::Error) -> SendError {
    let (connect, timeout) = (error.is_connect(), error.is_timeout());
    let message = error.without_url().to_string();
    if connect {
        SendError::Connect(message)
    } else if timeout {
        SendError::Timeout(message)
    } else {
        SendError::Other(message)
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, SendError> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Multipart(parts) => {
                let mut form = Form::new();
                for part in parts {
                    let file = Part::bytes(part.data.clone())
                        .file_name(part.file_name.clone())
                        .mime_str(&part.mime_type)
                        .map_err(|e| SendError::Other(format!("invalid MIME type: {}", e)))?;
                    form = form.part(part.name.clone(), file);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify)?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
