//! Shopify Admin API client
//!
//! GraphQL requests and REST calls are authenticated with the
//! `X-Shopify-Access-Token` header. Staged uploads go to the URL the
//! platform hands out and carry no token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AdminError;
use crate::types::StagedUploadTarget;

/// Access token header expected by the Admin API
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// MIME type declared for uploaded documents
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Remote operations the upload and pricing flows depend on
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Run a GraphQL document and return its `data` member
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AdminError>;

    /// POST the target's parameters, in order, followed by the file as the last field
    async fn upload_staged(
        &self,
        target: &StagedUploadTarget,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<(), AdminError>;

    /// Set a variant's price and compare-at price, returning the upstream body
    async fn update_variant_price(&self, variant_id: u64, rate: &str) -> Result<Value, AdminError>;
}

/// Connection settings for one store
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// e.g. `https://example.myshopify.com`
    pub store_url: String,
    pub access_token: String,
    /// Admin API version, e.g. `2024-10`
    pub api_version: String,
    pub timeout: Duration,
}

impl ShopifyConfig {
    pub fn new(store_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            access_token: access_token.into(),
            api_version: "2024-10".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    fn admin_base(&self) -> String {
        format!(
            "{}/admin/api/{}",
            self.store_url.trim_end_matches('/'),
            self.api_version
        )
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql.json", self.admin_base())
    }

    pub fn variant_url(&self, variant_id: u64) -> String {
        format!("{}/variants/{}.json", self.admin_base(), variant_id)
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

/// reqwest-backed [`AdminApi`]
pub struct ShopifyClient {
    config: ShopifyConfig,
    http: reqwest::Client,
}

impl ShopifyClient {
    pub fn new(config: ShopifyConfig) -> Result<Self, AdminError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ShopifyConfig {
        &self.config
    }
}

/// Turn a non-2xx response into [`AdminError::Status`]
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AdminError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdminError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AdminApi for ShopifyClient {
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AdminError> {
        let response = self
            .http
            .post(self.config.graphql_url())
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let mut body: Value = ensure_success(response).await?.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(AdminError::GraphQl(messages));
            }
        }

        match body.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(AdminError::UnexpectedResponse(
                "GraphQL response has no data".into(),
            )),
        }
    }

    async fn upload_staged(
        &self,
        target: &StagedUploadTarget,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<(), AdminError> {
        let mut form = Form::new();
        for parameter in &target.parameters {
            form = form.text(parameter.name.clone(), parameter.value.clone());
        }

        let size = contents.len();
        let file = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(PDF_MIME_TYPE)?;
        form = form.part("file", file);

        debug!(
            "Uploading {} ({} bytes, {} parameters) to staged target",
            file_name,
            size,
            target.parameters.len()
        );

        let response = self.http.post(&target.url).multipart(form).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn update_variant_price(&self, variant_id: u64, rate: &str) -> Result<Value, AdminError> {
        let body = json!({
            "variant": {
                "id": variant_id,
                "price": rate,
                "compare_at_price": rate,
            }
        });

        let response = self
            .http
            .put(self.config.variant_url(variant_id))
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
            .json(&body)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }
}
