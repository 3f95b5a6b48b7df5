//! Fastly API client.

use async_trait::async_trait;
use reqwest::{Method, Response, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::fastly::kafka::{
    CreateKafkaInput, DeleteKafkaInput, Kafka, ListKafkasInput, UpdateKafkaInput,
};

/// The subset of the Fastly API the provider drives.
///
/// Handlers only talk to this trait, so tests can swap in
/// [`crate::testing::InMemoryFastly`].
#[async_trait]
pub trait FastlyApi: Send + Sync {
    /// List the Kafka endpoints of a service version.
    async fn list_kafkas(&self, input: &ListKafkasInput) -> Result<Vec<Kafka>, ProviderError>;

    /// Create a Kafka endpoint.
    async fn create_kafka(&self, input: &CreateKafkaInput) -> Result<Kafka, ProviderError>;

    /// Update the fields of an existing Kafka endpoint.
    async fn update_kafka(&self, input: &UpdateKafkaInput) -> Result<Kafka, ProviderError>;

    /// Delete a Kafka endpoint.
    async fn delete_kafka(&self, input: &DeleteKafkaInput) -> Result<(), ProviderError>;
}

/// HTTP implementation of [`FastlyApi`].
#[derive(Debug, Clone)]
pub struct FastlyClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl FastlyClient {
    /// Build a client from resolved provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid base_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "invalid base_url: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("hemmer-provider-fastly/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// URL of the Kafka collection, or of one endpoint when `name` is given.
    fn kafka_url(&self, service_id: &str, version: u32, name: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        let version = version.to_string();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["service", service_id, "version", version.as_str(), "logging", "kafka"]);
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Fastly-Key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Turn non-success responses into [`ProviderError::Api`].
    async fn check(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(ApiErrorBody {
                msg: Some(msg),
                detail: Some(detail),
            }) => format!("{}: {}", msg, detail),
            Ok(ApiErrorBody { msg: Some(msg), .. }) => msg,
            _ if body.is_empty() => status.canonical_reason().unwrap_or("request failed").to_string(),
            _ => body,
        };

        Err(ProviderError::api(status.as_u16(), message))
    }
}

#[async_trait]
impl FastlyApi for FastlyClient {
    #[instrument(skip(self, input), fields(service_id = %input.service_id, version = input.service_version))]
    async fn list_kafkas(&self, input: &ListKafkasInput) -> Result<Vec<Kafka>, ProviderError> {
        let url = self.kafka_url(&input.service_id, input.service_version, None);
        let response = self.request(Method::GET, url).send().await?;
        let kafkas: Vec<Kafka> = Self::check(response).await?.json().await?;
        debug!(count = kafkas.len(), "Listed Kafka endpoints");
        Ok(kafkas)
    }

    #[instrument(skip(self, input), fields(service_id = %input.service_id, version = input.service_version, name = %input.name))]
    async fn create_kafka(&self, input: &CreateKafkaInput) -> Result<Kafka, ProviderError> {
        let url = self.kafka_url(&input.service_id, input.service_version, None);
        let response = self.request(Method::POST, url).form(input).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, input), fields(service_id = %input.service_id, version = input.service_version, name = %input.name))]
    async fn update_kafka(&self, input: &UpdateKafkaInput) -> Result<Kafka, ProviderError> {
        let url = self.kafka_url(&input.service_id, input.service_version, Some(&input.name));
        let response = self.request(Method::PUT, url).form(input).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, input), fields(service_id = %input.service_id, version = input.service_version, name = %input.name))]
    async fn delete_kafka(&self, input: &DeleteKafkaInput) -> Result<(), ProviderError> {
        let url = self.kafka_url(&input.service_id, input.service_version, Some(&input.name));
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
