//! HTTP client for the upstream activity API.

use async_trait::async_trait;
use chrono::Utc;
use pulse_core::{Error, Event, ResourceMetadata, Result};
use reqwest::header::{HeaderMap, ACCEPT};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::credentials::CredentialRotator;
use crate::dto::{EventDto, ResourceDto};

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Anything that can feed the pipeline with events and resource metadata.
///
/// Implemented by [`SourceClient`] in production and by scripted sources in
/// tests.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Fetch the current page of public events.
    async fn fetch_events(&self) -> Result<Vec<Event>>;

    /// Fetch the latest metadata for one resource.
    async fn fetch_resource_metadata(&self, resource_key: &str) -> Result<ResourceMetadata>;
}

/// Upstream API client.
///
/// Every request carries the next credential from the rotator as a bearer
/// token and is bounded by the configured timeout.
#[derive(Clone)]
pub struct SourceClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    rotator: Arc<CredentialRotator>,
    events_url: Url,
    resource_base: Url,
}

impl SourceClient {
    /// Creates a client. Fails on an empty credential list or bad URLs.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let rotator = Arc::new(CredentialRotator::new(config.credentials.iter().cloned())?);
        Self::with_rotator(config, rotator)
    }

    /// Creates a client sharing an existing rotator.
    pub fn with_rotator(config: &UpstreamConfig, rotator: Arc<CredentialRotator>) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("invalid upstream base_url: {}", e)))?;

        let mut events_url = base
            .join(&config.events_path)
            .map_err(|e| Error::config(format!("invalid events_path: {}", e)))?;
        events_url
            .query_pairs_mut()
            .append_pair("per_page", &config.per_page.to_string());

        let mut resource_base = base
            .join(&config.resource_path)
            .map_err(|e| Error::config(format!("invalid resource_path: {}", e)))?;
        if !resource_base.path().ends_with('/') {
            let path = format!("{}/", resource_base.path());
            resource_base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base,
            rotator,
            events_url,
            resource_base,
        })
    }

    /// URL of the metadata endpoint for a resource key.
    pub fn resource_url(&self, resource_key: &str) -> Result<Url> {
        self.resource_base
            .join(resource_key.trim_start_matches('/'))
            .map_err(|e| Error::internal(format!("bad resource key {}: {}", resource_key, e)))
    }

    pub fn events_url(&self) -> &Url {
        &self.events_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, context: &str) -> Result<T> {
        let credential = self.rotator.next();
        let start = Instant::now();

        let response = self
            .http
            .get(url)
            .bearer_auth(credential.expose())
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                metrics().upstream_errors.inc();
                warn!(context = context, error = %e, "Upstream request failed");
                Error::transport(format!("{}: {}", context, e))
            })?;

        let status = response.status();
        log_rate_limit(response.headers(), context);

        let body = response.text().await.map_err(|e| {
            metrics().upstream_errors.inc();
            Error::transport(format!("{}: failed to read body: {}", context, e))
        })?;

        let elapsed = start.elapsed();
        metrics()
            .upstream_latency_ms
            .observe(elapsed.as_millis() as u64);

        if !status.is_success() {
            metrics().upstream_errors.inc();
            warn!(
                context = context,
                status = status.as_u16(),
                "Upstream returned error status"
            );
            return Err(Error::from_status(status.as_u16(), body));
        }

        debug!(
            context = context,
            status = status.as_u16(),
            latency_ms = %elapsed.as_millis(),
            "Upstream request complete"
        );

        serde_json::from_str(&body).map_err(|e| {
            metrics().upstream_decode_errors.inc();
            Error::decode(context, e.to_string(), body)
        })
    }
}

fn log_rate_limit(headers: &HeaderMap, context: &str) {
    if let Some(remaining) = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if remaining < 100 {
            warn!(context = context, remaining = remaining, "Upstream rate limit running low");
        } else {
            debug!(context = context, remaining = remaining, "Upstream rate limit");
        }
    }
}

#[async_trait]
impl UpstreamSource for SourceClient {
    async fn fetch_events(&self) -> Result<Vec<Event>> {
        let dtos: Vec<EventDto> = self.get_json(self.events_url.clone(), "events").await?;
        metrics().events_fetched.inc_by(dtos.len() as u64);
        Ok(dtos.into_iter().map(Event::from).collect())
    }

    async fn fetch_resource_metadata(&self, resource_key: &str) -> Result<ResourceMetadata> {
        let url = self.resource_url(resource_key)?;
        let dto: ResourceDto = self.get_json(url, "resource_metadata").await?;
        Ok(dto.into_metadata(Utc::now()))
    }
}
