//! Consul catalog HTTP client
//!
//! Only the two catalog calls the watcher needs are implemented:
//! `GET /v1/catalog/services` as a blocking query and
//! `GET /v1/catalog/service/:name`.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ConsulError, Result};

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Configuration for the Consul client
#[derive(Clone, Debug)]
pub struct ConsulClientConfig {
    /// Agent or server address; `http://` is assumed without a scheme
    pub endpoint: String,
    /// Consul namespace (`ns` query parameter); empty for the default
    pub namespace: String,
    /// ACL token
    pub token: Option<String>,
    /// Blocking query wait time
    pub wait: Duration,
    pub connect_timeout: Duration,
}

impl ConsulClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            namespace: String::new(),
            token: None,
            wait: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

/// One service instance from `/v1/catalog/service/:name`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogService {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Node", default)]
    pub node: String,

    /// Node address
    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Datacenter", default)]
    pub datacenter: String,

    #[serde(rename = "ServiceID", default)]
    pub service_id: String,

    #[serde(rename = "ServiceName", default)]
    pub service_name: String,

    /// Service-specific address, preferred over the node address
    #[serde(rename = "ServiceAddress", default)]
    pub service_address: String,

    #[serde(rename = "ServicePort", default)]
    pub service_port: u32,

    #[serde(rename = "ServiceTags", default, skip_serializing_if = "Option::is_none")]
    pub service_tags: Option<Vec<String>>,

    #[serde(rename = "ServiceMeta", default, skip_serializing_if = "Option::is_none")]
    pub service_meta: Option<HashMap<String, String>>,

    #[serde(rename = "Namespace", default)]
    pub namespace: String,
}

/// Parse a registry endpoint into a base URL.
fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ConsulError::InvalidEndpoint(endpoint.to_string()));
    }
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let url =
        Url::parse(&with_scheme).map_err(|e| ConsulError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConsulError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(url)
}

pub struct ConsulClient {
    client: Client,
    base: Url,
    config: ConsulClientConfig,
}

impl ConsulClient {
    pub fn new(config: ConsulClientConfig) -> Result<Self> {
        let base = parse_endpoint(&config.endpoint)?;
        // A blocking query may legitimately take the whole wait time, plus
        // Consul's own jitter of up to wait/16.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.wait + config.wait / 16 + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ConsulError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: Url) -> RequestBuilder {
        let mut request = self.client.get(url);
        if !self.config.namespace.is_empty() {
            request = request.query(&[("ns", self.config.namespace.as_str())]);
        }
        if let Some(token) = &self.config.token {
            request = request.header(TOKEN_HEADER, token);
        }
        request
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConsulError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Blocking list of service names and their tags.
    ///
    /// Returns once the catalog index moves past `wait_index` or the wait
    /// time elapses; in the latter case the returned index equals
    /// `wait_index`.
    pub async fn list_services(
        &self,
        wait_index: u64,
    ) -> Result<(HashMap<String, Vec<String>>, u64)> {
        let url = self.url(&["v1", "catalog", "services"])?;
        let wait = format!("{}ms", self.config.wait.as_millis());
        let response = self
            .request(url)
            .query(&[("index", wait_index.to_string()), ("wait", wait)])
            .send()
            .await?;
        let response = Self::check(response).await?;

        let index = match response.headers().get(INDEX_HEADER) {
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| ConsulError::InvalidIndex(format!("{:?}", value)))?;
                raw.parse::<u64>()
                    .map_err(|_| ConsulError::InvalidIndex(raw.to_string()))?
            }
            None => return Err(ConsulError::InvalidIndex("missing".to_string())),
        };

        let services: HashMap<String, Vec<String>> = response.json().await?;
        debug!(count = services.len(), index, "Listed consul services");
        Ok((services, index))
    }

    /// Instances of service `name`.
    pub async fn service(&self, name: &str) -> Result<Vec<CatalogService>> {
        let url = self.url(&["v1", "catalog", "service", name])?;
        let response = self.request(url).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }
}
