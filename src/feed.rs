use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::FeedConfig;
use crate::utils::error::{AppError, FetchError, FetchErrorKind};

/// Raw, not yet normalized product records of one catalog page.
pub type RawProductList = Vec<Value>;

const FALLBACK_USER_AGENT: &str = concat!("restock-watcher/", env!("CARGO_PKG_VERSION"));

/// Source of catalog pages. The HTTP client is the production implementation;
/// tests substitute scripted pages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one zero-based page.
    async fn fetch(&self, page: u32) -> Result<RawProductList, FetchError>;
}

pub struct FeedClient {
    client: Client,
    config: FeedConfig,
    user_agents: Vec<String>,
    current_index: AtomicUsize,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        let user_agents: Vec<String> = config
            .user_agents
            .iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();

        Ok(Self {
            client,
            config,
            user_agents,
            current_index: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Round-robin over the configured user agents.
    fn next_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return FALLBACK_USER_AGENT;
        }
        let index = self.current_index.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[index]
    }

    fn referer(&self) -> String {
        format!("{}/", self.config.origin.trim_end_matches('/'))
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, page: u32) -> Result<RawProductList, FetchError> {
        let mut query: Vec<(&str, String)> = self
            .config
            .query
            .iter()
            .map(|param| (param.name.as_str(), param.value.clone()))
            .collect();
        query.push((self.config.page_param.as_str(), page.to_string()));

        let user_agent = self.next_user_agent().to_string();
        tracing::debug!(page, %user_agent, "Fetching catalog page");

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&query)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "application/json")
            .header(REFERER, self.referer())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(page, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                page,
                FetchErrorKind::Http,
                format!("unexpected status {}", status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(page, &e))?;

        let document: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::new(page, FetchErrorKind::Decode, e.to_string()))?;

        extract_products(document, &self.config.products_pointer, page)
    }
}

/// Pull the products array out of a page body. A missing pointer means the
/// page carries no products.
pub fn extract_products(
    mut document: Value,
    pointer: &str,
    page: u32,
) -> Result<RawProductList, FetchError> {
    match document.pointer_mut(pointer).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(products)) => Ok(products),
        Some(other) => Err(FetchError::new(
            page,
            FetchErrorKind::Decode,
            format!("expected an array at '{}', found {}", pointer, json_type(&other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
