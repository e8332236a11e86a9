use std::time::Duration;

use log::debug;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::modules::errors::ConsoleError;
use crate::modules::serialize::BackendConfig;
use crate::modules::types::{ListResponse, MutationResponse, Record, SdStatus};

/// The REST surface the console talks to.
///
/// `Sync` so the general tab can fan its count requests out over threads.
pub trait SettingsBackend: Sync {
    fn list(&self, entity: &str) -> Result<ListResponse, ConsoleError>;
    fn create(&self, entity: &str, body: &Record) -> Result<MutationResponse, ConsoleError>;
    fn update(&self, entity: &str, id: i64, body: &Record) -> Result<MutationResponse, ConsoleError>;
    fn delete(&self, entity: &str, id: i64) -> Result<MutationResponse, ConsoleError>;
    fn sd_status(&self) -> Result<SdStatus, ConsoleError>;
    /// Generic JSON POST used by page helpers.
    fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, ConsoleError>;
}

pub struct HttpBackend {
    base: Url,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ConsoleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("mekanai-console/0.1")),
        );

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base: Url::parse(&config.base_url)?,
            client,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ConsoleError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn settings_url(&self, entity: &str, id: Option<i64>) -> Result<Url, ConsoleError> {
        match id {
            Some(id) => self.url(&format!("api/settings/{entity}/{id}")),
            None => self.url(&format!("api/settings/{entity}")),
        }
    }

    // reqwest takes the address as text; our `Url` only resolves paths.
    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.client.request(method, url.as_str())
    }

    // Business failures arrive as {status, message} with 4xx/5xx codes, so
    // the body is parsed whatever the status line says.
    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ConsoleError> {
        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        debug!("backend answered {status}: {} bytes", text.len());
        Ok(serde_json::from_str(&text)?)
    }

    fn with_json(&self, request: RequestBuilder, body: &impl serde::Serialize) -> Result<RequestBuilder, ConsoleError> {
        Ok(request
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?))
    }
}

impl SettingsBackend for HttpBackend {
    fn list(&self, entity: &str) -> Result<ListResponse, ConsoleError> {
        let url = self.settings_url(entity, None)?;
        self.send(self.request(Method::GET, &url))
    }

    fn create(&self, entity: &str, body: &Record) -> Result<MutationResponse, ConsoleError> {
        let url = self.settings_url(entity, None)?;
        self.send(self.with_json(self.request(Method::POST, &url), body)?)
    }

    fn update(&self, entity: &str, id: i64, body: &Record) -> Result<MutationResponse, ConsoleError> {
        let url = self.settings_url(entity, Some(id))?;
        self.send(self.with_json(self.request(Method::PUT, &url), body)?)
    }

    fn delete(&self, entity: &str, id: i64) -> Result<MutationResponse, ConsoleError> {
        let url = self.settings_url(entity, Some(id))?;
        self.send(self.request(Method::DELETE, &url))
    }

    fn sd_status(&self) -> Result<SdStatus, ConsoleError> {
        let url = self.url("api/sd-status")?;
        self.send(self.request(Method::GET, &url))
    }

    fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, ConsoleError> {
        let url = self.url(endpoint)?;
        self.send(self.with_json(self.request(Method::POST, &url), body)?)
    }
}
