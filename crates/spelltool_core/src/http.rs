use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};

use crate::config::ToolConfig;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub delay_ms: u64,
}

impl HttpClientConfig {
    pub fn blizzard(config: &ToolConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            delay_ms: config.blizzard_delay_ms(),
        }
    }

    pub fn wowhead(config: &ToolConfig) -> Self {
        Self {
            user_agent: config.scrape_user_agent(),
            timeout_ms: config.timeout_ms(),
            delay_ms: config.wowhead_delay_ms(),
        }
    }
}

/// Status and fully-read body of one request. Callers branch on the status
/// themselves; only transport failures surface as `Err`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// GET capability shared by the remote sources, the search lookup and the
/// endpoint probe.
pub trait HttpGet {
    fn get(&mut self, url: &str, accept: &str, bearer: Option<&str>) -> Result<HttpResponse>;
    fn request_count(&self) -> usize;
}

/// Blocking client that keeps a fixed pause between consecutive requests.
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    /// Form POST with HTTP basic auth, as the OAuth client-credentials grant wants.
    pub fn post_form_basic_auth(
        &mut self,
        url: &str,
        username: &str,
        password: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let request = self
            .client
            .post(url)
            .basic_auth(username, Some(password))
            .header("Accept", "application/json")
            .form(form);
        self.send(request, url)
    }

    fn send(&mut self, request: RequestBuilder, url: &str) -> Result<HttpResponse> {
        self.apply_rate_limit();
        log::debug!("HTTP request #{} -> {url}", self.request_count);
        let response = request
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .with_context(|| format!("failed to call {url}"))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .text()
            .with_context(|| format!("failed to read response body from {url}"))?;
        log::debug!("HTTP {status} <- {url} ({} bytes)", body.len());
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.delay_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count = self.request_count.saturating_add(1);
    }
}

impl HttpGet for HttpClient {
    fn get(&mut self, url: &str, accept: &str, bearer: Option<&str>) -> Result<HttpResponse> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", accept)
            .header("Accept-Language", "en-US,en;q=0.9");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        self.send(request, url)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
