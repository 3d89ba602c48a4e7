use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;

use crate::error::ScanError;
use crate::models::Resource;

/// What came back from one HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html") || ct.contains("xhtml"))
            .unwrap_or(true)
    }
}

/// The engine's only suspension point. Timeouts and connection failures
/// surface as distinct, recoverable errors so callers can treat them
/// differently (a timeout may feed an anomaly finding).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Resource) -> Result<HttpResponse, ScanError>;
}

/// reqwest-backed transport with a per-client timeout.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(concat!("webhound/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpClient { client })
    }

    fn classify(url: &str, e: reqwest::Error) -> ScanError {
        if e.is_timeout() {
            ScanError::Timeout {
                url: url.to_string(),
            }
        } else {
            ScanError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &Resource) -> Result<HttpResponse, ScanError> {
        let url = request.url.to_string();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, url.clone());
        if let Some(referer) = &request.referer {
            builder = builder.header("referer", referer.clone());
        }

        if !request.file_params.is_empty() {
            let mut form = reqwest::multipart::Form::new();
            for (k, v) in &request.post_params {
                form = form.text(k.clone(), v.clone());
            }
            for (k, f) in &request.file_params {
                let part = reqwest::multipart::Part::text(f.content.clone())
                    .file_name(f.filename.clone());
                form = form.part(k.clone(), part);
            }
            builder = builder.multipart(form);
        } else if !request.post_params.is_empty() {
            builder = builder.form(&request.post_params);
        }

        debug!("{} {}", request.method, url);
        let start = Instant::now();
        let resp = builder
            .send()
            .await
            .map_err(|e| Self::classify(&url, e))?;

        let status = resp.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let body = resp.text().await.map_err(|e| Self::classify(&url, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }
}
