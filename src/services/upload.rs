use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::Uploader;
use crate::config::UploadSettings;
use crate::{CaptureError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Object metadata attached to an uploaded screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadMetadata {
    pub h: u32,
    pub w: u32,
    pub placement: String,
    pub creativegroup: String,
    pub url: String,
}

impl UploadMetadata {
    fn headers(&self) -> [(&'static str, String); 5] {
        [
            ("x-meta-h", self.h.to_string()),
            ("x-meta-w", self.w.to_string()),
            ("x-meta-placement", self.placement.clone()),
            ("x-meta-creativegroup", self.creativegroup.clone()),
            ("x-meta-url", self.url.clone()),
        ]
    }
}

/// Uploads with `PUT {endpoint}/{object}` and hands out `{public_base_url}/{object}`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: Client,
    endpoint: Url,
    public_base: Url,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(endpoint: &str, public_base_url: Option<&str>, token: Option<String>) -> Result<Self> {
        Self::with_timeout(endpoint, public_base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        public_base_url: Option<&str>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let public_base = match public_base_url {
            Some(base) => Url::parse(base)?,
            None => endpoint.clone(),
        };
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            public_base,
            token,
        })
    }

    pub fn from_settings(settings: &UploadSettings) -> Result<Self> {
        let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
            CaptureError::Config("upload.endpoint is required to upload screenshots".to_string())
        })?;
        Self::new(
            endpoint,
            settings.public_base_url.as_deref(),
            settings.token.clone(),
        )
    }

    fn object_url(base: &Url, object_name: &str) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| CaptureError::Config(format!("{base} cannot hold object paths")))?
            .pop_if_empty()
            .push(object_name);
        Ok(url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(
        &self,
        file_path: &Path,
        object_name: &str,
        metadata: &UploadMetadata,
    ) -> Result<String> {
        let body = tokio::fs::read(file_path).await?;
        let target = Self::object_url(&self.endpoint, object_name)?;

        let mut request = self
            .http
            .put(target.clone())
            .header(CONTENT_TYPE, "image/png")
            .body(body);
        for (name, value) in metadata.headers() {
            request = request.header(name, value);
        }

        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| CaptureError::UploadFailed(format!("{object_name}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptureError::UploadFailed(format!(
                "{object_name}: {target} returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        Ok(Self::object_url(&self.public_base, object_name)?.to_string())
    }
}
