use std::path::Path;

use anyhow::{anyhow, Context};
use futures::StreamExt;
use lazy_static::lazy_static;
use log::debug;
use reqwest::{Body, Response};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::config;

const ENDPOINT_TEXT: &str = "/tika";
const ENDPOINT_METADATA: &str = "/meta";
const ENDPOINT_DETECT: &str = "/meta/Content-Type";

/// The type of the singleton instance of the `Tika` service.
///
pub type TikaService = Box<Tika>;

lazy_static! {
    static ref TIKA: TikaService = Box::<Tika>::default();
}

/// Returns the singleton instance of the `Tika` service.
///
pub fn tika() -> &'static TikaService {
    &TIKA
}

/// Client of a Tika server, reading text, metadata and mimetypes of documents.
///
/// Every request streams the file to the server and skips embedded documents.
///
pub struct Tika {
    http_client: reqwest::Client,
    tika_url: String,
}

/// Uses `TIKA_URL` when configured, otherwise `TIKA_HOST` and `TIKA_PORT`.
impl Default for Tika {
    fn default() -> Self {
        let tika_url = config().get("TIKA_URL").unwrap_or_else(|| {
            format!(
                "http://{}:{}",
                config().get_or("TIKA_HOST", "localhost"),
                config().get_or("TIKA_PORT", "9998")
            )
        });
        Self::new(tika_url)
    }
}

impl Tika {
    /// Create a client for the Tika server at `tika_url`, e.g. `http://localhost:9998`.
    ///
    pub fn new(tika_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            tika_url: tika_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Checks if the Tika server is running.
    ///
    pub async fn is_connected(&self) -> bool {
        self.http_client
            .get(self.url(ENDPOINT_TEXT))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    /// Extracts the plain text of a document.
    ///
    pub async fn text(&self, path: impl AsRef<Path>) -> Result<String, anyhow::Error> {
        let response = self.put(ENDPOINT_TEXT, "text/plain", path.as_ref()).await?;
        let bytes = response.bytes().await.context("failed to read text response")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Extracts the plain text of a document, streaming it into a file.
    ///
    /// # Arguments
    ///
    /// * `input_path` - The document.
    /// * `output_path` - The text file to create.
    ///
    pub async fn text_into_file(
        &self,
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<(), anyhow::Error> {
        let response = self.put(ENDPOINT_TEXT, "text/plain", input_path.as_ref()).await?;

        let mut output = tokio::fs::File::create(output_path.as_ref())
            .await
            .context("failed to create text file")?;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            output.write_all(&chunk?).await?;
        }
        output.flush().await?;
        Ok(())
    }

    /// Extracts the metadata of a document as a map of Tika property names to values.
    ///
    /// Multi-valued properties are JSON arrays.
    ///
    pub async fn metadata_map(&self, path: impl AsRef<Path>) -> Result<Map<String, Value>, anyhow::Error> {
        let body = self
            .put(ENDPOINT_METADATA, "application/json", path.as_ref())
            .await?
            .json::<Value>()
            .await
            .context("failed to read metadata response")?;
        parse_metadata_body(body)
    }

    /// Detects the mimetype of a document.
    ///
    pub async fn detect(&self, path: impl AsRef<Path>) -> Result<String, anyhow::Error> {
        let body = self
            .put(ENDPOINT_DETECT, "application/json", path.as_ref())
            .await?
            .json::<Value>()
            .await
            .context("failed to read detect response")?;
        let mimetype = parse_detect_body(&body)?;
        debug!("Tika detected '{}'", mimetype);
        Ok(mimetype)
    }

    async fn put(&self, endpoint: &str, accept: &str, path: &Path) -> Result<Response, anyhow::Error> {
        let input = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open '{}'", path.display()))?;
        let response = self
            .http_client
            .put(self.url(endpoint))
            .header("Accept", accept)
            .header("X-Tika-Skip-Embedded", "true")
            .body(Body::wrap_stream(FramedRead::new(input, BytesCodec::new())))
            .send()
            .await
            .with_context(|| format!("failed to reach Tika at {}", self.tika_url))?;
        debug!("Tika {} responded with {}", endpoint, response.status());

        response
            .error_for_status()
            .with_context(|| format!("Tika {} failed for '{}'", endpoint, path.display()))
    }

    #[inline]
    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.tika_url, endpoint)
    }
}

fn parse_detect_body(body: &Value) -> Result<String, anyhow::Error> {
    body["Content-Type"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("error parsing detect response"))
}

fn parse_metadata_body(body: Value) -> Result<Map<String, Value>, anyhow::Error> {
    match body {
        Value::Object(map) => Ok(map),
        // `/rmeta` style responses list the container first
        Value::Array(mut list) if !list.is_empty() => parse_metadata_body(list.swap_remove(0)),
        _ => Err(anyhow!("error parsing metadata response")),
    }
}
