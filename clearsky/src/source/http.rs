//! HTTP range source backed by `reqwest`.

use bytes::Bytes;
use futures::FutureExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use tokio::sync::OnceCell;

use super::{BoxFuture, RangeSource, SourceError};

/// Reads byte ranges of an object over HTTP.
///
/// The object size is requested once with `HEAD` and remembered.
#[derive(Debug)]
pub struct HttpRangeSource {
    id: String,
    url: String,
    client: Client,
    size: OnceCell<u64>,
}

impl HttpRangeSource {
    /// Create a source for `url`, reported under identifier `id`.
    pub fn new(id: impl Into<String>, url: impl Into<String>, client: Client) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client,
            size: OnceCell::new(),
        }
    }

    /// The URL this source reads from.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_size(&self) -> Result<u64, SourceError> {
        let response = self.client.head(&self.url).send().await?;
        match response.status() {
            s if s.is_success() => response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| SourceError::UnknownLength(self.id.clone())),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(self.id.clone())),
            s => Err(SourceError::Http {
                status: s.as_u16(),
                url: self.url.clone(),
            }),
        }
    }
}

impl RangeSource for HttpRangeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> BoxFuture<'_, Result<u64, SourceError>> {
        async move { self.size.get_or_try_init(|| self.fetch_size()).await.copied() }.boxed()
    }

    fn read_range(&self, offset: u64, len: usize) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        async move {
            if len == 0 {
                return Ok(Bytes::new());
            }
            let last = super::range_end(&self.id, offset, len)? - 1;
            let response = self
                .client
                .get(&self.url)
                .header(RANGE, format!("bytes={}-{}", offset, last))
                .send()
                .await?;

            match response.status() {
                StatusCode::PARTIAL_CONTENT => Ok(response.bytes().await?),
                // Server ignored the range and sent the whole object
                StatusCode::OK => {
                    let body = response.bytes().await?;
                    super::MemoryRangeSource::slice(&self.id, &body, offset, len)
                }
                StatusCode::RANGE_NOT_SATISFIABLE => Ok(Bytes::new()),
                StatusCode::NOT_FOUND => Err(SourceError::NotFound(self.id.clone())),
                s => Err(SourceError::Http {
                    status: s.as_u16(),
                    url: self.url.clone(),
                }),
            }
        }
        .boxed()
    }
}
