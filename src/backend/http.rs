use bytes::Bytes;
use log::trace;
use reqwest::header::{HeaderValue, RANGE};
use reqwest::{Client, Method, Request, StatusCode, Url};

use crate::backend::{ByteRange, Fetcher};
use crate::{TileError, TileResult};

/// Fetches resources over HTTP(S), using `Range` requests for partial reads.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> TileResult<Bytes> {
        let url = Url::parse(url).map_err(|_| TileError::InvalidUrl(url.to_string()))?;
        let mut req = Request::new(Method::GET, url);

        if let Some(range) = range {
            let value = range.header_value()?;
            trace!("GET {} {value}", req.url());
            let value =
                HeaderValue::try_from(value).map_err(|e| TileError::InvalidRange(e.to_string()))?;
            req.headers_mut().insert(RANGE, value);
        } else {
            trace!("GET {}", req.url());
        }

        let response = self.client.execute(req).await?.error_for_status()?;

        let Some(range) = range else {
            return Ok(response.bytes().await?);
        };
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(TileError::RangeRequestsUnsupported);
        }

        let response_bytes = response.bytes().await?;
        if response_bytes.len() > range.length {
            Err(TileError::ResponseBodyTooLong(
                response_bytes.len(),
                range.length,
            ))
        } else {
            Ok(response_bytes)
        }
    }
}
