use std::future::Future;

use bytes::Bytes;

use crate::{TileError, TileResult};

#[cfg(feature = "http-async")]
mod http;
#[cfg(feature = "http-async")]
pub use http::HttpFetcher;

#[cfg(feature = "mmap-async-tokio")]
mod mmap;
#[cfg(feature = "mmap-async-tokio")]
pub use mmap::MmapFetcher;

/// A half-open byte window `[offset, offset + length)` of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: usize,
}

impl ByteRange {
    #[must_use]
    pub fn new(offset: u64, length: usize) -> Self {
        Self { offset, length }
    }

    /// Value of an HTTP `Range` header selecting this window.
    ///
    /// # Errors
    ///
    /// Empty ranges cannot be expressed as an inclusive HTTP range.
    pub fn header_value(&self) -> TileResult<String> {
        let last = (self.length as u64)
            .checked_sub(1)
            .and_then(|len| self.offset.checked_add(len))
            .ok_or_else(|| TileError::InvalidRange(format!("{self:?}")))?;
        Ok(format!("bytes={}-{last}", self.offset))
    }
}

/// Retrieves whole resources or byte ranges of them.
///
/// Each implementation owns its transport; callers only see bytes and [`TileError`]s.
pub trait Fetcher {
    /// Reads up to `range.length` bytes, or the whole resource when `range` is `None`.
    fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> impl Future<Output = TileResult<Bytes>> + Send;

    /// Reads exactly `range.length` bytes.
    fn fetch_exact(
        &self,
        url: &str,
        range: ByteRange,
    ) -> impl Future<Output = TileResult<Bytes>> + Send
    where
        Self: Sync,
    {
        async move {
            let data = self.fetch(url, Some(range)).await?;

            if data.len() == range.length {
                Ok(data)
            } else {
                Err(TileError::UnexpectedNumberOfBytesReturned(
                    range.length,
                    data.len(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::fixtures::MemoryFetcher;

    #[rstest]
    #[case(0, 1, "bytes=0-0")]
    #[case(0, 16_384, "bytes=0-16383")]
    #[case(127, 10, "bytes=127-136")]
    fn range_header(#[case] offset: u64, #[case] length: usize, #[case] expected: &str) {
        assert_eq!(ByteRange::new(offset, length).header_value().unwrap(), expected);
    }

    #[test]
    fn empty_range_has_no_header() {
        assert!(matches!(
            ByteRange::new(5, 0).header_value(),
            Err(TileError::InvalidRange(_))
        ));
    }

    #[tokio::test]
    async fn fetch_exact_rejects_short_reads() {
        let fetcher = MemoryFetcher::new().with("mem://a", &b"0123456789"[..]);

        let data = fetcher
            .fetch_exact("mem://a", ByteRange::new(2, 3))
            .await
            .unwrap();
        assert_eq!(&data[..], b"234");

        let result = fetcher.fetch_exact("mem://a", ByteRange::new(8, 5)).await;
        assert!(matches!(
            result,
            Err(TileError::UnexpectedNumberOfBytesReturned(5, 2))
        ));
    }
}
