//! Source image download
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Pixelflow Image Worker)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Fetches raw image bytes for a command
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// HTTP fetcher with a request timeout and a byte cap
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        // Content-Length can be absent or wrong, so the cap is enforced on the stream too
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = body.len(), "Image downloaded");
        Ok(body.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LIMIT: u64 = 16;

    /// Serves one canned HTTP response and returns the URL to request
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            // The client may hang up early once it sees the body is too large
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/image.png", addr)
    }

    fn fetcher() -> HttpImageFetcher {
        HttpImageFetcher::new(Duration::from_secs(5), LIMIT).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nimage".to_vec()).await;

        let body = fetcher().fetch(&url).await.unwrap();
        assert_eq!(&body[..], b"image");
    }

    #[tokio::test]
    async fn test_non_ok_status_is_rejected() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec()).await;

        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\n".to_vec();
        response.extend_from_slice(&[0u8; 64]);
        let url = serve_once(response).await;

        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: LIMIT }));
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_rejected() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              c\r\n0123456789ab\r\nc\r\n0123456789ab\r\n0\r\n\r\n"
                .to_vec(),
        )
        .await;

        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: LIMIT }));
    }

    #[tokio::test]
    async fn test_unframed_body_over_limit_is_rejected() {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[7u8; 40]);
        let url = serve_once(response).await;

        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: LIMIT }));
    }

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        response.extend_from_slice(b"8\r\nabcdefgh\r\n8\r\nijklmnop\r\n0\r\n\r\n");
        let url = serve_once(response).await;

        let body = fetcher().fetch(&url).await.unwrap();
        assert_eq!(body.len() as u64, LIMIT);
    }
}
