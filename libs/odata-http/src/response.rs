use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;

/// Maximum number of body bytes kept in an [`HttpError::HttpStatus`] preview.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type-erased (and already decompressed) response body.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// A response whose body has not been read yet.
///
/// Every reader enforces `max_body_size`. `text` turns non-2xx statuses
/// into [`HttpError::HttpStatus`]; `bytes` returns the body whatever the
/// status.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Raw body, any status.
    ///
    /// # Errors
    /// `BodyTooLarge` over the limit, `Transport` on a read failure.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Lossy UTF-8 text.
    ///
    /// # Errors
    /// `HttpStatus` for non-2xx, `BodyTooLarge` over the limit.
    pub async fn text(self) -> Result<String, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn checked_body(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, HttpError> {
    let status = response.status();
    if status.is_success() {
        return read_body_limited(response, max_body_size).await;
    }

    let content_type = content_type(response.headers());
    // An oversized error body must not mask the status itself.
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };
    Err(HttpError::HttpStatus {
        status,
        body_preview,
        content_type,
    })
}

/// Collects frames until `limit` decompressed bytes are exceeded.
async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(Into::into)
            .boxed();
        HttpResponse {
            inner: Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
            max_body_size: 64,
        }
    }

    #[tokio::test]
    async fn test_text_reads_success_body() {
        let text = response(200, r#"{"value":[]}"#).text().await.unwrap();
        assert_eq!(text, r#"{"value":[]}"#);
    }

    #[tokio::test]
    async fn test_checked_read_reports_status_with_preview() {
        let err = response(404, r#"{"error":{"message":"nope"}}"#)
            .text()
            .await
            .unwrap_err();
        match err {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body_preview.contains("nope"));
                assert_eq!(content_type.as_deref(), Some("application/json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bytes_ignores_status() {
        let body = response(500, "boom").bytes().await.unwrap();
        assert_eq!(body.as_ref(), b"boom");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let long = "x".repeat(100);
        let body: ResponseBody = Full::new(Bytes::from(long)).map_err(Into::into).boxed();
        let resp = HttpResponse {
            inner: Response::new(body),
            max_body_size: 10,
        };
        let err = resp.bytes().await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 10,
                actual: 100
            }
        ));
    }
}
