use crate::error::HttpError;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Request};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in headers a request did not set itself.
///
/// Carries the `User-Agent` and any service-wide headers (API keys,
/// `odata-version`, ...). A header already present on the request wins.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// # Errors
    /// Returns `InvalidHeaderName`/`InvalidHeaderValue` for the first malformed entry.
    pub fn try_new<N, V>(
        user_agent: &str,
        extra: impl IntoIterator<Item = (N, V)>,
    ) -> Result<Self, HttpError>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in extra {
            let name = HeaderName::try_from(name.as_ref())?;
            let value = HeaderValue::try_from(value.as_ref())?;
            headers.insert(name, value);
        }
        Ok(Self {
            headers: Arc::new(headers),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, B> Service<Request<B>> for DefaultHeadersService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let target = req.headers_mut();
        for (name, value) in self.headers.iter() {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
