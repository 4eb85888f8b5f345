//! Byte-stream sources for protocol resources.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{FetchError, FetchFailure, FetchPhase, NdgrError, Result};
use crate::retry::{RetryAction, RetryPolicy, retry_fixed};

/// Response body delivered as network chunks.
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, FetchFailure>>;

/// Opens a resource and yields its body as a chunk stream.
///
/// Implementations report connection-level faults as
/// [`FetchFailure::Network`] so the caller can retry them.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn open(&self, uri: &str) -> std::result::Result<ByteStream, FetchFailure>;
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// [`SegmentFetcher`] over HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        install_rustls_provider();

        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            FetchError::new(
                FetchFailure::Request(e.to_string()),
                "",
                "client",
                FetchPhase::Head,
            )
        })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Map a reqwest error onto the retry classification.
///
/// Connect, timeout and request errors are transient. Builder and redirect
/// errors are not.
pub fn classify_reqwest_error(e: &reqwest::Error) -> FetchFailure {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        FetchFailure::Network(e.to_string())
    } else if e.is_body() || e.is_decode() {
        FetchFailure::Body(e.to_string())
    } else {
        FetchFailure::Request(e.to_string())
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn open(&self, uri: &str) -> std::result::Result<ByteStream, FetchFailure> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| FetchFailure::Body(e.to_string()))
            .boxed())
    }
}

/// A fetcher bound to one connection's retry policy and cancellation token.
#[derive(Clone)]
pub(crate) struct FetchContext {
    fetcher: Arc<dyn SegmentFetcher>,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl FetchContext {
    pub(crate) fn new(
        fetcher: Arc<dyn SegmentFetcher>,
        policy: RetryPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            policy,
            token,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with [`NdgrError::Disposed`] once the connection is cancelled.
    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(NdgrError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Await `fut` unless the connection is cancelled first.
    pub(crate) async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.token
            .run_until_cancelled(fut)
            .await
            .ok_or(NdgrError::Disposed)
    }

    /// Open `uri`, retrying transient faults.
    ///
    /// Only obtaining the response is retried; a body that breaks later
    /// fails the read.
    pub(crate) async fn open(
        &self,
        uri: &str,
        label: &str,
        phase: FetchPhase,
    ) -> Result<ByteStream> {
        let attempt = retry_fixed(&self.policy, &self.token, |_| async move {
            RetryAction::classify(
                self.fetcher
                    .open(uri)
                    .await
                    .map_err(|failure| FetchError::new(failure, uri, label, phase)),
            )
        });
        self.until_cancelled(attempt).await?
    }

    /// Open `uri` and collect the whole body.
    pub(crate) async fn fetch_all(
        &self,
        uri: &str,
        label: &str,
        phase: FetchPhase,
    ) -> Result<Bytes> {
        let mut stream = self.open(uri, label, phase).await?;
        let mut body = BytesMut::new();
        while let Some(chunk) = self.until_cancelled(stream.next()).await? {
            let chunk = chunk.map_err(|failure| FetchError::new(failure, uri, label, phase))?;
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}
