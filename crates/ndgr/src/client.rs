//! Protocol client: the head polling state machine.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::backward::pull_backwards;
use crate::config::ClientConfig;
use crate::error::{FetchPhase, NdgrError, Result};
use crate::fetcher::{FetchContext, HttpFetcher, SegmentFetcher};
use crate::framing::FrameReader;
use crate::proto::{ChunkedEntry, ChunkedMessage, chunked_entry};
use crate::retry::RetryPolicy;

/// Cursor passed as the `at` query parameter of the head resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum At {
    Now,
    /// Unix timestamp in seconds.
    Unix(i64),
    /// Server-issued cursor passed back verbatim.
    Opaque(String),
}

impl At {
    /// `"now"` and integers map to their variants, anything else is opaque.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("now") {
            Self::Now
        } else if let Ok(ts) = s.parse::<i64>() {
            Self::Unix(ts)
        } else {
            Self::Opaque(s.to_string())
        }
    }
}

impl fmt::Display for At {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str("now"),
            Self::Unix(ts) => write!(f, "{ts}"),
            Self::Opaque(s) => f.write_str(s),
        }
    }
}

impl From<i64> for At {
    fn from(ts: i64) -> Self {
        Self::Unix(ts)
    }
}

/// Client for one NDGR view resource.
///
/// Each [`connect`](Self::connect) spawns a fetch task that owns its cursor
/// and buffers; [`dispose`](Self::dispose) stops every connection made by
/// this client.
pub struct NdgrClient {
    view_uri: String,
    fetcher: Arc<dyn SegmentFetcher>,
    config: ClientConfig,
    token: CancellationToken,
}

impl NdgrClient {
    /// Create a client that fetches over HTTP.
    pub fn new(view_uri: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self::with_fetcher(view_uri, fetcher, config))
    }

    pub fn with_fetcher(
        view_uri: impl Into<String>,
        fetcher: Arc<dyn SegmentFetcher>,
        config: ClientConfig,
    ) -> Self {
        Self {
            view_uri: view_uri.into(),
            fetcher,
            config,
            token: CancellationToken::new(),
        }
    }

    pub fn view_uri(&self) -> &str {
        &self.view_uri
    }

    /// Start streaming from `at`, first replaying up to `num_backward`
    /// historical messages when the server offers them.
    ///
    /// Must be called inside a tokio runtime. The stream ends when the server
    /// stops supplying a cursor, on the first error (yielded as the last item)
    /// or on disposal. Dropping the stream stops its fetch task.
    pub fn connect(&self, at: At, num_backward: usize) -> MessageStream {
        let token = self.token.child_token();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let session = Session {
            ctx: FetchContext::new(
                self.fetcher.clone(),
                RetryPolicy::new(self.config.max_retry, self.config.retry_interval()),
                token.clone(),
            ),
            view_uri: self.view_uri.clone(),
            num_backward,
            backward_interval: self.config.backward_segment_interval(),
            tx,
        };

        info!(uri = %self.view_uri, at = %at, num_backward, "Connecting to comment stream");
        tokio::spawn(session.run(at));

        MessageStream {
            inner: ReceiverStream::new(rx),
            _guard: token.drop_guard(),
        }
    }

    /// Stop all connections. No fetch is issued and nothing is emitted after
    /// this returns.
    pub fn dispose(&self) {
        self.token.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for NdgrClient {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Messages of one connection in arrival order.
pub struct MessageStream {
    inner: ReceiverStream<Result<ChunkedMessage>>,
    _guard: DropGuard,
}

impl Stream for MessageStream {
    type Item = Result<ChunkedMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct Session {
    ctx: FetchContext,
    view_uri: String,
    num_backward: usize,
    backward_interval: Duration,
    tx: mpsc::Sender<Result<ChunkedMessage>>,
}

impl Session {
    async fn run(self, at: At) {
        match self.poll_head(at).await {
            Ok(()) => debug!(uri = %self.view_uri, "Comment stream finished"),
            Err(NdgrError::Disposed) => debug!(uri = %self.view_uri, "Comment stream disposed"),
            Err(e) => {
                warn!(uri = %self.view_uri, phase = ?e.phase(), error = %e, "Comment stream failed");
                if !self.ctx.token().is_cancelled() {
                    let _ = self.tx.send(Err(e)).await;
                }
            }
        }
    }

    async fn poll_head(&self, at: At) -> Result<()> {
        let mut next = Some(at);
        let mut init_phase = true;

        while let Some(at) = next.take() {
            self.ctx.ensure_live()?;
            let uri = head_uri(&self.view_uri, &at);
            let stream = self.ctx.open(&uri, "view", FetchPhase::Head).await?;
            let mut entries = FrameReader::<ChunkedEntry>::new(stream, uri, "view", FetchPhase::Head);

            while let Some(entry) = self.ctx.until_cancelled(entries.next()).await? {
                match entry?.entry {
                    Some(chunked_entry::Entry::Backward(backward)) => {
                        if !init_phase || self.num_backward == 0 {
                            continue;
                        }
                        let Some(segment) = backward.segment.filter(|s| !s.uri.is_empty()) else {
                            continue;
                        };
                        let messages = pull_backwards(
                            &self.ctx,
                            &segment.uri,
                            self.num_backward,
                            self.backward_interval,
                        )
                        .await?;
                        for message in messages {
                            self.emit(message).await?;
                        }
                    }
                    Some(chunked_entry::Entry::Previous(segment)) => {
                        if init_phase {
                            self.stream_segment(&segment.uri, "previous", FetchPhase::Previous)
                                .await?;
                        }
                    }
                    Some(chunked_entry::Entry::Segment(segment)) => {
                        init_phase = false;
                        self.stream_segment(&segment.uri, "segment", FetchPhase::Segment)
                            .await?;
                    }
                    Some(chunked_entry::Entry::Next(ready)) => {
                        next = Some(At::Unix(ready.at));
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    async fn stream_segment(&self, uri: &str, label: &str, phase: FetchPhase) -> Result<()> {
        self.ctx.ensure_live()?;
        let stream = self.ctx.open(uri, label, phase).await?;
        let mut messages = FrameReader::<ChunkedMessage>::new(stream, uri, label, phase);
        while let Some(message) = self.ctx.until_cancelled(messages.next()).await? {
            self.emit(message?).await?;
        }
        Ok(())
    }

    async fn emit(&self, message: ChunkedMessage) -> Result<()> {
        self.ctx.ensure_live()?;
        tokio::select! {
            biased;
            _ = self.ctx.token().cancelled() => Err(NdgrError::Disposed),
            sent = self.tx.send(Ok(message)) => sent.map_err(|_| NdgrError::Disposed),
        }
    }
}

fn head_uri(view_uri: &str, at: &At) -> String {
    let separator = if view_uri.contains('?') { '&' } else { '?' };
    let cursor = match at {
        At::Opaque(s) => urlencoding::encode(s).into_owned(),
        other => other.to_string(),
    };
    format!("{view_uri}{separator}at={cursor}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ByteStream;
    use crate::proto::{
        BackwardSegment, Chat, MessageSegment, NicoliveMessage, PackedSegment, chunked_message,
        nicolive_message, packed_segment,
    };
    use crate::FetchFailure;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use prost::Message;
    use std::collections::HashMap;

    /// In-memory resources keyed by URI; `held` resources never end.
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, Bytes>,
        held: Vec<String>,
        failures: Mutex<HashMap<String, Vec<FetchFailure>>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn body(mut self, uri: &str, body: impl Into<Bytes>) -> Self {
            self.bodies.insert(uri.to_string(), body.into());
            self
        }

        fn held(mut self, uri: &str, body: impl Into<Bytes>) -> Self {
            self.held.push(uri.to_string());
            self.body(uri, body)
        }

        fn fail(self, uri: &str, failures: Vec<FetchFailure>) -> Self {
            self.failures.lock().insert(uri.to_string(), failures);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl SegmentFetcher for FakeFetcher {
        async fn open(&self, uri: &str) -> std::result::Result<ByteStream, FetchFailure> {
            self.requests.lock().push(uri.to_string());
            if let Some(queue) = self.failures.lock().get_mut(uri) {
                if !queue.is_empty() {
                    return Err(queue.remove(0));
                }
            }
            let body = self.bodies.get(uri).cloned().ok_or(FetchFailure::Status(404))?;
            let head = futures::stream::iter(vec![Ok(body)]);
            if self.held.iter().any(|u| u == uri) {
                Ok(head.chain(futures::stream::pending()).boxed())
            } else {
                Ok(head.boxed())
            }
        }
    }

    fn frames<M: Message>(items: &[M]) -> Vec<u8> {
        let mut buf = Vec::new();
        for item in items {
            item.encode_length_delimited(&mut buf).unwrap();
        }
        buf
    }

    fn chat(id: &str) -> ChunkedMessage {
        ChunkedMessage {
            meta: Some(chunked_message::Meta {
                id: id.to_string(),
                at: None,
            }),
            payload: Some(chunked_message::Payload::Message(NicoliveMessage {
                data: Some(nicolive_message::Data::Chat(Chat {
                    content: id.to_string(),
                    ..Default::default()
                })),
            })),
        }
    }

    fn entry(entry: chunked_entry::Entry) -> ChunkedEntry {
        ChunkedEntry { entry: Some(entry) }
    }

    fn segment(uri: &str) -> MessageSegment {
        MessageSegment {
            from: None,
            until: None,
            uri: uri.to_string(),
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::default().with_retry_interval(Duration::from_millis(1000))
    }

    async fn collect_ids(stream: MessageStream) -> (Vec<String>, Option<NdgrError>) {
        let mut ids = Vec::new();
        let mut error = None;
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(m) => ids.push(m.id().unwrap_or_default().to_string()),
                Err(e) => error = Some(e),
            }
        }
        (ids, error)
    }

    #[test]
    fn test_at_parse_and_display() {
        assert_eq!(At::parse("now"), At::Now);
        assert_eq!(At::parse("1700000000"), At::Unix(1_700_000_000));
        assert_eq!(At::parse("abc"), At::Opaque("abc".to_string()));
        assert_eq!(At::Unix(5).to_string(), "5");
        assert_eq!(head_uri("https://x/view", &At::Now), "https://x/view?at=now");
        assert_eq!(
            head_uri("https://x/view?k=v", &At::Unix(9)),
            "https://x/view?k=v&at=9"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_directives_processed_in_order_with_next_cursor() {
        let head1 = frames(&[
            entry(chunked_entry::Entry::Previous(segment("prev"))),
            entry(chunked_entry::Entry::Segment(segment("seg1"))),
            entry(chunked_entry::Entry::Next(chunked_entry::ReadyForNext { at: 100 })),
        ]);
        let head2 = frames(&[
            entry(chunked_entry::Entry::Previous(segment("prev-late"))),
            entry(chunked_entry::Entry::Segment(segment("seg2"))),
        ]);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .body("view?at=now", head1)
                .body("view?at=100", head2)
                .body("prev", frames(&[chat("p1"), chat("p2")]))
                .body("prev-late", frames(&[chat("late")]))
                .body("seg1", frames(&[chat("s1")]))
                .body("seg2", frames(&[chat("s2")])),
        );

        let client = NdgrClient::with_fetcher("view", fetcher.clone(), config());
        let (ids, error) = collect_ids(client.connect(At::Now, 0)).await;

        assert!(error.is_none());
        assert_eq!(ids, vec!["p1", "p2", "s1", "s2"]);
        assert!(!fetcher.requests().contains(&"prev-late".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_prefix_only_when_requested() {
        let backward = BackwardSegment {
            until: None,
            segment: Some(packed_segment::Next {
                uri: "packed1".to_string(),
            }),
            snapshot: None,
        };
        let head = frames(&[
            entry(chunked_entry::Entry::Backward(backward)),
            entry(chunked_entry::Entry::Segment(segment("seg"))),
        ]);
        let packed = PackedSegment {
            messages: vec![chat("old1"), chat("old2"), chat("old3")],
            next: None,
            snapshot: None,
        };
        let fetcher = Arc::new(
            FakeFetcher::default()
                .body("view?at=now", head)
                .body("packed1", packed.encode_to_vec())
                .body("seg", frames(&[chat("live")])),
        );

        let client = NdgrClient::with_fetcher("view", fetcher.clone(), config());
        let (ids, _) = collect_ids(client.connect(At::Now, 2)).await;
        assert_eq!(ids, vec!["old2", "old3", "live"]);

        let (ids, _) = collect_ids(client.connect(At::Now, 0)).await;
        assert_eq!(ids, vec!["live"]);
        assert_eq!(
            fetcher.requests().iter().filter(|u| *u == "packed1").count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_are_retried() {
        let head = frames(&[entry(chunked_entry::Entry::Segment(segment("seg")))]);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .body("view?at=now", head)
                .body("seg", frames(&[chat("a")]))
                .fail(
                    "seg",
                    vec![
                        FetchFailure::Network("reset".into()),
                        FetchFailure::Network("reset".into()),
                    ],
                ),
        );

        let client = NdgrClient::with_fetcher("view", fetcher.clone(), config());
        let (ids, error) = collect_ids(client.connect(At::Now, 0)).await;

        assert!(error.is_none());
        assert_eq!(ids, vec!["a"]);
        assert_eq!(fetcher.requests().iter().filter(|u| *u == "seg").count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_failure_ends_stream_with_error() {
        let head = frames(&[entry(chunked_entry::Entry::Segment(segment("seg")))]);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .body("view?at=now", head)
                .fail("seg", vec![FetchFailure::Status(500)]),
        );

        let client = NdgrClient::with_fetcher("view", fetcher.clone(), config());
        let (ids, error) = collect_ids(client.connect(At::Now, 0)).await;

        assert!(ids.is_empty());
        match error {
            Some(NdgrError::Fetch(e)) => {
                assert_eq!(e.phase, FetchPhase::Segment);
                assert_eq!(e.failure, FetchFailure::Status(500));
                assert_eq!(e.uri, "seg");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fetcher.requests().iter().filter(|u| *u == "seg").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_completes_held_stream() {
        let head = frames(&[entry(chunked_entry::Entry::Segment(segment("seg")))]);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .body("view?at=now", head)
                .held("seg", frames(&[chat("a")])),
        );

        let client = NdgrClient::with_fetcher("view", fetcher.clone(), config());
        let mut stream = client.connect(At::Now, 0);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.id(), Some("a"));

        client.dispose();
        assert!(client.is_disposed());
        assert!(stream.next().await.is_none());
    }
}
