//! Sequential speech playback.
//!
//! Requests play one at a time on a single worker task. When the backlog
//! reaches [`SPEECH_BACKLOG_SKIP`] pending requests the whole backlog is
//! dropped before the next request is queued.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::speech::Speech;

/// Pending requests at which the backlog is dropped.
pub const SPEECH_BACKLOG_SKIP: usize = 5;

type Hook = Box<dyn FnOnce() + Send>;
type PhonemeHook = Box<dyn FnMut(&str) + Send>;

/// Callbacks fired while a request plays.
///
/// `on_start` and `on_end` fire at most once each. `on_end` always fires for
/// a request that started, including when it is cancelled.
#[derive(Default)]
pub struct SpeechHooks {
    started: bool,
    on_start: Option<Hook>,
    on_end: Option<Hook>,
    on_phoneme: Option<PhonemeHook>,
}

impl SpeechHooks {
    pub fn started(&mut self) {
        self.started = true;
        if let Some(hook) = self.on_start.take() {
            hook();
        }
    }

    /// Report a phoneme for lip-sync consumers.
    pub fn phoneme(&mut self, phoneme: &str) {
        if let Some(hook) = self.on_phoneme.as_mut() {
            hook(phoneme);
        }
    }

    pub fn ended(&mut self) {
        let hook = self.on_end.take();
        if self.started
            && let Some(hook) = hook
        {
            hook();
        }
    }
}

/// A speech engine.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Id matched against [`Speech::synthesizer_id`].
    fn id(&self) -> &str;

    /// Play `speech` to completion, calling `hooks.started()` when audio
    /// begins. The future may be dropped to cancel playback.
    async fn speak(&self, speech: &Speech, hooks: &mut SpeechHooks) -> Result<()>;
}

/// Registry of available synthesizers.
#[derive(Default)]
pub struct SynthesizerRegistry {
    synthesizers: Vec<Arc<dyn Synthesizer>>,
}

impl SynthesizerRegistry {
    pub fn new() -> Self {
        Self {
            synthesizers: Vec::new(),
        }
    }

    pub fn register(&mut self, synthesizer: Arc<dyn Synthesizer>) {
        self.synthesizers.push(synthesizer);
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<dyn Synthesizer>> {
        self.synthesizers.iter().find(|s| s.id() == id).cloned()
    }

    /// Like [`get_by_id`](Self::get_by_id), failing for unregistered ids.
    pub fn require(&self, id: &str) -> Result<Arc<dyn Synthesizer>> {
        self.get_by_id(id)
            .ok_or_else(|| PipelineError::synthesizer(id, "not registered"))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.synthesizers.iter().map(|s| s.id()).collect()
    }
}

/// A speech plus its callbacks.
pub struct SpeechRequest {
    pub speech: Speech,
    hooks: SpeechHooks,
}

impl SpeechRequest {
    pub fn new(speech: Speech) -> Self {
        Self {
            speech,
            hooks: SpeechHooks::default(),
        }
    }

    pub fn on_start(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hooks.on_start = Some(Box::new(hook));
        self
    }

    pub fn on_end(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hooks.on_end = Some(Box::new(hook));
        self
    }

    pub fn on_phoneme(mut self, hook: impl FnMut(&str) + Send + 'static) -> Self {
        self.hooks.on_phoneme = Some(Box::new(hook));
        self
    }
}

struct Inner {
    registry: SynthesizerRegistry,
    pending: Mutex<VecDeque<SpeechRequest>>,
    playing: Mutex<Option<CancellationToken>>,
    notify: Notify,
    shutdown: CancellationToken,
}

impl Inner {
    fn cancel_playing(&self) {
        if let Some(token) = self.playing.lock().take() {
            token.cancel();
        }
    }
}

/// Handle to the playback worker. Cloning shares the queue; the worker stops
/// when the last handle is dropped.
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<Inner>,
    _guard: Arc<DropGuard>,
}

enum Playback {
    Finished(Result<()>),
    Cancelled,
    Shutdown,
}

impl SpeechQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new(registry: SynthesizerRegistry) -> Self {
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            registry,
            pending: Mutex::new(VecDeque::new()),
            playing: Mutex::new(None),
            notify: Notify::new(),
            shutdown: shutdown.clone(),
        });
        tokio::spawn(run_worker(inner.clone()));
        Self {
            inner,
            _guard: Arc::new(shutdown.drop_guard()),
        }
    }

    /// Queue `request`.
    ///
    /// With `cancel_before_speaking` everything queued or playing is
    /// cancelled first, so the request plays next.
    pub fn enqueue(&self, request: SpeechRequest, cancel_before_speaking: bool) {
        {
            let mut pending = self.inner.pending.lock();
            if cancel_before_speaking {
                pending.clear();
                self.inner.cancel_playing();
            } else if pending.len() >= SPEECH_BACKLOG_SKIP {
                debug!(dropped = pending.len(), "Speech backlog skipped");
                pending.clear();
            }
            pending.push_back(request);
        }
        self.inner.notify.notify_one();
    }

    /// Drop everything queued and stop the current playback.
    pub fn cancel_all(&self) {
        self.inner.pending.lock().clear();
        self.inner.cancel_playing();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.playing.lock().is_some()
    }

    pub fn synthesizer_ids(&self) -> Vec<&str> {
        self.inner.registry.ids()
    }
}

async fn run_worker(inner: Arc<Inner>) {
    loop {
        // Pop and publish the playback token under one lock so an enqueue
        // with `cancel_before_speaking` always sees what it has to cancel.
        let next = {
            let mut pending = inner.pending.lock();
            pending.pop_front().map(|request| {
                let token = CancellationToken::new();
                *inner.playing.lock() = Some(token.clone());
                (request, token)
            })
        };
        let Some((mut request, token)) = next else {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = inner.notify.notified() => continue,
            }
        };

        let id = request.speech.synthesizer_id.clone();
        let synthesizer = match inner.registry.require(&id) {
            Ok(synthesizer) => synthesizer,
            Err(e) => {
                inner.playing.lock().take();
                warn!(error = %e, "Dropping speech");
                continue;
            }
        };

        let playback = tokio::select! {
            _ = inner.shutdown.cancelled() => Playback::Shutdown,
            _ = token.cancelled() => Playback::Cancelled,
            result = synthesizer.speak(&request.speech, &mut request.hooks) => Playback::Finished(result),
        };

        inner.playing.lock().take();
        request.hooks.ended();

        match playback {
            Playback::Finished(Ok(())) => {}
            Playback::Finished(Err(e)) => warn!(synthesizer = %id, error = %e, "Speech failed"),
            Playback::Cancelled => debug!(synthesizer = %id, "Speech cancelled"),
            Playback::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Records started and finished texts; each speech lasts one second.
    struct Recorder {
        started: Arc<Mutex<Vec<String>>>,
        finished: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Synthesizer for Recorder {
        fn id(&self) -> &str {
            "rec"
        }

        async fn speak(&self, speech: &Speech, hooks: &mut SpeechHooks) -> Result<()> {
            self.started.lock().push(speech.text.clone());
            hooks.started();
            hooks.phoneme("a");
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.finished.lock().push(speech.text.clone());
            Ok(())
        }
    }

    fn speech(text: &str) -> Speech {
        Speech {
            text: text.to_string(),
            synthesizer_id: "rec".to_string(),
            rate: 1.0,
            volume: 1.0,
            params: serde_json::Value::Null,
        }
    }

    fn queue() -> (SpeechQueue, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let started = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SynthesizerRegistry::new();
        registry.register(Arc::new(Recorder {
            started: started.clone(),
            finished: finished.clone(),
        }));
        (SpeechQueue::new(registry), started, finished)
    }

    async fn wait_until_speaking(queue: &SpeechQueue) {
        while !queue.is_speaking() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_is_dropped_at_threshold() {
        let (queue, started, _) = queue();

        queue.enqueue(SpeechRequest::new(speech("first")), false);
        wait_until_speaking(&queue).await;

        for text in ["b", "c", "d", "e", "f"] {
            queue.enqueue(SpeechRequest::new(speech(text)), false);
        }
        assert_eq!(queue.pending_len(), SPEECH_BACKLOG_SKIP);

        let (done_tx, done_rx) = oneshot::channel();
        queue.enqueue(
            SpeechRequest::new(speech("latest")).on_end(move || {
                let _ = done_tx.send(());
            }),
            false,
        );
        assert_eq!(queue.pending_len(), 1);

        done_rx.await.unwrap();
        assert_eq!(*started.lock(), vec!["first", "latest"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_speaking_plays_immediately() {
        let (queue, started, finished) = queue();

        let (first_end_tx, first_end_rx) = oneshot::channel();
        queue.enqueue(
            SpeechRequest::new(speech("first")).on_end(move || {
                let _ = first_end_tx.send(());
            }),
            false,
        );
        wait_until_speaking(&queue).await;
        queue.enqueue(SpeechRequest::new(speech("queued")), false);

        let (done_tx, done_rx) = oneshot::channel();
        queue.enqueue(
            SpeechRequest::new(speech("test")).on_end(move || {
                let _ = done_tx.send(());
            }),
            true,
        );

        first_end_rx.await.unwrap();
        done_rx.await.unwrap();
        assert_eq!(*started.lock(), vec!["first", "test"]);
        assert_eq!(*finished.lock(), vec!["test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hooks_fire_in_order() {
        let (queue, _, _) = queue();
        let events = Arc::new(Mutex::new(Vec::new()));

        let (done_tx, done_rx) = oneshot::channel();
        let start_events = events.clone();
        let phoneme_events = events.clone();
        let end_events = events.clone();
        queue.enqueue(
            SpeechRequest::new(speech("hello"))
                .on_start(move || start_events.lock().push("start".to_string()))
                .on_phoneme(move |p| phoneme_events.lock().push(format!("phoneme:{p}")))
                .on_end(move || {
                    end_events.lock().push("end".to_string());
                    let _ = done_tx.send(());
                }),
            false,
        );

        done_rx.await.unwrap();
        assert_eq!(*events.lock(), vec!["start", "phoneme:a", "end"]);
    }

    #[tokio::test]
    async fn test_unknown_synthesizer_is_skipped() {
        let (queue, started, _) = queue();
        let mut missing = speech("nobody");
        missing.synthesizer_id = "missing".to_string();
        queue.enqueue(SpeechRequest::new(missing), false);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(started.lock().is_empty());
        assert_eq!(queue.pending_len(), 0);
        assert!(!queue.is_speaking());
        assert_eq!(queue.synthesizer_ids(), vec!["rec"]);
    }

    #[test]
    fn test_require_reports_unregistered_id() {
        let registry = SynthesizerRegistry::new();
        match registry.require("missing") {
            Err(PipelineError::Synthesizer { id, .. }) => assert_eq!(id, "missing"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dequeued_request_is_immediately_cancellable() {
        let (queue, _, _) = queue();

        for i in 0..50 {
            queue.enqueue(SpeechRequest::new(speech(&format!("s{i}"))), true);
            while queue.pending_len() > 0 {
                tokio::task::yield_now().await;
            }
            assert!(queue.is_speaking(), "request s{i} dequeued without a token");
        }
    }
}
