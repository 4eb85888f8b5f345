//! The ingestion pipeline.
//!
//! A single task owns the comment subscription and all pipeline state:
//! - merges protocol messages with system notices and moderator events
//! - batches them into fixed windows and assigns sequence ids
//! - annotates, retains and publishes the comment list
//! - dispatches recent messages to speech and the HTTP relay

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use ndgr_client::proto::ChunkedMessage;
use ndgr_client::{At, ClientConfig, MessageStream, NdgrClient, NdgrError, SegmentFetcher};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::Capabilities;
use crate::classify::{Classified, classify};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{DisconnectReason, PipelineCommand, PipelineEvent, SpeakingEvent};
use crate::message::{InboundMessage, MessageBody, SystemKind, WrappedMessage};
use crate::moderation::ModeratorEvent;
use crate::relay::HttpRelay;
use crate::retention::retain;
use crate::settings::CommentSettings;
use crate::speech::SpeechConverter;
use crate::speech_queue::{SpeechQueue, SpeechRequest};

/// Text of the message appended when a subscription closes.
pub const CONNECTION_ENDED_MESSAGE: &str = "connection ended";

/// Snapshot of everything the view renders. Replaced whole on every change.
#[derive(Debug, Clone, Default)]
pub struct CommentState {
    /// Most recent messages in arrival order.
    pub messages: Vec<Arc<WrappedMessage>>,
    /// Messages pushed out of `messages`, oldest first.
    pub popout: Vec<Arc<WrappedMessage>>,
    pub pinned: Option<Arc<WrappedMessage>>,
    pub speaking_seq_id: Option<u64>,
}

/// Parameters for spawning a pipeline.
pub struct PipelineParams {
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub client_config: ClientConfig,
    pub config: PipelineConfig,
    pub capabilities: Capabilities,
    /// Fires when moderator or supporter sets change.
    pub annotation_changes: Option<watch::Receiver<u64>>,
    pub settings: watch::Receiver<CommentSettings>,
    pub speech_queue: Option<SpeechQueue>,
    pub relay: Option<HttpRelay>,
}

/// Handle to a running pipeline.
pub struct CommentPipeline {
    command_tx: mpsc::Sender<PipelineCommand>,
    notice_tx: mpsc::Sender<String>,
    moderator_tx: mpsc::Sender<ModeratorEvent>,
    state_rx: watch::Receiver<Arc<CommentState>>,
    event_tx: broadcast::Sender<PipelineEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommentPipeline {
    /// Spawn the pipeline task. Must be called inside a tokio runtime.
    pub fn spawn(params: PipelineParams) -> Self {
        let capacity = params.config.channel_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (notice_tx, notice_rx) = mpsc::channel(capacity);
        let (moderator_tx, moderator_rx) = mpsc::channel(capacity);
        let (speaking_tx, speaking_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(CommentState::default()));
        let (event_tx, _) = broadcast::channel(capacity);

        let PipelineParams {
            fetcher,
            client_config,
            config,
            capabilities,
            annotation_changes,
            settings,
            speech_queue,
            relay,
        } = params;

        let converter = SpeechConverter::new(settings.borrow().speech.clone());
        let runner = PipelineRunner {
            fetcher,
            client_config,
            config,
            capabilities,
            settings,
            converter,
            speech_queue,
            relay,
            uri: None,
            client: None,
            stream: None,
            pending: Vec::new(),
            next_seq: 0,
            state: CommentState::default(),
            state_tx,
            event_tx: event_tx.clone(),
            speaking_tx,
        };

        let task = tokio::spawn(runner.run(Receivers {
            commands: command_rx,
            notices: notice_rx,
            moderator_events: moderator_rx,
            speaking: speaking_rx,
            annotation_changes,
        }));

        Self {
            command_tx,
            notice_tx,
            moderator_tx,
            state_rx,
            event_tx,
            task: Mutex::new(Some(task)),
        }
    }

    async fn send(&self, command: PipelineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Switch to the comment stream at `uri`.
    ///
    /// Clears the comment list and pinned message. Connecting to the current
    /// URI again does nothing.
    pub async fn connect(&self, uri: impl Into<String>) -> Result<()> {
        self.send(PipelineCommand::Connect { uri: uri.into() })
            .await
    }

    /// Reconnect the comment stream, keeping the pinned message.
    pub async fn refresh(&self) -> Result<()> {
        self.send(PipelineCommand::Refresh).await
    }

    /// Stop the pipeline and wait for the task to exit.
    pub async fn dispose(&self) -> Result<()> {
        // The task may already be gone; that is the desired state.
        let _ = self.send(PipelineCommand::Dispose).await;
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Pipeline task did not exit cleanly");
        }
        Ok(())
    }

    /// Append a synthetic system message.
    pub async fn notify_system(&self, message: impl Into<String>) -> Result<()> {
        self.notice_tx
            .send(message.into())
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Sender for moderator events from a side channel. Survives reconnects.
    pub fn moderator_events(&self) -> mpsc::Sender<ModeratorEvent> {
        self.moderator_tx.clone()
    }

    pub fn state(&self) -> watch::Receiver<Arc<CommentState>> {
        self.state_rx.clone()
    }

    pub fn snapshot(&self) -> Arc<CommentState> {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }
}

struct Receivers {
    commands: mpsc::Receiver<PipelineCommand>,
    notices: mpsc::Receiver<String>,
    moderator_events: mpsc::Receiver<ModeratorEvent>,
    speaking: mpsc::UnboundedReceiver<SpeakingEvent>,
    annotation_changes: Option<watch::Receiver<u64>>,
}

/// Result of command handling.
#[derive(Debug, PartialEq)]
enum CommandResult {
    Continue,
    Stop,
}

/// Waiting for a batch window to close.
enum Pending {
    Message(InboundMessage),
    Pin(InboundMessage),
    Unpin,
}

/// A prepared batch.
struct Batch {
    messages: Vec<WrappedMessage>,
    /// `Some` when the batch changes the pinned message.
    pinned: Option<Option<WrappedMessage>>,
    /// Eligible for speech and relay, in arrival order.
    recent: Vec<WrappedMessage>,
}

struct PipelineRunner {
    fetcher: Arc<dyn SegmentFetcher>,
    client_config: ClientConfig,
    config: PipelineConfig,
    capabilities: Capabilities,
    settings: watch::Receiver<CommentSettings>,
    converter: SpeechConverter,
    speech_queue: Option<SpeechQueue>,
    relay: Option<HttpRelay>,

    // Subscription
    uri: Option<String>,
    client: Option<NdgrClient>,
    stream: Option<MessageStream>,

    pending: Vec<Pending>,
    next_seq: u64,

    state: CommentState,
    state_tx: watch::Sender<Arc<CommentState>>,
    event_tx: broadcast::Sender<PipelineEvent>,
    speaking_tx: mpsc::UnboundedSender<SpeakingEvent>,
}

async fn next_item(stream: &mut Option<MessageStream>) -> Option<ndgr_client::Result<ChunkedMessage>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn annotation_changed(rx: &mut Option<watch::Receiver<u64>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

impl PipelineRunner {
    async fn run(mut self, mut rx: Receivers) {
        let mut batch_interval = tokio::time::interval(self.config.batch_window());
        batch_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = rx.commands.recv() => {
                    if self.handle_command(cmd) == CommandResult::Stop {
                        break;
                    }
                }

                item = next_item(&mut self.stream) => self.handle_item(item),

                Some(message) = rx.notices.recv() => {
                    self.pending.push(Pending::Message(InboundMessage::new(
                        MessageBody::system(SystemKind::Info, message),
                    )));
                }

                Some(event) = rx.moderator_events.recv() => self.push_moderation(&event),

                Some(event) = rx.speaking.recv() => self.handle_speaking(event),

                changed = annotation_changed(&mut rx.annotation_changes) => {
                    if changed {
                        self.reannotate();
                    } else {
                        rx.annotation_changes = None;
                    }
                }

                _ = batch_interval.tick() => self.flush(),
            }
        }

        debug!("Comment pipeline stopped");
    }

    fn handle_command(&mut self, cmd: Option<PipelineCommand>) -> CommandResult {
        match cmd {
            Some(PipelineCommand::Connect { uri }) => {
                let uri = uri.trim().to_string();
                if uri.is_empty() || self.uri.as_deref() == Some(uri.as_str()) {
                    return CommandResult::Continue;
                }
                self.close_subscription();
                self.pending.clear();
                self.state.messages.clear();
                self.state.popout.clear();
                self.state.pinned = None;
                self.publish();
                self.open_subscription(uri);
                CommandResult::Continue
            }
            Some(PipelineCommand::Refresh) => {
                self.close_subscription();
                self.pending.clear();
                self.state.messages.clear();
                self.state.popout.clear();
                self.publish();
                if let Some(uri) = self.uri.take() {
                    self.open_subscription(uri);
                }
                CommandResult::Continue
            }
            Some(PipelineCommand::Dispose) | None => {
                self.close_subscription();
                self.uri = None;
                self.pending.clear();
                self.state = CommentState::default();
                self.publish();
                if let Some(queue) = &self.speech_queue {
                    queue.cancel_all();
                }
                CommandResult::Stop
            }
        }
    }

    fn open_subscription(&mut self, uri: String) {
        let client = NdgrClient::with_fetcher(
            uri.clone(),
            self.fetcher.clone(),
            self.client_config.clone(),
        );
        let at = At::parse(&self.config.start_at);
        self.stream = Some(client.connect(at, self.config.num_backward));
        self.client = Some(client);
        info!(uri = %uri, "Comment subscription opened");
        let _ = self.event_tx.send(PipelineEvent::Connected { uri: uri.clone() });
        self.uri = Some(uri);
    }

    /// Dispose the client and drop the stream. The target URI is kept.
    fn close_subscription(&mut self) {
        if let Some(client) = self.client.take() {
            client.dispose();
            info!(uri = %client.view_uri(), "Comment subscription closed");
        }
        self.stream = None;
    }

    /// The stream ended on its own: append the terminal message and close.
    fn end_subscription(&mut self, reason: DisconnectReason) {
        self.pending.push(Pending::Message(InboundMessage::new(MessageBody::system(
            SystemKind::ConnectionEnded,
            CONNECTION_ENDED_MESSAGE,
        ))));
        self.close_subscription();

        let uri = self.uri.clone().unwrap_or_default();
        if reason == DisconnectReason::ProgramEnded {
            let _ = self
                .event_tx
                .send(PipelineEvent::ProgramEnded { uri: uri.clone() });
        }
        let _ = self
            .event_tx
            .send(PipelineEvent::Disconnected { uri, reason });
    }

    fn handle_item(&mut self, item: Option<ndgr_client::Result<ChunkedMessage>>) {
        match item {
            Some(Ok(message)) => {
                for classified in classify(&message) {
                    match classified {
                        Classified::Message(inbound) => self.pending.push(Pending::Message(inbound)),
                        Classified::Pin(inbound) => self.pending.push(Pending::Pin(inbound)),
                        Classified::Unpin => self.pending.push(Pending::Unpin),
                        Classified::Moderation(event) => self.push_moderation(&event),
                        Classified::Ended => {
                            self.end_subscription(DisconnectReason::ProgramEnded);
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(uri = ?self.uri, error = %e, "Comment stream failed");
                self.pending.push(Pending::Message(InboundMessage::new(MessageBody::system(
                    SystemKind::Error,
                    describe_error(&e),
                ))));
                self.end_subscription(DisconnectReason::Failed(e.to_string()));
            }
            None => self.end_subscription(DisconnectReason::Completed),
        }
    }

    fn push_moderation(&mut self, event: &ModeratorEvent) {
        self.pending.push(Pending::Message(InboundMessage::new(MessageBody::system(
            SystemKind::Moderation,
            event.to_system_message(),
        ))));
    }

    fn handle_speaking(&mut self, event: SpeakingEvent) {
        match event {
            SpeakingEvent::Started(seq_id) => self.state.speaking_seq_id = Some(seq_id),
            SpeakingEvent::Ended(seq_id) => {
                if self.state.speaking_seq_id != Some(seq_id) {
                    return;
                }
                self.state.speaking_seq_id = None;
            }
        }
        self.publish();
    }

    /// Recompute annotations of every held message.
    fn reannotate(&mut self) {
        let caps = &self.capabilities;
        let annotate = |m: &Arc<WrappedMessage>| Arc::new(caps.annotate(WrappedMessage::clone(m)));
        let result = catch_unwind(AssertUnwindSafe(|| {
            (
                self.state.messages.iter().map(annotate).collect::<Vec<_>>(),
                self.state.popout.iter().map(annotate).collect::<Vec<_>>(),
                self.state.pinned.as_ref().map(annotate),
            )
        }));
        match result {
            Ok((messages, popout, pinned)) => {
                self.state.messages = messages;
                self.state.popout = popout;
                self.state.pinned = pinned;
                debug!(messages = self.state.messages.len(), "Annotations refreshed");
                self.publish();
            }
            Err(_) => error!("Panic while refreshing annotations"),
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        if self.settings.has_changed().unwrap_or(false) {
            let speech = self.settings.borrow_and_update().speech.clone();
            self.converter = SpeechConverter::new(speech);
        }

        let pending = std::mem::take(&mut self.pending);
        let size = pending.len();
        let first_seq = self.next_seq;

        let batch = match catch_unwind(AssertUnwindSafe(|| self.prepare_batch(first_seq, pending)))
        {
            Ok(batch) => batch,
            Err(_) => {
                error!(first_seq, size, "Panic while preparing comment batch, dropping it");
                return;
            }
        };
        self.next_seq += batch.messages.len() as u64;

        let retained = retain(
            &self.state.messages,
            &batch.messages.into_iter().map(Arc::new).collect::<Vec<_>>(),
            self.config.max_retain,
        );
        self.state.messages = retained.retained;
        self.state.popout.extend(retained.overflow);
        if let Some(pinned) = batch.pinned {
            self.state.pinned = pinned.map(Arc::new);
        }
        self.publish();

        self.dispatch(batch.recent);
    }

    /// Assign sequence ids, annotate and select speech candidates.
    fn prepare_batch(&self, first_seq: u64, pending: Vec<Pending>) -> Batch {
        let mut seq = first_seq;
        let mut messages = Vec::with_capacity(pending.len());
        let mut pinned = None;

        for item in pending {
            match item {
                Pending::Message(inbound) => {
                    messages.push(self.capabilities.annotate(WrappedMessage::new(seq, inbound)));
                    seq += 1;
                }
                Pending::Pin(inbound) => {
                    let message = self.capabilities.annotate(WrappedMessage::new(seq, inbound));
                    seq += 1;
                    pinned = Some(Some(message.clone()));
                    messages.push(message);
                }
                Pending::Unpin => pinned = Some(None),
            }
        }

        let cutoff = Utc::now() - self.config.speech_recency();
        let recent = messages
            .iter()
            .filter(|m| m.at > cutoff)
            .filter(|m| !m.is_filtered())
            .filter(|m| self.capabilities.filter.is_visible(m))
            .cloned()
            .collect();

        Batch {
            messages,
            pinned,
            recent,
        }
    }

    /// Relay every recent message and speak the last few.
    fn dispatch(&self, recent: Vec<WrappedMessage>) {
        if recent.is_empty() {
            return;
        }

        if let Some(relay) = &self.relay {
            let config = self.settings.borrow().relay.clone();
            if config.is_enabled() {
                for message in &recent {
                    let relay = relay.clone();
                    let config = config.clone();
                    let message = message.clone();
                    tokio::spawn(async move {
                        let response = relay.send(&message, &config).await;
                        debug!(seq_id = message.seq_id, response = %response, "Relay response");
                    });
                }
            }
        }

        let Some(queue) = &self.speech_queue else {
            return;
        };
        let skip = recent.len().saturating_sub(self.config.speech_batch_cap);
        for message in recent.iter().skip(skip) {
            let Some(speech) = self.converter.convert(message) else {
                continue;
            };
            let seq_id = message.seq_id;
            let start_tx = self.speaking_tx.clone();
            let end_tx = self.speaking_tx.clone();
            queue.enqueue(
                SpeechRequest::new(speech)
                    .on_start(move || {
                        let _ = start_tx.send(SpeakingEvent::Started(seq_id));
                    })
                    .on_end(move || {
                        let _ = end_tx.send(SpeakingEvent::Ended(seq_id));
                    }),
                false,
            );
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(Arc::new(self.state.clone()));
    }
}

/// User-facing description of a connection failure.
fn describe_error(error: &NdgrError) -> String {
    use ndgr_client::FetchPhase;

    match error {
        NdgrError::Fetch(e) => {
            let what = match e.phase {
                FetchPhase::Head => "Failed to fetch comment server information",
                FetchPhase::Backward => "Failed to fetch past comments",
                FetchPhase::Previous => "Failed to fetch recent comments",
                FetchPhase::Segment => "Failed to fetch comments",
            };
            match e.failure.status() {
                Some(status) => format!("{what} (HTTP {status})"),
                None => format!("{what} ({})", e.failure),
            }
        }
        NdgrError::Decode { .. } => "Received malformed comment data".to_string(),
        NdgrError::Disposed => "Comment connection was closed".to_string(),
    }
}
