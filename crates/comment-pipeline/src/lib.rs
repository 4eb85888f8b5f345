//! # comment-pipeline
//!
//! Turns an NDGR comment stream into a bounded, annotated comment list and
//! fans recent messages out to speech synthesis and an HTTP relay.
//!
//! ## Components
//!
//! - [`CommentPipeline`] - Subscription owner, batching and retention
//! - [`classify`] - Protocol message to [`MessageBody`] mapping
//! - [`Capabilities`] - Moderator, supporter and NG-filter lookups
//! - [`SpeechConverter`] / [`SpeechQueue`] - Text-to-speech preparation and playback
//! - [`HttpRelay`] - Templated HTTP forwarding
//! - [`SettingsStore`] - Persisted user settings
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use comment_pipeline::{CommentPipeline, PipelineParams};
//!
//! let pipeline = CommentPipeline::spawn(params);
//! pipeline.connect("https://example.com/api/view/v4/...").await?;
//! let mut state = pipeline.state();
//! while state.changed().await.is_ok() {
//!     println!("{} comments", state.borrow().messages.len());
//! }
//! ```

pub mod capability;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod message;
pub mod moderation;
pub mod pipeline;
pub mod relay;
pub mod retention;
pub mod settings;
pub mod speech;
pub mod speech_queue;

pub use capability::{
    AnnotationSignal, Capabilities, CommentFilter, ModeratorLookup, NoFilter, SupporterLookup,
    UserSet,
};
pub use classify::{Classified, classify};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::{DisconnectReason, PipelineEvent};
pub use filter::{FilterSettings, NgWordFilter};
pub use message::{
    ChatValue, FilterAnnotation, GiftValue, HIDDEN_PLACEHOLDER, InboundMessage, MessageBody,
    NicoadValue, NotificationKind, NotificationValue, OperatorValue, SystemKind, SystemValue,
    WrappedMessage,
};
pub use moderation::{ModeratorEvent, Operation, SsngRule};
pub use pipeline::{CONNECTION_ENDED_MESSAGE, CommentPipeline, CommentState, PipelineParams};
pub use relay::{HttpRelay, RelayConfig, RelayParams};
pub use retention::{MAX_RETAIN, Retained, retain};
pub use settings::{CommentSettings, SettingsStore};
pub use speech::{Speech, SpeechConverter, SpeechSettings, SynthesizerSelection};
pub use speech_queue::{
    SpeechHooks, SpeechQueue, SpeechRequest, Synthesizer, SynthesizerRegistry,
};
