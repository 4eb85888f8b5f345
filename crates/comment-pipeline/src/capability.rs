//! Externally supplied lookups used to annotate messages.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::message::{FilterAnnotation, MessageBody, WrappedMessage};

pub trait ModeratorLookup: Send + Sync {
    fn is_moderator(&self, user_id: &str) -> bool;
}

pub trait SupporterLookup: Send + Sync {
    fn is_supporter(&self, user_id: &str) -> bool;
}

/// Content filter over local and remote NG lists.
pub trait CommentFilter: Send + Sync {
    /// Keep the message but hide its text.
    fn is_filtered(&self, message: &WrappedMessage) -> bool;

    /// Whether the message passes the view filter (speech and relay).
    fn is_visible(&self, _message: &WrappedMessage) -> bool {
        true
    }
}

/// A mutable id set, usable as either lookup.
#[derive(Debug, Default)]
pub struct UserSet {
    ids: RwLock<HashSet<String>>,
}

impl UserSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn insert(&self, id: impl Into<String>) -> bool {
        self.ids.write().insert(id.into())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.ids.write().remove(id)
    }

    /// Replace the whole set.
    pub fn replace<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.ids.write() = ids.into_iter().map(Into::into).collect();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.read().contains(id)
    }
}

impl ModeratorLookup for UserSet {
    fn is_moderator(&self, user_id: &str) -> bool {
        self.contains(user_id)
    }
}

impl SupporterLookup for UserSet {
    fn is_supporter(&self, user_id: &str) -> bool {
        self.contains(user_id)
    }
}

/// Filter that never hides anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl CommentFilter for NoFilter {
    fn is_filtered(&self, _message: &WrappedMessage) -> bool {
        false
    }
}

/// The lookups a pipeline annotates with.
#[derive(Clone)]
pub struct Capabilities {
    pub moderators: Arc<dyn ModeratorLookup>,
    pub supporters: Arc<dyn SupporterLookup>,
    pub filter: Arc<dyn CommentFilter>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            moderators: Arc::new(UserSet::default()),
            supporters: Arc::new(UserSet::default()),
            filter: Arc::new(NoFilter),
        }
    }
}

impl Capabilities {
    /// Recompute the annotation of `message`.
    ///
    /// Only viewer chats are annotated; other kinds get the default.
    pub fn annotate(&self, message: WrappedMessage) -> WrappedMessage {
        if !matches!(message.body, MessageBody::Normal(_)) {
            return message.with_annotation(FilterAnnotation::default());
        }

        let (is_moderator, is_supporter) = match message.user_id() {
            Some(user_id) => (
                self.moderators.is_moderator(user_id),
                self.supporters.is_supporter(user_id),
            ),
            None => (false, false),
        };
        let flagged = message.with_annotation(FilterAnnotation {
            is_moderator,
            is_supporter,
            filtered: false,
        });
        let filtered = self.filter.is_filtered(&flagged);
        let annotation = FilterAnnotation {
            filtered,
            ..flagged.annotation
        };
        flagged.with_annotation(annotation)
    }
}

/// Notifies the pipeline that moderator or supporter sets changed.
#[derive(Debug, Clone)]
pub struct AnnotationSignal {
    tx: watch::Sender<u64>,
}

impl AnnotationSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Ask every subscribed pipeline to re-annotate its messages.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for AnnotationSignal {
    fn default() -> Self {
        Self::new()
    }
}
