//! Wrapped comment messages.
//!
//! A [`WrappedMessage`] is what the pipeline retains, displays, speaks and
//! relays. It is immutable; updates go through the `with_*` builders and
//! produce a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display text of a filtered comment.
pub const HIDDEN_PLACEHOLDER: &str = "## hidden comment ##";

/// Viewer chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatValue {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub no: i32,
    #[serde(default)]
    pub vpos: i32,
    #[serde(default)]
    pub premium: bool,
    /// Delivered through the overflow channel during a comment surge.
    #[serde(default)]
    pub overflowed: bool,
}

/// Broadcaster comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorValue {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Info,
    Error,
    Moderation,
    ConnectionEnded,
}

/// Message synthesized by the pipeline or the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemValue {
    pub kind: SystemKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftValue {
    pub item_id: String,
    pub item_name: String,
    pub advertiser_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertiser_user_id: Option<i64>,
    pub point: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution_rank: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicoadValue {
    pub total_ad_point: i32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Ichiba,
    Quote,
    Emotion,
    Cruise,
    ProgramExtended,
    RankingIn,
    RankingUpdated,
    Visited,
    SupporterRegistered,
    UserLevelUp,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ichiba => "ichiba",
            Self::Quote => "quote",
            Self::Emotion => "emotion",
            Self::Cruise => "cruise",
            Self::ProgramExtended => "programExtended",
            Self::RankingIn => "rankingIn",
            Self::RankingUpdated => "rankingUpdated",
            Self::Visited => "visited",
            Self::SupporterRegistered => "supporterRegistered",
            Self::UserLevelUp => "userLevelUp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationValue {
    pub kind: NotificationKind,
    pub message: String,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Normal(ChatValue),
    Operator(OperatorValue),
    System(SystemValue),
    Gift(GiftValue),
    Nicoad(NicoadValue),
    GameUpdate,
    Notification(NotificationValue),
}

impl MessageBody {
    pub fn system(kind: SystemKind, message: impl Into<String>) -> Self {
        Self::System(SystemValue {
            kind,
            message: message.into(),
        })
    }
}

/// Flags computed from the moderator, supporter and filter capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterAnnotation {
    pub is_moderator: bool,
    pub is_supporter: bool,
    pub filtered: bool,
}

/// A message before it is assigned a sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: Option<String>,
    pub at: DateTime<Utc>,
    pub body: MessageBody,
}

impl InboundMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: None,
            at: Utc::now(),
            body,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedMessage {
    /// Assigned at ingestion, increasing for the life of the pipeline.
    pub seq_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub at: DateTime<Utc>,
    pub body: MessageBody,
    #[serde(default)]
    pub annotation: FilterAnnotation,
}

impl WrappedMessage {
    pub fn new(seq_id: u64, inbound: InboundMessage) -> Self {
        Self {
            seq_id,
            id: inbound.id,
            at: inbound.at,
            body: inbound.body,
            annotation: FilterAnnotation::default(),
        }
    }

    pub fn with_annotation(self, annotation: FilterAnnotation) -> Self {
        Self { annotation, ..self }
    }

    /// Free-form type discriminator.
    pub fn type_name(&self) -> &'static str {
        match &self.body {
            MessageBody::Normal(_) => "normal",
            MessageBody::Operator(_) => "operator",
            MessageBody::System(_) => "system",
            MessageBody::Gift(_) => "gift",
            MessageBody::Nicoad(_) => "nicoad",
            MessageBody::GameUpdate => "gameUpdate",
            MessageBody::Notification(n) => n.kind.as_str(),
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.annotation.filtered
    }

    /// Poster's user id, for viewer chats.
    pub fn user_id(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Normal(chat) => chat.user_id.as_deref(),
            _ => None,
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Normal(chat) => chat.name.as_deref(),
            MessageBody::Operator(op) => op.name.as_deref(),
            MessageBody::Gift(gift) => Some(gift.advertiser_name.as_str()),
            _ => None,
        }
    }

    /// Whether the broadcaster posted this message.
    pub fn is_owner(&self) -> bool {
        matches!(self.body, MessageBody::Operator(_))
    }

    /// Original comment text, if this kind has one.
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Normal(chat) => Some(&chat.content),
            MessageBody::Operator(op) => Some(&op.content),
            _ => None,
        }
    }

    /// Text shown in the comment list.
    pub fn display_text(&self) -> String {
        if self.annotation.filtered {
            return HIDDEN_PLACEHOLDER.to_string();
        }
        match &self.body {
            MessageBody::Normal(chat) => chat.content.clone(),
            MessageBody::Operator(op) => op.content.clone(),
            MessageBody::System(sys) => sys.message.clone(),
            MessageBody::Gift(gift) => {
                let mut text = format!(
                    "{} gifted {} ({}pt)",
                    gift.advertiser_name, gift.item_name, gift.point
                );
                if !gift.message.is_empty() {
                    text.push_str(": ");
                    text.push_str(&gift.message);
                }
                text
            }
            MessageBody::Nicoad(ad) => {
                if ad.message.is_empty() {
                    format!("Nicoad total {}pt", ad.total_ad_point)
                } else {
                    ad.message.clone()
                }
            }
            MessageBody::GameUpdate => "Game updated".to_string(),
            MessageBody::Notification(n) => n.message.clone(),
        }
    }
}
