//! NDGR wire types.
//!
//! Declared by hand with the prost derive macros so the crate builds without
//! `protoc`. Only the fields the client and pipeline consume are declared;
//! unknown fields are skipped by prost when decoding.

use chrono::{DateTime, TimeZone, Utc};
use prost_types::Timestamp;

/// One directive from the head resource.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkedEntry {
    #[prost(oneof = "chunked_entry::Entry", tags = "1, 2, 3, 4")]
    pub entry: Option<chunked_entry::Entry>,
}

pub mod chunked_entry {
    /// Cursor for the next head poll.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ReadyForNext {
        #[prost(int64, tag = "1")]
        pub at: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Entry {
        #[prost(message, tag = "1")]
        Segment(super::MessageSegment),
        #[prost(message, tag = "2")]
        Backward(super::BackwardSegment),
        #[prost(message, tag = "3")]
        Previous(super::MessageSegment),
        #[prost(message, tag = "4")]
        Next(ReadyForNext),
    }
}

/// A streamable range of messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageSegment {
    #[prost(message, optional, tag = "1")]
    pub from: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub until: Option<Timestamp>,
    #[prost(string, tag = "3")]
    pub uri: String,
}

/// Entry point for catch-up pagination.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BackwardSegment {
    #[prost(message, optional, tag = "1")]
    pub until: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub segment: Option<packed_segment::Next>,
    #[prost(message, optional, tag = "3")]
    pub snapshot: Option<StateSnapshot>,
}

/// A page of historical messages with an optional link to the previous page.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PackedSegment {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<ChunkedMessage>,
    #[prost(message, optional, tag = "2")]
    pub next: Option<packed_segment::Next>,
    #[prost(message, optional, tag = "3")]
    pub snapshot: Option<StateSnapshot>,
}

pub mod packed_segment {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Next {
        #[prost(string, tag = "1")]
        pub uri: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateSnapshot {
    #[prost(string, tag = "1")]
    pub uri: String,
}

/// A single delivered item: a message, a state change or a signal.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkedMessage {
    #[prost(message, optional, tag = "1")]
    pub meta: Option<chunked_message::Meta>,
    #[prost(oneof = "chunked_message::Payload", tags = "2, 4, 5")]
    pub payload: Option<chunked_message::Payload>,
}

pub mod chunked_message {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Meta {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(message, optional, tag = "2")]
        pub at: Option<::prost_types::Timestamp>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Signal {
        Flushed = 0,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        Message(super::NicoliveMessage),
        #[prost(message, tag = "4")]
        State(super::NicoliveState),
        #[prost(enumeration = "Signal", tag = "5")]
        Signal(i32),
    }
}

impl ChunkedMessage {
    /// Message id from the meta block, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .map(|m| m.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Server-side timestamp of the message.
    pub fn at(&self) -> Option<DateTime<Utc>> {
        let at = self.meta.as_ref()?.at.as_ref()?;
        let nanos = u32::try_from(at.nanos).ok()?;
        Utc.timestamp_opt(at.seconds, nanos).single()
    }

    pub fn message(&self) -> Option<&NicoliveMessage> {
        match &self.payload {
            Some(chunked_message::Payload::Message(m)) => Some(m),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<&NicoliveState> {
        match &self.payload {
            Some(chunked_message::Payload::State(s)) => Some(s),
            _ => None,
        }
    }
}

/// Viewer-visible message payloads.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NicoliveMessage {
    #[prost(oneof = "nicolive_message::Data", tags = "1, 7, 8, 9, 13, 18, 19, 20")]
    pub data: Option<nicolive_message::Data>,
}

pub mod nicolive_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Chat(super::Chat),
        #[prost(message, tag = "7")]
        SimpleNotification(super::SimpleNotification),
        #[prost(message, tag = "8")]
        Gift(super::Gift),
        #[prost(message, tag = "9")]
        Nicoad(super::Nicoad),
        #[prost(message, tag = "13")]
        GameUpdate(super::GameUpdate),
        #[prost(message, tag = "18")]
        ModeratorUpdated(super::ModeratorUpdated),
        #[prost(message, tag = "19")]
        SsngUpdated(super::SsngUpdated),
        #[prost(message, tag = "20")]
        OverflowedChat(super::Chat),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chat {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(int32, tag = "3")]
    pub vpos: i32,
    #[prost(enumeration = "chat::AccountStatus", tag = "4")]
    pub account_status: i32,
    #[prost(int64, optional, tag = "5")]
    pub raw_user_id: Option<i64>,
    #[prost(string, optional, tag = "6")]
    pub hashed_user_id: Option<String>,
    #[prost(int32, tag = "8")]
    pub no: i32,
}

pub mod chat {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AccountStatus {
        Standard = 0,
        Premium = 1,
    }
}

impl Chat {
    /// Raw user id when known, otherwise the hashed (anonymous) id.
    pub fn user_id(&self) -> Option<String> {
        self.raw_user_id
            .filter(|id| *id != 0)
            .map(|id| id.to_string())
            .or_else(|| self.hashed_user_id.clone().filter(|id| !id.is_empty()))
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleNotification {
    #[prost(
        oneof = "simple_notification::Message",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10"
    )]
    pub message: Option<simple_notification::Message>,
}

pub mod simple_notification {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(string, tag = "1")]
        Ichiba(String),
        #[prost(string, tag = "2")]
        Quote(String),
        #[prost(string, tag = "3")]
        Emotion(String),
        #[prost(string, tag = "4")]
        Cruise(String),
        #[prost(string, tag = "5")]
        ProgramExtended(String),
        #[prost(string, tag = "6")]
        RankingIn(String),
        #[prost(string, tag = "7")]
        RankingUpdated(String),
        #[prost(string, tag = "8")]
        Visited(String),
        #[prost(string, tag = "9")]
        SupporterRegistered(String),
        #[prost(string, tag = "10")]
        UserLevelUp(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Gift {
    #[prost(string, tag = "1")]
    pub item_id: String,
    #[prost(int64, optional, tag = "2")]
    pub advertiser_user_id: Option<i64>,
    #[prost(string, tag = "3")]
    pub advertiser_name: String,
    #[prost(int64, tag = "4")]
    pub point: i64,
    #[prost(string, tag = "5")]
    pub message: String,
    #[prost(string, tag = "6")]
    pub item_name: String,
    #[prost(int32, optional, tag = "7")]
    pub contribution_rank: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Nicoad {
    #[prost(oneof = "nicoad::Versions", tags = "2")]
    pub versions: Option<nicoad::Versions>,
}

pub mod nicoad {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct V1 {
        #[prost(int32, tag = "1")]
        pub total_ad_point: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Versions {
        #[prost(message, tag = "2")]
        V1(V1),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GameUpdate {}

/// Moderator who performed a moderation change.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModeratorUserInfo {
    #[prost(int64, tag = "1")]
    pub user_id: i64,
    #[prost(string, optional, tag = "2")]
    pub nickname: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ModerationOperation {
    Add = 0,
    Delete = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModeratorUpdated {
    #[prost(enumeration = "ModerationOperation", tag = "1")]
    pub operation: i32,
    #[prost(message, optional, tag = "2")]
    pub operator: Option<ModeratorUserInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SsngUpdated {
    #[prost(enumeration = "ModerationOperation", tag = "1")]
    pub operation: i32,
    #[prost(int64, tag = "2")]
    pub ssng_id: i64,
    #[prost(message, optional, tag = "3")]
    pub operator: Option<ModeratorUserInfo>,
    #[prost(enumeration = "ssng_updated::SsngType", tag = "4")]
    pub r#type: i32,
    #[prost(string, optional, tag = "5")]
    pub source: Option<String>,
}

pub mod ssng_updated {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum SsngType {
        Unknown = 0,
        User = 1,
        Word = 2,
        Command = 3,
    }
}

/// Program state changes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NicoliveState {
    #[prost(message, optional, tag = "4")]
    pub marquee: Option<Marquee>,
    #[prost(message, optional, tag = "9")]
    pub program_status: Option<ProgramStatus>,
}

impl NicoliveState {
    /// Whether this state announces the end of the program.
    pub fn is_ended(&self) -> bool {
        self.program_status
            .as_ref()
            .is_some_and(|s| s.state == program_status::State::Ended as i32)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Marquee {
    #[prost(message, optional, tag = "1")]
    pub display: Option<marquee::Display>,
}

pub mod marquee {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Display {
        #[prost(message, optional, tag = "1")]
        pub operator_comment: Option<super::OperatorComment>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OperatorComment {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub link: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProgramStatus {
    #[prost(enumeration = "program_status::State", tag = "1")]
    pub state: i32,
}

pub mod program_status {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum State {
        Unknown = 0,
        Ended = 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_chunked_message_accessors() {
        let msg = ChunkedMessage {
            meta: Some(chunked_message::Meta {
                id: "m1".to_string(),
                at: Some(Timestamp {
                    seconds: 1_700_000_000,
                    nanos: 0,
                }),
            }),
            payload: Some(chunked_message::Payload::Message(NicoliveMessage {
                data: Some(nicolive_message::Data::Chat(Chat {
                    content: "hello".to_string(),
                    ..Default::default()
                })),
            })),
        };

        assert_eq!(msg.id(), Some("m1"));
        assert_eq!(msg.at().map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(msg.message().is_some());
        assert!(msg.state().is_none());

        let decoded = ChunkedMessage::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_chat_user_id_prefers_raw_id() {
        let chat = Chat {
            raw_user_id: Some(42),
            hashed_user_id: Some("a:xyz".to_string()),
            ..Default::default()
        };
        assert_eq!(chat.user_id().as_deref(), Some("42"));

        let anonymous = Chat {
            raw_user_id: Some(0),
            hashed_user_id: Some("a:xyz".to_string()),
            ..Default::default()
        };
        assert_eq!(anonymous.user_id().as_deref(), Some("a:xyz"));
        assert_eq!(Chat::default().user_id(), None);
    }

    #[test]
    fn test_program_ended_state() {
        let state = NicoliveState {
            program_status: Some(ProgramStatus {
                state: program_status::State::Ended as i32,
            }),
            ..Default::default()
        };
        assert!(state.is_ended());
        assert!(!NicoliveState::default().is_ended());
    }
}
