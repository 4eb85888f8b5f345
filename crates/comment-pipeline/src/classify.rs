//! Protocol message classification.

use chrono::Utc;
use ndgr_client::proto::{
    ChunkedMessage, NicoliveState, chat::AccountStatus, nicolive_message::Data,
    simple_notification,
};

use crate::message::{
    ChatValue, GiftValue, InboundMessage, MessageBody, NicoadValue, NotificationKind,
    NotificationValue, OperatorValue,
};
use crate::moderation::ModeratorEvent;

/// What one protocol message means for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Append to the comment list.
    Message(InboundMessage),
    /// Append to the comment list and pin it.
    Pin(InboundMessage),
    /// Clear the pinned message.
    Unpin,
    Moderation(ModeratorEvent),
    /// The program ended; the subscription should close.
    Ended,
}

/// Classify one protocol message. Most messages yield zero or one item; a
/// state change can carry several.
pub fn classify(msg: &ChunkedMessage) -> Vec<Classified> {
    let at = msg.at().unwrap_or_else(Utc::now);
    let wrap = |body: MessageBody| {
        let inbound = InboundMessage::new(body).with_at(at);
        match msg.id() {
            Some(id) => inbound.with_id(id),
            None => inbound,
        }
    };

    if let Some(message) = msg.message() {
        let Some(data) = &message.data else {
            return Vec::new();
        };
        return match data {
            Data::Chat(chat) => vec![Classified::Message(wrap(chat_body(chat, false)))],
            Data::OverflowedChat(chat) => vec![Classified::Message(wrap(chat_body(chat, true)))],
            Data::SimpleNotification(n) => n
                .message
                .as_ref()
                .map(|n| Classified::Message(wrap(MessageBody::Notification(notification(n)))))
                .into_iter()
                .collect(),
            Data::Gift(gift) => vec![Classified::Message(wrap(MessageBody::Gift(GiftValue {
                item_id: gift.item_id.clone(),
                item_name: gift.item_name.clone(),
                advertiser_name: gift.advertiser_name.clone(),
                advertiser_user_id: gift.advertiser_user_id,
                point: gift.point,
                message: gift.message.clone(),
                contribution_rank: gift.contribution_rank,
            })))],
            Data::Nicoad(ad) => ad
                .versions
                .as_ref()
                .map(|ndgr_client::proto::nicoad::Versions::V1(v1)| {
                    Classified::Message(wrap(MessageBody::Nicoad(NicoadValue {
                        total_ad_point: v1.total_ad_point,
                        message: v1.message.clone(),
                    })))
                })
                .into_iter()
                .collect(),
            Data::GameUpdate(_) => vec![Classified::Message(wrap(MessageBody::GameUpdate))],
            Data::SsngUpdated(update) => vec![Classified::Moderation(update.into())],
            Data::ModeratorUpdated(update) => vec![Classified::Moderation(update.into())],
        };
    }

    if let Some(state) = msg.state() {
        return classify_state(state, wrap);
    }

    Vec::new()
}

fn classify_state(
    state: &NicoliveState,
    wrap: impl Fn(MessageBody) -> InboundMessage,
) -> Vec<Classified> {
    let mut out = Vec::new();
    if let Some(marquee) = &state.marquee {
        match marquee.display.as_ref().and_then(|d| d.operator_comment.as_ref()) {
            Some(comment) => out.push(Classified::Pin(wrap(MessageBody::Operator(
                OperatorValue {
                    content: comment.content.clone(),
                    name: comment.name.clone(),
                    link: comment.link.clone(),
                },
            )))),
            None => out.push(Classified::Unpin),
        }
    }
    if state.is_ended() {
        out.push(Classified::Ended);
    }
    out
}

fn chat_body(chat: &ndgr_client::proto::Chat, overflowed: bool) -> MessageBody {
    MessageBody::Normal(ChatValue {
        content: chat.content.clone(),
        name: chat.name.clone(),
        user_id: chat.user_id(),
        no: chat.no,
        vpos: chat.vpos,
        premium: chat.account_status == AccountStatus::Premium as i32,
        overflowed,
    })
}

fn notification(message: &simple_notification::Message) -> NotificationValue {
    use simple_notification::Message as M;
    let (kind, text) = match message {
        M::Ichiba(s) => (NotificationKind::Ichiba, s),
        M::Quote(s) => (NotificationKind::Quote, s),
        M::Emotion(s) => (NotificationKind::Emotion, s),
        M::Cruise(s) => (NotificationKind::Cruise, s),
        M::ProgramExtended(s) => (NotificationKind::ProgramExtended, s),
        M::RankingIn(s) => (NotificationKind::RankingIn, s),
        M::RankingUpdated(s) => (NotificationKind::RankingUpdated, s),
        M::Visited(s) => (NotificationKind::Visited, s),
        M::SupporterRegistered(s) => (NotificationKind::SupporterRegistered, s),
        M::UserLevelUp(s) => (NotificationKind::UserLevelUp, s),
    };
    NotificationValue {
        kind,
        message: text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndgr_client::proto::{
        Chat, Marquee, NicoliveMessage, OperatorComment, ProgramStatus, SimpleNotification,
        SsngUpdated, chunked_message, marquee, program_status,
    };

    fn message(data: Data) -> ChunkedMessage {
        ChunkedMessage {
            meta: Some(chunked_message::Meta {
                id: "id1".to_string(),
                at: None,
            }),
            payload: Some(chunked_message::Payload::Message(NicoliveMessage {
                data: Some(data),
            })),
        }
    }

    fn state(state: NicoliveState) -> ChunkedMessage {
        ChunkedMessage {
            meta: None,
            payload: Some(chunked_message::Payload::State(state)),
        }
    }

    #[test]
    fn test_chat_is_normal() {
        let out = classify(&message(Data::Chat(Chat {
            content: "yay".to_string(),
            raw_user_id: Some(42),
            account_status: AccountStatus::Premium as i32,
            ..Default::default()
        })));
        match out.as_slice() {
            [Classified::Message(inbound)] => {
                assert_eq!(inbound.id.as_deref(), Some("id1"));
                match &inbound.body {
                    MessageBody::Normal(chat) => {
                        assert_eq!(chat.content, "yay");
                        assert_eq!(chat.user_id.as_deref(), Some("42"));
                        assert!(chat.premium);
                        assert!(!chat.overflowed);
                    }
                    other => panic!("unexpected body: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_notification_kinds() {
        let out = classify(&message(Data::SimpleNotification(SimpleNotification {
            message: Some(simple_notification::Message::Emotion("8888".to_string())),
        })));
        match out.as_slice() {
            [Classified::Message(inbound)] => assert_eq!(
                inbound.body,
                MessageBody::Notification(NotificationValue {
                    kind: NotificationKind::Emotion,
                    message: "8888".to_string(),
                })
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ssng_becomes_moderation() {
        let out = classify(&message(Data::SsngUpdated(SsngUpdated::default())));
        assert!(matches!(out.as_slice(), [Classified::Moderation(_)]));
    }

    #[test]
    fn test_marquee_pins_and_unpins() {
        let pin = classify(&state(NicoliveState {
            marquee: Some(Marquee {
                display: Some(marquee::Display {
                    operator_comment: Some(OperatorComment {
                        content: "welcome".to_string(),
                        name: Some("host".to_string()),
                        link: None,
                    }),
                }),
            }),
            program_status: None,
        }));
        assert!(matches!(pin.as_slice(), [Classified::Pin(_)]));

        let unpin = classify(&state(NicoliveState {
            marquee: Some(Marquee { display: None }),
            program_status: None,
        }));
        assert_eq!(unpin, vec![Classified::Unpin]);
    }

    #[test]
    fn test_ended_state() {
        let out = classify(&state(NicoliveState {
            marquee: None,
            program_status: Some(ProgramStatus {
                state: program_status::State::Ended as i32,
            }),
        }));
        assert_eq!(out, vec![Classified::Ended]);
    }

    #[test]
    fn test_signal_is_ignored() {
        let signal = ChunkedMessage {
            meta: None,
            payload: Some(chunked_message::Payload::Signal(0)),
        };
        assert!(classify(&signal).is_empty());
    }
}
