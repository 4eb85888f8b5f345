//! Moderator events.
//!
//! These arrive either in-band on the comment stream or from a side channel
//! owned by the host; both become system messages in the comment list.

use ndgr_client::proto::{self, ModerationOperation, ssng_updated::SsngType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Delete,
}

/// What an SSNG rule blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SsngRule {
    Word,
    User,
    Command,
    Unknown,
}

impl SsngRule {
    fn noun(&self) -> &'static str {
        match self {
            Self::Word => "NG word",
            Self::User => "NG user",
            Self::Command => "NG command",
            Self::Unknown => "NG rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeratorEvent {
    /// A moderator added or removed a block rule.
    Ssng {
        operation: Operation,
        rule: SsngRule,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        operator: Option<String>,
    },
    /// A user was granted or lost moderator rights.
    Moderator {
        operation: Operation,
        #[serde(default)]
        operator: Option<String>,
    },
}

fn operation_from(value: i32) -> Operation {
    match ModerationOperation::try_from(value) {
        Ok(ModerationOperation::Delete) => Operation::Delete,
        _ => Operation::Add,
    }
}

fn operator_name(info: Option<&proto::ModeratorUserInfo>) -> Option<String> {
    let info = info?;
    info.nickname
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| (info.user_id != 0).then(|| info.user_id.to_string()))
}

impl From<&proto::SsngUpdated> for ModeratorEvent {
    fn from(msg: &proto::SsngUpdated) -> Self {
        let rule = match SsngType::try_from(msg.r#type) {
            Ok(SsngType::Word) => SsngRule::Word,
            Ok(SsngType::User) => SsngRule::User,
            Ok(SsngType::Command) => SsngRule::Command,
            _ => SsngRule::Unknown,
        };
        Self::Ssng {
            operation: operation_from(msg.operation),
            rule,
            source: msg.source.clone().filter(|s| !s.is_empty()),
            operator: operator_name(msg.operator.as_ref()),
        }
    }
}

impl From<&proto::ModeratorUpdated> for ModeratorEvent {
    fn from(msg: &proto::ModeratorUpdated) -> Self {
        Self::Moderator {
            operation: operation_from(msg.operation),
            operator: operator_name(msg.operator.as_ref()),
        }
    }
}

impl ModeratorEvent {
    /// Text of the system message announcing this event.
    pub fn to_system_message(&self) -> String {
        match self {
            Self::Ssng {
                operation,
                rule,
                source,
                operator,
            } => {
                let who = operator.as_deref().unwrap_or("A moderator");
                let verb = match operation {
                    Operation::Add => "added",
                    Operation::Delete => "removed",
                };
                // User rules carry an id that should not be displayed.
                match (rule, source) {
                    (SsngRule::Word | SsngRule::Command, Some(source)) => {
                        format!("{who} {verb} {} \"{source}\"", rule.noun())
                    }
                    _ => format!("{who} {verb} an {}", rule.noun()),
                }
            }
            Self::Moderator {
                operation,
                operator,
            } => {
                let who = operator.as_deref().unwrap_or("A user");
                match operation {
                    Operation::Add => format!("{who} was added as a moderator"),
                    Operation::Delete => format!("{who} was removed from moderators"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssng_word_message() {
        let update = proto::SsngUpdated {
            operation: ModerationOperation::Add as i32,
            ssng_id: 1,
            operator: Some(proto::ModeratorUserInfo {
                user_id: 10,
                nickname: Some("mod".to_string()),
            }),
            r#type: SsngType::Word as i32,
            source: Some("spam".to_string()),
        };
        let event = ModeratorEvent::from(&update);
        assert_eq!(event.to_system_message(), "mod added NG word \"spam\"");
    }

    #[test]
    fn test_ssng_user_hides_source() {
        let event = ModeratorEvent::Ssng {
            operation: Operation::Delete,
            rule: SsngRule::User,
            source: Some("12345".to_string()),
            operator: None,
        };
        assert_eq!(event.to_system_message(), "A moderator removed an NG user");
    }

    #[test]
    fn test_operator_falls_back_to_user_id() {
        let update = proto::ModeratorUpdated {
            operation: ModerationOperation::Delete as i32,
            operator: Some(proto::ModeratorUserInfo {
                user_id: 77,
                nickname: None,
            }),
        };
        assert_eq!(
            ModeratorEvent::from(&update).to_system_message(),
            "77 was removed from moderators"
        );
    }
}
