//! Local NG-list comment filter.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::capability::CommentFilter;
use crate::message::WrappedMessage;
use crate::settings::CommentSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Case-insensitive substrings that hide a comment.
    #[serde(default)]
    pub ng_words: Vec<String>,
    #[serde(default)]
    pub ng_user_ids: Vec<String>,
}

impl FilterSettings {
    fn matches(&self, user_id: Option<&str>, content: &str) -> bool {
        if let Some(user_id) = user_id
            && self.ng_user_ids.iter().any(|id| id == user_id)
        {
            return true;
        }
        let content = content.to_lowercase();
        self.ng_words
            .iter()
            .filter(|w| !w.is_empty())
            .any(|w| content.contains(&w.to_lowercase()))
    }
}

/// [`CommentFilter`] over the NG lists in the live settings plus a list
/// pushed by the host from the remote service.
pub struct NgWordFilter {
    settings: watch::Receiver<CommentSettings>,
    remote: RwLock<FilterSettings>,
}

impl NgWordFilter {
    pub fn new(settings: watch::Receiver<CommentSettings>) -> Self {
        Self {
            settings,
            remote: RwLock::new(FilterSettings::default()),
        }
    }

    /// Replace the remote NG list.
    pub fn set_remote(&self, remote: FilterSettings) {
        *self.remote.write() = remote;
    }
}

impl CommentFilter for NgWordFilter {
    fn is_filtered(&self, message: &WrappedMessage) -> bool {
        let Some(content) = message.content() else {
            return false;
        };
        let user_id = message.user_id();
        self.settings.borrow().filter.matches(user_id, content)
            || self.remote.read().matches(user_id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatValue, InboundMessage, MessageBody};

    fn chat(user_id: &str, content: &str) -> WrappedMessage {
        WrappedMessage::new(
            0,
            InboundMessage::new(MessageBody::Normal(ChatValue {
                content: content.to_string(),
                user_id: Some(user_id.to_string()),
                ..Default::default()
            })),
        )
    }

    #[test]
    fn test_local_and_remote_lists() {
        let mut settings = CommentSettings::default();
        settings.filter.ng_words = vec!["SPAM".to_string()];
        let (tx, rx) = watch::channel(settings);
        let filter = NgWordFilter::new(rx);

        assert!(filter.is_filtered(&chat("1", "buy spam now")));
        assert!(!filter.is_filtered(&chat("1", "hello")));

        filter.set_remote(FilterSettings {
            ng_words: Vec::new(),
            ng_user_ids: vec!["9".to_string()],
        });
        assert!(filter.is_filtered(&chat("9", "hello")));

        tx.send_modify(|s| s.filter.ng_words.clear());
        assert!(!filter.is_filtered(&chat("1", "buy spam now")));
    }
}
