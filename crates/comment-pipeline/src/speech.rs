//! Conversion of comments into speech requests.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::message::{MessageBody, NotificationKind, WrappedMessage};

/// Synthesizer selection that disables speech for a category.
pub const IGNORE_SYNTHESIZER: &str = "ignore";

/// Runs of one character longer than this are shortened.
const MAX_CHAR_RUN: usize = 4;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[\w!?/+\-_~;.,*&@#$%()'\[\]=:]+").unwrap());

/// Something to say, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speech {
    pub text: String,
    pub synthesizer_id: String,
    pub rate: f64,
    pub volume: f64,
    /// Synthesizer-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Which synthesizer speaks each message category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizerSelection {
    #[serde(default = "default_synthesizer")]
    pub normal: String,
    #[serde(default = "default_synthesizer")]
    pub operator: String,
    #[serde(default = "default_synthesizer")]
    pub gift: String,
    #[serde(default = "default_synthesizer")]
    pub nicoad: String,
    #[serde(default = "default_synthesizer")]
    pub emotion: String,
    #[serde(default = "default_synthesizer")]
    pub notification: String,
    #[serde(default = "default_synthesizer")]
    pub system: String,
}

fn default_synthesizer() -> String {
    "default".to_string()
}

impl Default for SynthesizerSelection {
    fn default() -> Self {
        Self {
            normal: default_synthesizer(),
            operator: default_synthesizer(),
            gift: default_synthesizer(),
            nicoad: default_synthesizer(),
            emotion: default_synthesizer(),
            notification: default_synthesizer(),
            system: default_synthesizer(),
        }
    }
}

impl SynthesizerSelection {
    /// Synthesizer id for `message`.
    pub fn for_message(&self, message: &WrappedMessage) -> &str {
        match &message.body {
            MessageBody::Normal(_) => &self.normal,
            MessageBody::Operator(_) => &self.operator,
            MessageBody::Gift(_) => &self.gift,
            MessageBody::Nicoad(_) => &self.nicoad,
            MessageBody::Notification(n) if n.kind == NotificationKind::Emotion => &self.emotion,
            MessageBody::Notification(_) => &self.notification,
            MessageBody::System(_) | MessageBody::GameUpdate => &self.system,
        }
    }
}

/// User dictionary substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub pattern: String,
    pub replacement: String,
    /// Treat `pattern` as a regular expression.
    #[serde(default)]
    pub regex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Maximum spoken characters, 0 for no limit.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub synthesizers: SynthesizerSelection,
    /// Parameters per synthesizer id.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dictionary: Vec<DictionaryEntry>,
}

fn default_true() -> bool {
    true
}

fn default_rate() -> f64 {
    1.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_max_length() -> usize {
    60
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: default_rate(),
            volume: default_volume(),
            max_length: default_max_length(),
            synthesizers: SynthesizerSelection::default(),
            params: HashMap::new(),
            dictionary: Vec::new(),
        }
    }
}

enum Rule {
    Literal(String, String),
    Pattern(Regex, String),
}

/// Turns messages into [`Speech`] for one settings snapshot.
pub struct SpeechConverter {
    settings: SpeechSettings,
    rules: Vec<Rule>,
}

impl SpeechConverter {
    pub fn new(settings: SpeechSettings) -> Self {
        let rules = settings
            .dictionary
            .iter()
            .filter(|entry| !entry.pattern.is_empty())
            .filter_map(|entry| {
                if !entry.regex {
                    return Some(Rule::Literal(
                        entry.pattern.clone(),
                        entry.replacement.clone(),
                    ));
                }
                match Regex::new(&entry.pattern) {
                    Ok(re) => Some(Rule::Pattern(re, entry.replacement.clone())),
                    Err(e) => {
                        warn!(pattern = %entry.pattern, error = %e, "Skipping invalid dictionary pattern");
                        None
                    }
                }
            })
            .collect();
        Self { settings, rules }
    }

    pub fn settings(&self) -> &SpeechSettings {
        &self.settings
    }

    /// Speech for `message`, or `None` when it should not be spoken.
    pub fn convert(&self, message: &WrappedMessage) -> Option<Speech> {
        if !self.settings.enabled || message.is_filtered() {
            return None;
        }

        let synthesizer_id = self.settings.synthesizers.for_message(message);
        if synthesizer_id.is_empty() || synthesizer_id == IGNORE_SYNTHESIZER {
            return None;
        }

        let text = self.paraphrase(&message.display_text());
        if text.trim().is_empty() {
            return None;
        }

        Some(Speech {
            text,
            synthesizer_id: synthesizer_id.to_string(),
            rate: self.settings.rate,
            volume: self.settings.volume,
            params: self
                .settings
                .params
                .get(synthesizer_id)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        })
    }

    /// Rewrite `text` into something pleasant to hear.
    pub fn paraphrase(&self, text: &str) -> String {
        let mut text = URL_REGEX.replace_all(text, "URL").into_owned();
        text = shorten_runs(&text, MAX_CHAR_RUN);
        for rule in &self.rules {
            text = match rule {
                Rule::Literal(pattern, replacement) => text.replace(pattern, replacement),
                Rule::Pattern(re, replacement) => {
                    re.replace_all(&text, replacement.as_str()).into_owned()
                }
            };
        }
        let max = self.settings.max_length;
        if max > 0 && text.chars().count() > max {
            text = text.chars().take(max).collect();
        }
        text
    }
}

/// Cut every run of one repeated character down to `max` characters.
fn shorten_runs(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = None;
    let mut run = 0;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
        } else {
            last = Some(c);
            run = 1;
        }
        if run <= max {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        ChatValue, FilterAnnotation, InboundMessage, NotificationValue, SystemKind,
    };

    fn chat(content: &str) -> WrappedMessage {
        WrappedMessage::new(
            0,
            InboundMessage::new(MessageBody::Normal(ChatValue {
                content: content.to_string(),
                ..Default::default()
            })),
        )
    }

    #[test]
    fn test_paraphrase_url_and_runs() {
        let converter = SpeechConverter::new(SpeechSettings::default());
        assert_eq!(
            converter.paraphrase("see https://example.com/a?b=c wwwwwwww"),
            "see URL wwww"
        );
    }

    #[test]
    fn test_dictionary_and_max_length() {
        let settings = SpeechSettings {
            max_length: 8,
            dictionary: vec![
                DictionaryEntry {
                    pattern: "lol".to_string(),
                    replacement: "laugh".to_string(),
                    regex: false,
                },
                DictionaryEntry {
                    pattern: r"\d+".to_string(),
                    replacement: "N".to_string(),
                    regex: true,
                },
                DictionaryEntry {
                    pattern: "(".to_string(),
                    replacement: "x".to_string(),
                    regex: true,
                },
            ],
            ..Default::default()
        };
        let converter = SpeechConverter::new(settings);
        assert_eq!(converter.paraphrase("lol 123"), "laugh N");
        assert_eq!(converter.paraphrase("abcdefghijk"), "abcdefgh");
    }

    #[test]
    fn test_convert_uses_category_synthesizer() {
        let mut settings = SpeechSettings::default();
        settings.synthesizers.emotion = "voice-b".to_string();
        settings
            .params
            .insert("voice-b".to_string(), serde_json::json!({"pitch": 2}));
        let converter = SpeechConverter::new(settings);

        let emotion = WrappedMessage::new(
            0,
            InboundMessage::new(MessageBody::Notification(NotificationValue {
                kind: NotificationKind::Emotion,
                message: "clap".to_string(),
            })),
        );
        let speech = converter.convert(&emotion).unwrap();
        assert_eq!(speech.synthesizer_id, "voice-b");
        assert_eq!(speech.params["pitch"], 2);

        let normal = converter.convert(&chat("hi")).unwrap();
        assert_eq!(normal.synthesizer_id, "default");
        assert_eq!(normal.params, serde_json::Value::Null);
    }

    #[test]
    fn test_no_speech_cases() {
        let mut settings = SpeechSettings::default();
        settings.synthesizers.system = IGNORE_SYNTHESIZER.to_string();
        let converter = SpeechConverter::new(settings);

        assert!(converter.convert(&chat("   ")).is_none());
        let system = WrappedMessage::new(
            0,
            InboundMessage::new(MessageBody::system(SystemKind::Info, "hello")),
        );
        assert!(converter.convert(&system).is_none());

        let filtered = chat("bad").with_annotation(FilterAnnotation {
            filtered: true,
            ..Default::default()
        });
        assert!(converter.convert(&filtered).is_none());

        let disabled = SpeechConverter::new(SpeechSettings {
            enabled: false,
            ..Default::default()
        });
        assert!(disabled.convert(&chat("hi")).is_none());
    }
}
