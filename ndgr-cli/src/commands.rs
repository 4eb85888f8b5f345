use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use colored::*;
use comment_pipeline::{
    AnnotationSignal, Capabilities, CommentPipeline, MessageBody, NgWordFilter, PipelineConfig,
    PipelineEvent, PipelineParams, RelayParams, SettingsStore, Speech, SpeechHooks, SpeechQueue,
    Synthesizer, SynthesizerRegistry, UserSet, WrappedMessage,
};
use ndgr_client::{ClientConfig, HttpFetcher};
use tracing::info;

/// Synthesizer that logs instead of producing audio.
struct LogSynthesizer;

#[async_trait]
impl Synthesizer for LogSynthesizer {
    fn id(&self) -> &str {
        "default"
    }

    async fn speak(&self, speech: &Speech, hooks: &mut SpeechHooks) -> comment_pipeline::Result<()> {
        hooks.started();
        info!(rate = speech.rate, volume = speech.volume, "Speaking: {}", speech.text);
        Ok(())
    }
}

pub struct WatchOptions {
    pub settings_path: PathBuf,
    pub uri: String,
    pub num_backward: usize,
    pub start_at: String,
    pub speak: bool,
    pub json: bool,
}

pub async fn watch(options: WatchOptions) -> anyhow::Result<()> {
    let store = SettingsStore::load(&options.settings_path)
        .await
        .context("Failed to load settings")?;

    let client_config = ClientConfig::default();
    let fetcher = Arc::new(
        HttpFetcher::new(&client_config).context("Failed to create HTTP client")?,
    );

    let annotations = AnnotationSignal::new();
    let capabilities = Capabilities {
        moderators: Arc::new(UserSet::default()),
        supporters: Arc::new(UserSet::default()),
        filter: Arc::new(NgWordFilter::new(store.subscribe())),
    };

    let speech_queue = options.speak.then(|| {
        let mut registry = SynthesizerRegistry::new();
        registry.register(Arc::new(LogSynthesizer));
        SpeechQueue::new(registry)
    });

    let pipeline = CommentPipeline::spawn(PipelineParams {
        fetcher,
        client_config,
        config: PipelineConfig {
            num_backward: options.num_backward,
            start_at: options.start_at,
            ..Default::default()
        },
        capabilities,
        annotation_changes: Some(annotations.subscribe()),
        settings: store.subscribe(),
        speech_queue,
        relay: Some(Default::default()),
    });

    let mut state = pipeline.state();
    let mut events = pipeline.subscribe();
    pipeline.connect(options.uri).await?;

    let mut next_seq = 0;
    let mut finished = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                for message in snapshot.messages.iter() {
                    if message.seq_id < next_seq {
                        continue;
                    }
                    print_message(message, options.json)?;
                    next_seq = message.seq_id + 1;
                }
                if finished {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(PipelineEvent::Disconnected { reason, .. }) => {
                        info!(?reason, "Comment stream closed");
                        finished = true;
                    }
                    Ok(event) => info!(?event, "Pipeline event"),
                    Err(_) => break,
                }
            }
        }
    }

    pipeline.dispose().await?;
    Ok(())
}

fn print_message(message: &WrappedMessage, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(message)?);
        return Ok(());
    }

    let text = message.display_text();
    match &message.body {
        MessageBody::Normal(chat) => {
            let name = chat
                .name
                .as_deref()
                .or(chat.user_id.as_deref())
                .unwrap_or("anonymous");
            let name = if message.annotation.is_moderator {
                name.green().bold()
            } else {
                name.cyan()
            };
            println!("{} {}", name, text);
        }
        MessageBody::Operator(_) => println!("{} {}", "[operator]".yellow().bold(), text),
        MessageBody::System(_) => println!("{} {}", "[system]".dimmed(), text.dimmed()),
        _ => println!("{} {}", format!("[{}]", message.type_name()).magenta(), text),
    }
    Ok(())
}

pub async fn relay_test(
    settings_path: &Path,
    comment: String,
    user_id: String,
    name: String,
    is_owner: bool,
) -> anyhow::Result<()> {
    let store = SettingsStore::load(settings_path)
        .await
        .context("Failed to load settings")?;
    let config = store.get().relay;
    if !config.is_enabled() {
        anyhow::bail!(
            "Relay is disabled; set relay.method in {}",
            settings_path.display()
        );
    }

    let params = RelayParams {
        id: "relay-test".to_string(),
        comment,
        is_owner,
        user_id,
        name,
    };
    let response = comment_pipeline::HttpRelay::default()
        .send_params(&params, &config)
        .await;
    println!("{response}");
    Ok(())
}

pub async fn show_settings(settings_path: &Path) -> anyhow::Result<String> {
    let store = SettingsStore::load(settings_path)
        .await
        .context("Failed to load settings")?;
    Ok(serde_json::to_string_pretty(&store.get())?)
}

pub async fn reset_settings(settings_path: &Path) -> anyhow::Result<()> {
    let store = SettingsStore::load(settings_path)
        .await
        .context("Failed to load settings")?;
    store.reset().await?;
    Ok(())
}
