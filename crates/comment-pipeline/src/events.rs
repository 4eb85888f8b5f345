//! Pipeline events and commands.

/// Why a comment subscription closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server stopped supplying a cursor.
    Completed,
    /// The program ended.
    ProgramEnded,
    /// Fetch or decode failure.
    Failed(String),
}

/// Events broadcast by the pipeline.
///
/// Subscribe with [`CommentPipeline::subscribe`](crate::CommentPipeline::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Connected { uri: String },
    Disconnected { uri: String, reason: DisconnectReason },
    /// The program ended; the host should refresh program information.
    ProgramEnded { uri: String },
}

/// Commands sent to the pipeline task.
#[derive(Debug)]
pub(crate) enum PipelineCommand {
    Connect { uri: String },
    Refresh,
    Dispose,
}

/// Playback progress reported by speech hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpeakingEvent {
    Started(u64),
    Ended(u64),
}
