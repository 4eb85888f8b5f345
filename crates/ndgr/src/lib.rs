//! NDGR: client for the segmented live-comment delivery protocol.
//!
//! A view resource is polled with `?at=<cursor>` and answers with a stream of
//! length-delimited directives. Each directive points at more data:
//!
//! - `backward` - packed pages of history, fetched newest first
//! - `previous` - backfill, only honored before the first live segment
//! - `segment` - the live tail
//! - `next` - cursor for the following poll
//!
//! ## Core Types
//!
//! - [`NdgrClient`] - Connects and yields a [`MessageStream`] of [`proto::ChunkedMessage`]
//! - [`At`] - Poll cursor
//! - [`SegmentFetcher`] - Byte source trait, [`HttpFetcher`] for HTTP
//! - [`FrameDecoder`] / [`FrameReader`] - Length-delimited decoding across chunks
//! - [`ClientConfig`] - Retry and transport settings

mod backward;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod framing;
pub mod proto;
pub mod retry;

pub use client::{At, MessageStream, NdgrClient};
pub use config::ClientConfig;
pub use error::{FetchError, FetchFailure, FetchPhase, NdgrError, Result};
pub use fetcher::{ByteStream, HttpFetcher, SegmentFetcher, install_rustls_provider};
pub use framing::{Decoded, FrameDecoder, FrameReader, MAX_FRAME_LEN, decode_frame};
pub use retry::{RetryAction, RetryPolicy};
