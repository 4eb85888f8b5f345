//! Length-delimited frame decoding across chunk boundaries.
//!
//! Each frame is a base-128 varint length followed by that many bytes of an
//! encoded protobuf message. Network chunks split frames at arbitrary points,
//! so the decoder keeps the undecoded tail between chunks.

use std::collections::VecDeque;
use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use prost::Message;
use tracing::debug;

use crate::error::{FetchError, FetchPhase, NdgrError, Result};
use crate::fetcher::ByteStream;

/// Longest valid varint encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

/// Largest frame body accepted. Longer declared lengths are corrupt input.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Outcome of decoding one frame from the front of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// A message and the number of bytes it occupied, prefix included.
    Complete(T, usize),
    /// The buffer ends inside the length prefix or the body.
    Incomplete,
}

/// Parse a varint length prefix. `None` means more bytes are needed.
fn read_length_prefix(buf: &[u8], label: &str) -> Result<Option<(u64, usize)>> {
    let mut value: u64 = 0;
    for (i, byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(NdgrError::decode(label, "length prefix overflows u64"));
    }
    Ok(None)
}

/// Decode the first frame of `buf`.
///
/// Running out of bytes is [`Decoded::Incomplete`]. A declared length over
/// [`MAX_FRAME_LEN`] or a complete frame whose body does not decode is an
/// error.
pub fn decode_frame<T: Message + Default>(buf: &[u8], label: &str) -> Result<Decoded<T>> {
    let Some((len, prefix_len)) = read_length_prefix(buf, label)? else {
        return Ok(Decoded::Incomplete);
    };
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            NdgrError::decode(
                label,
                format!("frame length {len} exceeds limit of {MAX_FRAME_LEN}"),
            )
        })?;

    let end = prefix_len
        .checked_add(len)
        .ok_or_else(|| NdgrError::decode(label, "frame length overflows"))?;
    if buf.len() < end {
        return Ok(Decoded::Incomplete);
    }

    let message = T::decode(&buf[prefix_len..end]).map_err(|e| NdgrError::decode(label, e))?;
    Ok(Decoded::Complete(message, end))
}

/// Stateful decoder fed one chunk at a time.
pub struct FrameDecoder<T> {
    unread: BytesMut,
    label: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message + Default> FrameDecoder<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            unread: BytesMut::new(),
            label: label.into(),
            _marker: PhantomData,
        }
    }

    /// Append `chunk` and decode every complete frame now available.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<T>> {
        self.unread.extend_from_slice(chunk);

        let mut out = Vec::new();
        while !self.unread.is_empty() {
            match decode_frame::<T>(&self.unread, &self.label)? {
                Decoded::Complete(message, consumed) => {
                    self.unread.advance(consumed);
                    out.push(message);
                }
                Decoded::Incomplete => break,
            }
        }
        Ok(out)
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.unread.len()
    }

    /// End of input. A trailing partial frame is dropped.
    pub fn finish(self) {
        if !self.unread.is_empty() {
            debug!(
                label = %self.label,
                leftover = self.unread.len(),
                "Discarding partial frame at end of stream"
            );
        }
    }
}

/// Pull-based reader of decoded frames over a fetched body.
pub struct FrameReader<T> {
    stream: Option<ByteStream>,
    decoder: Option<FrameDecoder<T>>,
    ready: VecDeque<T>,
    uri: String,
    label: String,
    phase: FetchPhase,
}

impl<T: Message + Default> FrameReader<T> {
    pub fn new(
        stream: ByteStream,
        uri: impl Into<String>,
        label: impl Into<String>,
        phase: FetchPhase,
    ) -> Self {
        let label = label.into();
        Self {
            stream: Some(stream),
            decoder: Some(FrameDecoder::new(label.clone())),
            ready: VecDeque::new(),
            uri: uri.into(),
            label,
            phase,
        }
    }

    /// Next decoded message, `None` once the body is exhausted.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Some(Ok(message));
            }

            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => {
                    let Some(decoder) = self.decoder.as_mut() else {
                        return None;
                    };
                    match decoder.push(&chunk) {
                        Ok(messages) => self.ready.extend(messages),
                        Err(e) => {
                            self.close();
                            return Some(Err(e));
                        }
                    }
                }
                Some(Err(failure)) => {
                    self.close();
                    return Some(Err(FetchError::new(
                        failure,
                        self.uri.clone(),
                        self.label.clone(),
                        self.phase,
                    )
                    .into()));
                }
                None => {
                    self.close();
                }
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
        if let Some(decoder) = self.decoder.take() {
            decoder.finish();
        }
    }
}
