//! Streaming answer decoder.
//!
//! Turns the raw, arbitrarily-chunked transport stream of an answer into an
//! ordered sequence of [`StreamFrame`]s. Records are `data: {...}` payloads
//! separated by blank lines; a record split across chunk boundaries is
//! buffered until its delimiter arrives. Decoding is best-effort per record:
//! a payload that fails to parse is skipped, not fatal to the stream.

use std::pin::Pin;

use futures::Stream;
use futures_util::StreamExt;
use log::warn;

use doc_core::{RawFrame, StreamFrame};

use crate::services::RawChunkStream;

const RECORD_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data: ";

pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

/// Incremental frame decoder over text chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    after_status: bool,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal frame has been observed. Once set, all further
    /// input is discarded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one transport chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamFrame> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.find(RECORD_DELIMITER) {
            let record: String = self.buffer[..idx].to_string();
            self.buffer.drain(..idx + RECORD_DELIMITER.len());

            if let Some(frame) = self.decode_record(&record) {
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    self.finished = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flush a trailing record that was never delimiter-terminated. Called
    /// when the transport closes.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.finished {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return Vec::new();
        }
        match self.decode_record(&rest) {
            Some(frame) => {
                if frame.is_terminal() {
                    self.finished = true;
                }
                vec![frame]
            }
            None => Vec::new(),
        }
    }

    fn decode_record(&mut self, record: &str) -> Option<StreamFrame> {
        let trimmed = record.trim();
        let payload = trimmed.strip_prefix(DATA_PREFIX).unwrap_or(trimmed).trim();
        if payload.is_empty() {
            return None;
        }

        let raw = match serde_json::from_str::<RawFrame>(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed stream record: {e}");
                return None;
            }
        };

        let mut frame = raw.classify()?;
        match &mut frame {
            // An interim placeholder was shown; the next real delta must
            // overwrite it instead of appending.
            StreamFrame::Status(_) => self.after_status = true,
            StreamFrame::ContentDelta { replace, .. } if self.after_status => {
                *replace = true;
                self.after_status = false;
            }
            _ => {}
        }
        Some(frame)
    }
}

/// Lift a [`FrameDecoder`] over the raw transport stream.
///
/// The produced sequence ends on the first terminal frame. Transport close
/// without one yields a synthesized [`StreamFrame::Done`], so the last
/// folded content is treated as final. A transport read failure yields
/// [`StreamFrame::Error`].
pub fn decode_stream(mut raw: RawChunkStream) -> FrameStream {
    Box::pin(async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = raw.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    for frame in decoder.push(&text) {
                        let terminal = frame.is_terminal();
                        yield frame;
                        if terminal {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield StreamFrame::Error(e.to_string());
                    return;
                }
            }
        }
        for frame in decoder.finish() {
            let terminal = frame.is_terminal();
            yield frame;
            if terminal {
                return;
            }
        }
        yield StreamFrame::Done;
    })
}
