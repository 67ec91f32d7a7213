//! SSE parser for the streaming chat workflow.
//!
//! Events are separated by a blank line and carry `event:` and `data:` lines.
//! Each `data:` payload holds the *cumulative* reply text in `content`, so the
//! buffered reply is replaced, never appended to. A `status` of `error` ends
//! the stream with an error.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use super::errors::ClassifierError;
use super::types::{ChatEventData, ChatStatus, ChatUpdate};

// ─── SSE parser ──────────────────────────────────────────────────────────────

/// Parse a byte stream of SSE events into `ChatUpdate`s.
///
/// Generic over the byte source so it can read a `reqwest` body or an
/// in-memory stream.
pub fn parse_chat_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<ChatUpdate, ClassifierError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    stream::unfold(
        (byte_stream, ChatStreamState::default(), Vec::<u8>::new()),
        |(mut byte_stream, mut state, mut buffer)| async move {
            if state.finished {
                return None;
            }
            loop {
                // Check if we have a complete SSE event in the buffer
                if let Some((event_end, sep_len)) = find_event_boundary(&buffer) {
                    let raw: Vec<u8> = buffer.drain(..event_end + sep_len).take(event_end).collect();
                    let event = match decode_event(raw) {
                        Ok(event) => event,
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), (byte_stream, state, buffer)));
                        }
                    };

                    match state.process_event(&event) {
                        Ok(Some(update)) => return Some((Ok(update), (byte_stream, state, buffer))),
                        Ok(None) if state.finished => return None,
                        Ok(None) => continue,
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), (byte_stream, state, buffer)));
                        }
                    }
                }

                // Need more data from the stream
                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(bytes.as_ref());
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((
                            Err(ClassifierError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, state, buffer),
                        ));
                    }
                    None => {
                        // Stream ended; a final event may lack its trailing blank line
                        state.finished = true;
                        let rest = match decode_event(std::mem::take(&mut buffer)) {
                            Ok(rest) => rest,
                            Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                        };
                        if rest.trim().is_empty() {
                            return None;
                        }
                        return match state.process_event(rest.trim()) {
                            Ok(Some(update)) => Some((Ok(update), (byte_stream, state, buffer))),
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (byte_stream, state, buffer))),
                        };
                    }
                }
            }
        },
    )
}

/// Drive a chat stream to the end and return the final reply text.
pub async fn collect_chat_reply<S>(stream: S) -> Result<String, ClassifierError>
where
    S: Stream<Item = Result<ChatUpdate, ClassifierError>>,
{
    futures::pin_mut!(stream);
    let mut reply = String::new();
    while let Some(update) = stream.next().await {
        reply = update?.content;
    }
    Ok(reply)
}

/// Locate the end of the first complete event, accepting `\n\n` or `\r\n\r\n`.
///
/// Works on raw bytes so a multi-byte character split across network chunks
/// is only decoded once both halves have arrived.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_event(raw: Vec<u8>) -> Result<String, ClassifierError> {
    String::from_utf8(raw).map_err(|e| ClassifierError::StreamError {
        reason: format!("event is not valid UTF-8: {e}"),
    })
}

// ─── Stream State ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChatStreamState {
    /// Latest cumulative reply text.
    content: String,
    finished: bool,
}

impl ChatStreamState {
    /// Process a single SSE event (may contain several `data:` lines).
    fn process_event(&mut self, event: &str) -> Result<Option<ChatUpdate>, ClassifierError> {
        let mut event_name: Option<&str> = None;
        let mut data = String::new();

        for line in event.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(name) = line.strip_prefix("event:") {
                event_name = Some(name.trim());
            } else if let Some(payload) = line.strip_prefix("data:") {
                data.push_str(payload.trim());
            }
            // Comments (`:`), `id:` and `retry:` lines are ignored
        }

        if matches!(event_name, Some("done")) || data == "[DONE]" {
            self.finished = true;
            return Ok(None);
        }
        if data.is_empty() {
            return Ok(None);
        }

        let payload: ChatEventData =
            serde_json::from_str(&data).map_err(|e| ClassifierError::StreamError {
                reason: format!("failed to parse SSE data: {e} (data: {data})"),
            })?;

        let status = payload.status.unwrap_or(ChatStatus::InProgress);
        if status == ChatStatus::Error || matches!(event_name, Some("error")) {
            return Err(ClassifierError::StreamError {
                reason: payload
                    .error
                    .or(payload.content)
                    .unwrap_or_else(|| "workflow reported an error".into()),
            });
        }

        if let Some(content) = payload.content {
            self.content = content;
        }

        Ok(Some(ChatUpdate {
            content: self.content.clone(),
            status,
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
