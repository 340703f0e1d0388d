//! SSE decoding for streaming chat responses.
//!
//! The wire format is line-oriented: fields arrive as `name: value`
//! lines and a blank line terminates each event. [`SseDecoder`] keeps
//! the tail of the last incomplete line between network chunks and
//! yields one payload per terminated event; multiple `data:` lines in
//! one event are joined with newlines, and every other field (`event:`,
//! `id:`, `retry:`, comments) carries nothing this client uses.
//! [`sse_response_stream`] wires the decoder to a `reqwest::Response`
//! and a provider-specific payload parser.

use envoy_domain::error::{Error, Result};
use envoy_domain::stream::{BoxStream, StreamEvent};

#[derive(Default)]
pub(crate) struct SseDecoder {
    /// Bytes after the last newline seen so far.
    tail: String,
    /// `data:` values of the event currently being assembled.
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Consume a network chunk, returning the payload of every event
    /// that became complete.
    pub(crate) fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.tail.push_str(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.tail.find('\n') {
            let line: String = self.tail.drain(..=newline).collect();
            self.take_line(line.trim_end_matches(['\r', '\n']), &mut payloads);
        }
        payloads
    }

    /// Flush an event whose terminating blank line never arrived (the
    /// server hung up mid-event).
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.tail.is_empty() {
            let line = std::mem::take(&mut self.tail);
            self.take_line(line.trim_end_matches('\r'), &mut payloads);
        }
        self.close_event(&mut payloads);
        payloads
    }

    fn take_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            self.close_event(payloads);
        } else if let Some(value) = line.strip_prefix("data:") {
            // One optional space after the colon belongs to the syntax.
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data_lines.push(value.to_string());
        }
    }

    fn close_event(&mut self, payloads: &mut Vec<String>) {
        if self.data_lines.is_empty() {
            return;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        if !payload.is_empty() {
            payloads.push(payload);
        }
    }
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a parser
/// that maps each event payload to zero or more stream events.
///
/// The parser is `FnMut` because tool-call assembly needs state across
/// payloads. The agent loop keys off `Done`, so one is synthesized if
/// the connection closes without the parser ever producing a terminal
/// event.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut decoder = SseDecoder::default();
        let mut terminal_seen = false;

        loop {
            let bytes = match response.chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    yield Err(Error::Http(e.to_string()));
                    break;
                }
            };
            for payload in decoder.feed(&String::from_utf8_lossy(&bytes)) {
                for event in parse_data(&payload) {
                    terminal_seen |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        for payload in decoder.finish() {
            for event in parse_data(&payload) {
                terminal_seen |= matches!(&event, Ok(StreamEvent::Done { .. }));
                yield event;
            }
        }

        if !terminal_seen {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_emitted_on_blank_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed("data: {\"x\":1}\n").is_empty());
        assert_eq!(decoder.feed("\n"), vec!["{\"x\":1}"]);
    }

    #[test]
    fn multiple_data_lines_join_with_newlines() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.feed("data: first\ndata: second\n\n");
        assert_eq!(payloads, vec!["first\nsecond"]);
    }

    #[test]
    fn line_split_across_chunks_reassembles() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed("data: hel").is_empty());
        assert!(decoder.feed("lo\n").is_empty());
        assert_eq!(decoder.feed("\ndata: [DONE]\n\n"), vec!["hello", "[DONE]"]);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.feed("data: a\r\n\r\n");
        assert_eq!(payloads, vec!["a"]);
    }

    #[test]
    fn non_data_fields_and_comments_are_ignored() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.feed(": keep-alive\nevent: ping\nid: 7\nretry: 500\ndata: x\n\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn data_only_events_without_value_are_dropped() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed("data: \n\n").is_empty());
        assert!(decoder.feed("event: ping\n\n").is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed("data: trailing").is_empty());
        assert_eq!(decoder.finish(), vec!["trailing"]);
        // A second finish has nothing left.
        assert!(decoder.finish().is_empty());
    }
}
