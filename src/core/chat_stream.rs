use std::borrow::Cow;
use std::collections::VecDeque;

use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr;
use serde_json::Value;

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of a chat-completion event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    ContentDelta(String),
    Done,
    ParseError(String),
}

pub(crate) fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn decode_payload(payload: &str) -> Option<StreamEvent> {
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(|content| StreamEvent::ContentDelta(content.to_string())),
        Err(_) => Some(StreamEvent::ParseError(payload.to_string())),
    }
}

/// Incremental decoder for `data: <json>` event lines.
///
/// Fragments are buffered as bytes and only split on `\n`, so a line (or a
/// multi-byte character) torn across two network reads is reassembled
/// before it is decoded. After `Done` has been produced all further input
/// is ignored.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    done: bool,
    event_lines: usize,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and return every event completed by it.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(fragment);

        let mut consumed = 0;
        while !self.done {
            let Some(relative_pos) = memchr(b'\n', &buffer[consumed..]) else {
                break;
            };
            let newline_pos = consumed + relative_pos;
            if let Some(event) = self.decode_line(&buffer[consumed..newline_pos]) {
                events.push(event);
            }
            consumed = newline_pos + 1;
        }

        if !self.done {
            buffer.drain(..consumed);
            self.buffer = buffer;
        }
        events
    }

    pub fn push_str(&mut self, fragment: &str) -> Vec<StreamEvent> {
        self.push(fragment.as_bytes())
    }

    /// Signal end of input. Decodes any trailing partial line and emits
    /// `Done` if the sentinel was never seen.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let remainder = std::mem::take(&mut self.buffer);
        if let Some(event) = self.decode_line(&remainder) {
            events.push(event);
        }
        if !self.done {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        events
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether any `data:` line has been seen so far.
    pub fn saw_event_lines(&self) -> bool {
        self.event_lines > 0
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let (text, valid_utf8) = match std::str::from_utf8(raw) {
            Ok(text) => (Cow::Borrowed(text), true),
            Err(_) => (String::from_utf8_lossy(raw), false),
        };

        let payload = extract_data_payload(text.trim())?;
        self.event_lines += 1;
        if payload.is_empty() {
            return None;
        }
        if !valid_utf8 {
            return Some(StreamEvent::ParseError(payload.to_string()));
        }

        let event = decode_payload(payload);
        if matches!(event, Some(StreamEvent::Done)) {
            self.done = true;
        }
        event
    }
}

struct DecodeState<S> {
    fragments: S,
    decoder: ChunkDecoder,
    pending: VecDeque<StreamEvent>,
    exhausted: bool,
}

/// Lazily decode a fallible stream of body fragments.
///
/// The returned stream ends after `Done`, or right after yielding the first
/// transport error. Input past the sentinel is never polled.
pub fn decode_stream<S, B, E>(fragments: S) -> impl Stream<Item = Result<StreamEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        fragments,
        decoder: ChunkDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.exhausted || state.decoder.is_done() {
                return None;
            }

            match state.fragments.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{sse_done, sse_line};
    use std::convert::Infallible;

    fn decode_all(fragments: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = ChunkDecoder::new();
        let mut events = Vec::new();
        for fragment in fragments {
            events.extend(decoder.push(fragment));
        }
        events.extend(decoder.finish());
        events
    }

    fn sample_body() -> String {
        [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#.to_string(),
            sse_line("Hel"),
            String::new(),
            sse_line("lo, "),
            sse_line("wörld 🌍"),
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#.to_string(),
            sse_done(),
        ]
        .join("\n")
            + "\n"
    }

    fn expected_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::ContentDelta("Hel".into()),
            StreamEvent::ContentDelta("lo, ".into()),
            StreamEvent::ContentDelta("wörld 🌍".into()),
            StreamEvent::Done,
        ]
    }

    #[test]
    fn decodes_complete_body_in_one_fragment() {
        let body = sample_body();
        assert_eq!(decode_all(&[body.as_bytes()]), expected_events());
    }

    #[test]
    fn every_single_split_point_yields_the_same_events() {
        let body = sample_body();
        let bytes = body.as_bytes();
        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            assert_eq!(
                decode_all(&[head, tail]),
                expected_events(),
                "split at byte {split}"
            );
        }
    }

    #[test]
    fn every_pair_of_split_points_yields_the_same_events() {
        let body = sample_body();
        let bytes = body.as_bytes();
        for first in (0..bytes.len()).step_by(3) {
            for second in first..=bytes.len() {
                let fragments = [&bytes[..first], &bytes[first..second], &bytes[second..]];
                assert_eq!(
                    decode_all(&fragments),
                    expected_events(),
                    "splits at {first} and {second}"
                );
            }
        }
    }

    #[test]
    fn byte_at_a_time_delivery_reassembles_lines() {
        let body = sample_body();
        let fragments: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&fragments), expected_events());
    }

    #[test]
    fn malformed_line_is_reported_and_decoding_continues() {
        let body = format!(
            "{}\ndata: {{not json\n{}\n{}\n",
            sse_line("a"),
            sse_line("b"),
            sse_done()
        );
        assert_eq!(
            decode_all(&[body.as_bytes()]),
            vec![
                StreamEvent::ContentDelta("a".into()),
                StreamEvent::ParseError("{not json".into()),
                StreamEvent::ContentDelta("b".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn input_after_sentinel_is_ignored() {
        let mut decoder = ChunkDecoder::new();
        let first = format!("{}\n{}\n{}\n", sse_line("x"), sse_done(), sse_line("late"));
        assert_eq!(
            decoder.push_str(&first),
            vec![StreamEvent::ContentDelta("x".into()), StreamEvent::Done]
        );
        assert!(decoder.is_done());
        assert!(decoder.push_str(&format!("{}\n", sse_line("later"))).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn closed_stream_without_sentinel_still_completes() {
        let body = format!("{}\n{}", sse_line("partial "), sse_line("tail"));
        assert_eq!(
            decode_all(&[body.as_bytes()]),
            vec![
                StreamEvent::ContentDelta("partial ".into()),
                StreamEvent::ContentDelta("tail".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn empty_input_completes_immediately() {
        assert_eq!(decode_all(&[]), vec![StreamEvent::Done]);
    }

    #[test]
    fn non_event_lines_and_keep_alives_are_ignored() {
        let body = format!(
            ": keep-alive\nevent: message\ndata:\nid: 7\n{}\n",
            sse_line("ok")
        );
        assert_eq!(
            decode_all(&[body.as_bytes()]),
            vec![StreamEvent::ContentDelta("ok".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn accepts_crlf_framing_and_missing_space() {
        let body = "data:{\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\r\ndata:[DONE]\r\n";
        assert_eq!(
            decode_all(&[body.as_bytes()]),
            vec![StreamEvent::ContentDelta("one".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn valid_json_without_content_emits_nothing() {
        let body = "data: 42\ndata: {\"choices\":[]}\ndata: {\"choices\":[{\"delta\":{\"content\":null}}]}\n";
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push_str(body).is_empty());
        assert!(decoder.saw_event_lines());
    }

    #[test]
    fn invalid_utf8_line_is_a_parse_error() {
        let mut body = b"data: {\"choices\":[{\"delta\":{\"content\":\"".to_vec();
        body.extend_from_slice(&[0xff, 0xfe]);
        body.extend_from_slice(b"\"}}]}\n");
        body.extend_from_slice(sse_line("fine").as_bytes());
        body.push(b'\n');

        let events = decode_all(&[&body]);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StreamEvent::ParseError(_)));
        assert_eq!(events[1], StreamEvent::ContentDelta("fine".into()));
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[test]
    fn plain_json_body_has_no_event_lines() {
        let mut decoder = ChunkDecoder::new();
        decoder.push_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#);
        assert_eq!(decoder.finish(), vec![StreamEvent::Done]);
        assert!(!decoder.saw_event_lines());
    }

    #[tokio::test]
    async fn decode_stream_stops_polling_after_sentinel() {
        let body = format!("{}\n{}\n", sse_line("Hel"), sse_line("lo"));
        let fragments: Vec<Result<Vec<u8>, Infallible>> = vec![
            Ok(body.as_bytes()[..7].to_vec()),
            Ok(body.as_bytes()[7..].to_vec()),
            Ok(format!("{}\n", sse_done()).into_bytes()),
            Ok(format!("{}\n", sse_line("never")).into_bytes()),
        ];

        let events: Vec<StreamEvent> = decode_stream(stream::iter(fragments))
            .map(|event| event.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("Hel".into()),
                StreamEvent::ContentDelta("lo".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn decode_stream_surfaces_transport_errors_without_done() {
        let fragments: Vec<Result<Vec<u8>, String>> = vec![
            Ok(format!("{}\n", sse_line("a")).into_bytes()),
            Err("connection reset".to_string()),
            Ok(format!("{}\n", sse_line("b")).into_bytes()),
        ];

        let events: Vec<Result<StreamEvent, String>> =
            decode_stream(stream::iter(fragments)).collect().await;

        assert_eq!(
            events,
            vec![
                Ok(StreamEvent::ContentDelta("a".into())),
                Err("connection reset".to_string()),
            ]
        );
    }
}
