//! Decoding of Ollama's newline-delimited JSON streams.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use relay_core::{CompletionStream, ProviderError};

use crate::types::GenerateResponse;

/// Splits a byte stream into complete lines, carrying partial lines over
#[derive(Debug, Default)]
pub(crate) struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Append bytes and return every line they complete
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream ends
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Turn one NDJSON line into a text chunk, skipping blanks and empty fragments
pub(crate) fn parse_line(line: &str) -> Option<Result<String, ProviderError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let chunk: GenerateResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(ProviderError::InvalidResponse(e.to_string()))),
    };

    if let Some(error) = chunk.error {
        return Some(Err(ProviderError::backend(error)));
    }
    if chunk.response.is_empty() {
        return None;
    }
    Some(Ok(chunk.response))
}

struct DecodeState<S> {
    bytes: S,
    decoder: LineDecoder,
    ready: VecDeque<Result<String, ProviderError>>,
    finished: bool,
}

/// Decode a streamed `/api/generate` body into text chunks.
///
/// A transport error ends the stream after being yielded.
pub fn decode_stream<S, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: LineDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(&chunk) {
                        state.ready.extend(parse_line(&line));
                    }
                }
                Some(Err(e)) => {
                    state.ready.push_back(Err(ProviderError::connection(e.to_string())));
                    state.finished = true;
                }
                None => {
                    if let Some(line) = state.decoder.finish() {
                        state.ready.extend(parse_line(&line));
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_carries_partial_lines() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"{\"resp").is_empty());
        assert_eq!(decoder.push(b"onse\":\"a\"}\n{\"x\":1}\n{"), vec![
            "{\"response\":\"a\"}".to_string(),
            "{\"x\":1}".to_string(),
        ]);
        assert_eq!(decoder.finish(), Some("{".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_parse_line_variants() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line(r#"{"response":"","done":true}"#).is_none());
        assert_eq!(parse_line(r#"{"response":"Hi","done":false}"#), Some(Ok("Hi".to_string())));
        assert_eq!(
            parse_line(r#"{"error":"model not found"}"#),
            Some(Err(ProviderError::backend("model not found")))
        );
        assert!(matches!(parse_line("not json"), Some(Err(ProviderError::InvalidResponse(_)))));
    }

    #[tokio::test]
    async fn test_decode_stream_across_chunk_boundaries() {
        let parts: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"Hel\",\"done\":false}\n{\"respo")),
            Ok(Bytes::from_static(b"nse\":\"lo\",\"done\":false}\n")),
            Ok(Bytes::from_static(b"{\"response\":\"\",\"done\":true}")),
        ];

        let chunks: Vec<_> = decode_stream(stream::iter(parts)).collect().await;
        assert_eq!(chunks, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_transport_error() {
        let parts: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\"}\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"{\"response\":\"b\"}\n")),
        ];

        let chunks: Vec<_> = decode_stream(stream::iter(parts)).collect().await;
        assert_eq!(
            chunks,
            vec![
                Ok("a".to_string()),
                Err(ProviderError::connection("connection reset")),
            ]
        );
    }
}
