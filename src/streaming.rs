use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::llm::FragmentStream;

/// Receives every fragment as soon as it is appended to the reply buffer.
pub trait FragmentSink {
    /// `fragment` is the newly received text, `buffer` the reply so far
    /// (already including `fragment`).
    fn on_fragment(&mut self, fragment: &str, buffer: &str);
}

impl<F> FragmentSink for F
where
    F: FnMut(&str, &str),
{
    fn on_fragment(&mut self, fragment: &str, buffer: &str) {
        self(fragment, buffer)
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl FragmentSink for Discard {
    fn on_fragment(&mut self, _fragment: &str, _buffer: &str) {}
}

/// Result of draining one fragment stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Concatenation of every fragment received before the stream ended.
    pub text: String,
    /// First error raised by the stream, if any.
    pub error: Option<ChatError>,
    pub fragments: usize,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Fold a fragment stream into a buffer, forwarding each increment to `sink`.
///
/// Stops at the first error; text received up to that point is kept.
pub async fn accumulate<S>(mut stream: FragmentStream, sink: &mut S) -> StreamOutcome
where
    S: FragmentSink + ?Sized,
{
    let mut text = String::new();
    let mut fragments = 0;

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                text.push_str(&fragment);
                fragments += 1;
                sink.on_fragment(&fragment, &text);
            }
            Err(err) => {
                warn!(fragments, error = %err, "fragment stream failed");
                return StreamOutcome {
                    text,
                    error: Some(err),
                    fragments,
                };
            }
        }
    }

    debug!(fragments, chars = text.chars().count(), "fragment stream complete");
    StreamOutcome {
        text,
        error: None,
        fragments,
    }
}

/// Splits a growing reply into finished lines and the line still being typed,
/// so the renderer can put the cursor after the partial line.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Accumulated text buffer
    text_buffer: String,
    /// Lines terminated by a newline
    completed_lines: Vec<String>,
    /// Current line being built
    current_line: String,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a text delta from the completion stream
    pub fn push_delta(&mut self, delta: &str) {
        self.text_buffer.push_str(delta);
        self.current_line.push_str(delta);

        while let Some(newline_pos) = self.current_line.find('\n') {
            let line_content = self.current_line[..newline_pos].to_string();
            self.current_line = self.current_line[newline_pos + 1..].to_string();
            self.completed_lines.push(line_content);
        }
    }

    pub fn completed_lines(&self) -> &[String] {
        &self.completed_lines
    }

    /// Get the current partial line (for cursor display)
    pub fn current_line(&self) -> &str {
        &self.current_line
    }

    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn has_content(&self) -> bool {
        !self.text_buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.text_buffer.clear();
        self.completed_lines.clear();
        self.current_line.clear();
    }
}
