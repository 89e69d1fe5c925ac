//! Incremental framing of JSON-RPC messages.
//!
//! JSON-RPC 1.0 frames messages with JSON's own structural termination: one
//! complete top-level JSON value is one message, with no length prefix or
//! delimiter. The framer accepts bytes as they trickle in from the
//! transport, consumes exactly up to the end of one value, and finalizes to
//! either the parsed value or the syntax error that poisoned the stream.

use serde_json::Value;

/// Incremental parser for a single top-level JSON value.
///
/// A fresh framer is created per message and discarded by
/// [`finish`](JsonFramer::finish). Byte spans offered to
/// [`feed`](JsonFramer::feed) are consumed up to and including the end of
/// the first complete value and never beyond it, so trailing bytes stay
/// with the caller for the next message.
#[derive(Debug, Default)]
pub struct JsonFramer {
    buf: Vec<u8>,
    outcome: Option<Result<Value, serde_json::Error>>,
}

impl JsonFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers `bytes` to the framer, returning how many were consumed.
    ///
    /// An invalid byte terminates the framer immediately rather than at
    /// some later delimiter; a truncated value leaves the framer hungry for
    /// more. Once the framer is done, further bytes are refused.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        if self.outcome.is_some() {
            return 0;
        }
        let previous = self.buf.len();
        self.buf.extend_from_slice(bytes);

        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
        let next = stream.next();
        let end = stream.byte_offset();
        match next {
            Some(Ok(value)) => {
                self.outcome = Some(Ok(value));
                self.buf.clear();
                // Bytes past the end of the value belong to the next
                // message and stay unconsumed.
                end.saturating_sub(previous)
            }
            Some(Err(e)) if e.is_eof() => bytes.len(),
            Some(Err(e)) => {
                self.outcome = Some(Err(e));
                self.buf.clear();
                bytes.len()
            }
            // Nothing but whitespace so far.
            None => bytes.len(),
        }
    }

    /// True once a complete value, or a syntax error, has been seen.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Finalizes the framer into the parsed value or the syntax error.
    pub fn finish(self) -> Result<Value, serde_json::Error> {
        match self.outcome {
            Some(outcome) => outcome,
            // Finishing early reports the natural truncated-input error.
            None => serde_json::from_slice(&self.buf),
        }
    }
}
