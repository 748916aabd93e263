//! Incremental newline framing for JSON-RPC lines.

/// Splits an arbitrary chunked byte stream into complete, trimmed lines.
///
/// The retained remainder never contains a `\n`. Lines stay raw bytes; decoding
/// (and rejecting malformed UTF-8) is left to the dispatcher. No line length
/// limit is enforced.
#[derive(Debug, Default)]
pub struct LineFramer {
    remainder: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, skipping blank ones.
    /// Surrounding ASCII whitespace, including a `\r` before the newline, is
    /// trimmed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.remainder.extend_from_slice(chunk);

        let Some(last_newline) = self.remainder.iter().rposition(|byte| *byte == b'\n') else {
            return Vec::new();
        };

        let tail = self.remainder.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.remainder, tail);

        complete
            .split(|byte| *byte == b'\n')
            .map(<[u8]>::trim_ascii)
            .filter(|line| !line.is_empty())
            .map(<[u8]>::to_vec)
            .collect()
    }

    pub fn remainder(&self) -> &[u8] {
        &self.remainder
    }
}
