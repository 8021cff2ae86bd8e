//! Fragment reassembly.

/// Accumulates arbitrarily-split text fragments and hands back complete
/// newline-terminated lines.
///
/// After any sequence of [`push`](Self::push)/[`next_line`](Self::next_line)
/// calls the buffer holds exactly the text not yet terminated by a newline.
/// Text that never receives its newline is never surfaced as a line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Append a fragment. Fragments may split a line anywhere.
    pub fn push(&mut self, fragment: &str) {
        self.buf.push_str(fragment);
    }

    /// Split off the earliest complete line, without its terminator.
    /// Handles both `\n` and `\r\n` endings.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.find('\n')?;
        let mut line: String = self.buf.drain(..=pos).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Text received but not yet resolved into a complete line.
    pub fn pending(&self) -> &str {
        &self.buf
    }
}
