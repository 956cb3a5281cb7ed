use std::collections::VecDeque;
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use serde::Serialize;

/// CSI sequences and the two-byte escapes (`ESC c`, `ESC 7`, ...)
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("Invalid ANSI escape pattern")
});

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogLine {
    /// Strictly increasing within one stream's buffer
    pub seq: u64,
    pub at: SystemTime,
    pub text: String,
}

/// Fixed-capacity line buffer for one log stream. Oldest lines are evicted
/// once `cap` is reached.
#[derive(Debug)]
pub struct LogBuffer {
    cap: usize,
    next_seq: u64,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            next_seq: 1,
            lines: VecDeque::with_capacity(cap.min(4096)),
        }
    }

    pub fn push(&mut self, text: String) -> LogLine {
        let line = LogLine {
            seq: self.next_seq,
            at: SystemTime::now(),
            text,
        };
        self.next_seq += 1;

        self.lines.push_back(line.clone());
        while self.lines.len() > self.cap {
            self.lines.pop_front();
        }
        line
    }

    /// Lines with `seq` greater than `after`
    pub fn since(&self, after: u64) -> Vec<LogLine> {
        self.lines
            .iter()
            .filter(|l| l.seq > after)
            .cloned()
            .collect()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Splits a raw byte stream into display lines.
///
/// Chunk boundaries can fall anywhere, including inside a UTF-8 sequence;
/// an unterminated tail is held until the next chunk or [`finish`].
/// Invalid UTF-8 is replaced, `\r` and ANSI escapes are removed and empty
/// lines are skipped.
///
/// [`finish`]: LineDecoder::finish
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            if let Some(line) = clean(&self.pending[start..end]) {
                out.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        out
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        clean(&rest)
    }
}

fn clean(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = strip_ansi(&text).replace('\r', "");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push(format!("line {i}"));
        }

        let lines = buf.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "line 2");
        assert_eq!(lines[2].text, "line 4");
        assert_eq!(lines[0].seq, 3);
        assert!(lines.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_buffer_since() {
        let mut buf = LogBuffer::new(10);
        buf.push("a".into());
        let b = buf.push("b".into());
        buf.push("c".into());

        let after: Vec<_> = buf.since(b.seq).into_iter().map(|l| l.text).collect();
        assert_eq!(after, vec!["c"]);
    }

    #[test]
    fn test_decoder_joins_partial_lines() {
        let mut dec = LineDecoder::new();
        assert!(dec.feed(b"hel").is_empty());
        assert_eq!(dec.feed(b"lo\nwor"), vec!["hello"]);
        assert_eq!(dec.feed(b"ld\n"), vec!["world"]);
        assert_eq!(dec.finish(), None);
    }

    #[test]
    fn test_decoder_split_utf8_sequence() {
        let bytes = "héllo\n".as_bytes();
        let mut dec = LineDecoder::new();
        assert!(dec.feed(&bytes[..2]).is_empty());
        assert_eq!(dec.feed(&bytes[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_decoder_cleans_lines() {
        let mut dec = LineDecoder::new();
        let lines = dec.feed(b"\x1b[32mok\x1b[0m\r\n\n   \nbad \xff byte\n");
        assert_eq!(lines, vec!["ok".to_string(), "bad \u{fffd} byte".to_string()]);
    }

    #[test]
    fn test_decoder_flushes_tail() {
        let mut dec = LineDecoder::new();
        dec.feed(b"no newline");
        assert_eq!(dec.finish().as_deref(), Some("no newline"));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;31mERROR\x1b[0m boom"), "ERROR boom");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
