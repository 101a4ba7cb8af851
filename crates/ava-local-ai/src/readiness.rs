//! Classification of llamafile diagnostic output.
//!
//! llamafile has no structured readiness signal. The only indication that
//! its HTTP server is accepting requests is human-readable stderr output such
//! as `llama server listening at http://127.0.0.1:8980`, which need not end
//! in a newline.

use crate::READINESS_MARKER;

/// What a piece of diagnostic output means to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// The server is accepting requests.
    Ready,
    /// Anything else; logged only.
    Other,
}

/// Matches diagnostic text against the readiness marker.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    marker: String,
}

impl ReadinessProbe {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Classify a piece of stderr output.
    pub fn classify(&self, text: &str) -> DiagnosticEvent {
        if !self.marker.is_empty() && text.contains(&self.marker) {
            DiagnosticEvent::Ready
        } else {
            DiagnosticEvent::Other
        }
    }
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(READINESS_MARKER)
    }
}

/// Feeds raw stderr reads through a [`ReadinessProbe`].
///
/// The last `marker.len() - 1` bytes of each read are carried into the next
/// one, so a marker split across two reads still matches while a marker seen
/// once is never matched again from the carried bytes alone.
#[derive(Debug, Clone)]
pub struct ReadinessScanner {
    probe: ReadinessProbe,
    tail: Vec<u8>,
}

impl ReadinessScanner {
    pub fn new(probe: ReadinessProbe) -> Self {
        Self {
            probe,
            tail: Vec::new(),
        }
    }

    /// Classify one read of raw stderr bytes.
    pub fn feed(&mut self, chunk: &[u8]) -> DiagnosticEvent {
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);

        let event = self.probe.classify(&String::from_utf8_lossy(&window));

        let keep = self.probe.marker().len().saturating_sub(1);
        let start = window.len().saturating_sub(keep);
        self.tail = window.split_off(start);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_line_is_ready() {
        let probe = ReadinessProbe::default();
        assert_eq!(
            probe.classify("llama server listening at http://127.0.0.1:8980"),
            DiagnosticEvent::Ready
        );
    }

    #[test]
    fn test_marker_anywhere_in_line() {
        let probe = ReadinessProbe::default();
        assert_eq!(
            probe.classify("{\"msg\":\"llama server listening at http://0.0.0.0:8981\"}"),
            DiagnosticEvent::Ready
        );
    }

    #[test]
    fn test_other_lines() {
        let probe = ReadinessProbe::default();
        for line in [
            "llm_load_tensors: offloading 32 repeating layers to GPU",
            "llama server listening",
            "",
            "LLAMA SERVER LISTENING AT http://127.0.0.1:8980",
        ] {
            assert_eq!(probe.classify(line), DiagnosticEvent::Other, "{line}");
        }
    }

    #[test]
    fn test_empty_marker_never_matches() {
        let probe = ReadinessProbe::new("");
        assert_eq!(probe.classify("anything"), DiagnosticEvent::Other);
    }

    #[test]
    fn test_scanner_without_newline() {
        let mut scanner = ReadinessScanner::new(ReadinessProbe::default());
        assert_eq!(scanner.feed(b"loading model\n"), DiagnosticEvent::Other);
        assert_eq!(
            scanner.feed(b"llama server listening at http://127.0.0.1:8980"),
            DiagnosticEvent::Ready
        );
    }

    #[test]
    fn test_scanner_marker_split_across_reads() {
        let mut scanner = ReadinessScanner::new(ReadinessProbe::default());
        assert_eq!(scanner.feed(b"...\nllama server lis"), DiagnosticEvent::Other);
        assert_eq!(scanner.feed(b"tening"), DiagnosticEvent::Other);
        assert_eq!(scanner.feed(b" at http://127.0.0.1:8980"), DiagnosticEvent::Ready);
    }

    #[test]
    fn test_scanner_split_one_byte_at_a_time() {
        let mut scanner = ReadinessScanner::new(ReadinessProbe::default());
        let text = b"llama server listening at http://127.0.0.1:8980";
        let events: Vec<_> = text.iter().map(|b| scanner.feed(&[*b])).collect();
        let first_ready = events.iter().position(|e| *e == DiagnosticEvent::Ready);
        assert_eq!(first_ready, Some(READINESS_MARKER.len() - 1));
    }

    #[test]
    fn test_scanner_does_not_repeat_from_tail() {
        let mut scanner = ReadinessScanner::new(ReadinessProbe::default());
        assert_eq!(
            scanner.feed(b"llama server listening at"),
            DiagnosticEvent::Ready
        );
        assert_eq!(scanner.feed(b" http://127.0.0.1:8980\n"), DiagnosticEvent::Other);
        assert_eq!(scanner.feed(b""), DiagnosticEvent::Other);
    }

    #[test]
    fn test_scanner_tail_is_bounded() {
        let mut scanner = ReadinessScanner::new(ReadinessProbe::default());
        for _ in 0..100 {
            scanner.feed(&[b'x'; 4096]);
        }
        assert_eq!(scanner.tail.len(), READINESS_MARKER.len() - 1);
    }
}
