use crate::types::LogLine;

/// Partitions a container log byte stream into timestamped lines.
///
/// The log endpoint is asked for `timestamps=true`, so every line is
/// `<timestamp> <payload>\n`. Lines are cut at `\n`; the timestamp runs up
/// to the first space; lines without a space are dropped. Partial lines are
/// buffered across reads.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<LogLine> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if let Some(line) = parse_line(&self.buf) {
                    lines.push(line);
                }
                self.buf.clear();
            } else {
                self.buf.push(byte);
            }
        }

        lines
    }
}

fn parse_line(raw: &[u8]) -> Option<LogLine> {
    let mut line = String::from_utf8_lossy(raw);
    if line.ends_with('\r') {
        line = std::borrow::Cow::Owned(line.trim_end_matches('\r').to_string());
    }

    let (timestamp, data) = line.split_once(' ')?;
    Some(LogLine {
        timestamp: timestamp.to_string(),
        data: data.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ts: &str, data: &str) -> LogLine {
        LogLine {
            timestamp: ts.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn splits_complete_lines() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"2024-01-01T00:00:00Z hello\n2024-01-01T00:00:01Z world\n");
        assert_eq!(
            lines,
            vec![
                line("2024-01-01T00:00:00Z", "hello"),
                line("2024-01-01T00:00:01Z", "world"),
            ]
        );
    }

    #[test]
    fn buffers_partial_lines_across_reads() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"2024-01-01T00:00:00Z hel").is_empty());
        let lines = splitter.push(b"lo\n");
        assert_eq!(lines, vec![line("2024-01-01T00:00:00Z", "hello")]);
    }

    #[test]
    fn drops_lines_without_a_space() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"malformed\n2024-01-01T00:00:00Z ok\n");
        assert_eq!(lines, vec![line("2024-01-01T00:00:00Z", "ok")]);
    }

    #[test]
    fn keeps_payload_spaces_intact() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"ts a b c\n");
        assert_eq!(lines, vec![line("ts", "a b c")]);
    }

    #[test]
    fn preserves_byte_order_across_chunks() {
        let mut splitter = LineSplitter::new();
        let mut all = Vec::new();
        for chunk in [&b"t1 one\nt2 tw"[..], &b"o\nt3 three\n"[..]] {
            all.extend(splitter.push(chunk));
        }
        assert_eq!(
            all,
            vec![line("t1", "one"), line("t2", "two"), line("t3", "three")]
        );
    }

    #[test]
    fn empty_payload_after_space_is_kept() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"ts \n");
        assert_eq!(lines, vec![line("ts", "")]);
    }
}
