//! Bounded per-instance log ring buffer (spec §4.3, design note "Logs as a
//! bounded ring"). This is the core's contract to any external log pipeline;
//! it does not itself do multiline joining, redaction or JSON parsing.

use std::collections::VecDeque;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: SystemTime,
    pub stream: Stream,
    pub text: String,
}

/// Fixed-capacity ring: pushing past capacity evicts the oldest line.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    lines: VecDeque<LogLine>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        LogRing {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, stream: Stream, text: String, timestamp: SystemTime) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            timestamp,
            stream,
            text,
        });
    }

    /// `logsSnapshot(limit)`: most recent `limit` lines, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<LogLine> {
        let skip = self.lines.len().saturating_sub(limit);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_evicts_oldest() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(Stream::Stdout, format!("line {i}"), SystemTime::now());
        }
        let snap = ring.snapshot(10);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].text, "line 2");
        assert_eq!(snap[2].text, "line 4");
    }

    #[test]
    fn snapshot_respects_limit_smaller_than_buffer() {
        let mut ring = LogRing::new(10);
        for i in 0..5 {
            ring.push(Stream::Stderr, format!("line {i}"), SystemTime::now());
        }
        let snap = ring.snapshot(2);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].text, "line 3");
        assert_eq!(snap[1].text, "line 4");
    }
}
