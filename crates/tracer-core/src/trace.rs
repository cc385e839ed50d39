//! Human-readable diagnostic trace.

use std::collections::VecDeque;

use tokio::sync::RwLock;
use tracing::info;

/// Default number of lines kept before the oldest are dropped.
pub const DEFAULT_TRACE_LINES: usize = 500;

/// Append-only log of status lines, newest first.
///
/// Lines are also emitted as `info` tracing events. The trace never affects
/// control flow. Only the newest `max_lines` lines are kept.
#[derive(Debug)]
pub struct CapabilityTrace {
    lines: RwLock<VecDeque<String>>,
    max_lines: usize,
}

impl Default for CapabilityTrace {
    fn default() -> Self {
        Self::with_max_lines(DEFAULT_TRACE_LINES)
    }
}

impl CapabilityTrace {
    /// Create an empty trace keeping [`DEFAULT_TRACE_LINES`] lines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty trace keeping at most `max_lines` lines.
    ///
    /// A `max_lines` of zero is treated as one.
    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            lines: RwLock::new(VecDeque::new()),
            max_lines: max_lines.max(1),
        }
    }

    /// Record a status line, dropping the oldest line when full.
    pub async fn append(&self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "tracer_core::trace", "tracing status: {}", line);
        let mut lines = self.lines.write().await;
        lines.push_front(line);
        lines.truncate(self.max_lines);
    }

    /// Maximum number of lines kept.
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// All lines, newest first.
    pub async fn lines(&self) -> Vec<String> {
        self.lines.read().await.iter().cloned().collect()
    }

    /// The most recent line.
    pub async fn latest(&self) -> Option<String> {
        self.lines.read().await.front().cloned()
    }

    /// Number of recorded lines.
    pub async fn len(&self) -> usize {
        self.lines.read().await.len()
    }

    /// Whether nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The trace as one block of text, newest line first.
    pub async fn render(&self) -> String {
        self.lines
            .read()
            .await
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newest_first() {
        let trace = CapabilityTrace::new();
        assert!(trace.is_empty().await);

        trace.append("radio is available").await;
        trace.append("Location permission is granted").await;

        assert_eq!(
            trace.lines().await,
            vec!["Location permission is granted", "radio is available"]
        );
        assert_eq!(
            trace.latest().await.as_deref(),
            Some("Location permission is granted")
        );
        assert_eq!(
            trace.render().await,
            "Location permission is granted\nradio is available"
        );
    }

    #[tokio::test]
    async fn test_oldest_lines_dropped_when_full() {
        let trace = CapabilityTrace::with_max_lines(3);
        for i in 0..5 {
            trace.append(format!("line {i}")).await;
        }

        assert_eq!(trace.len().await, 3);
        assert_eq!(trace.lines().await, vec!["line 4", "line 3", "line 2"]);
        assert_eq!(CapabilityTrace::new().max_lines(), DEFAULT_TRACE_LINES);
    }
}
