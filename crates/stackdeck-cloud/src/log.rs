//! Operator-facing log lines
//!
//! Every progress message produced by the core is a [`LogLine`]: rendered text
//! plus the [`LogTag`] naming where it came from. Presentation layers color
//! lines by tag; the textual prefixes (`[poll]`, `Warning:`, ...) are part of
//! the contract and must not change.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Origin / severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogTag {
    Info,
    Success,
    Warning,
    Error,
    Poll,
    Router,
    FloatingIp,
    Ports,
    Auth,
    Ui,
    /// No recognizable origin
    Plain,
}

impl LogTag {
    /// Prefix written in front of the message, if the tag has one
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            LogTag::Info => Some("Info:"),
            LogTag::Warning => Some("Warning:"),
            LogTag::Error => Some("Error:"),
            LogTag::Poll => Some("[poll]"),
            LogTag::Router => Some("[router]"),
            LogTag::FloatingIp => Some("[floating-ip]"),
            LogTag::Ports => Some("[ports]"),
            LogTag::Auth => Some("[auth]"),
            LogTag::Ui => Some("[ui]"),
            LogTag::Success | LogTag::Plain => None,
        }
    }

    /// Classify a free-form line.
    ///
    /// Explicit prefixes win; otherwise a few keywords decide, and lines
    /// matching nothing have no tag.
    pub fn infer(line: &str) -> Option<LogTag> {
        let s = line.trim();
        if s.is_empty() {
            return None;
        }

        const PREFIXED: [LogTag; 9] = [
            LogTag::Error,
            LogTag::Warning,
            LogTag::Info,
            LogTag::Poll,
            LogTag::Router,
            LogTag::FloatingIp,
            LogTag::Ports,
            LogTag::Auth,
            LogTag::Ui,
        ];
        for tag in PREFIXED {
            if let Some(prefix) = tag.prefix()
                && s.starts_with(prefix)
            {
                return Some(tag);
            }
        }

        let lowered = s.to_lowercase();
        if lowered.contains("success") {
            Some(LogTag::Success)
        } else if lowered.contains("failed") || lowered.contains("exception") {
            Some(LogTag::Error)
        } else if lowered.contains("warning") {
            Some(LogTag::Warning)
        } else if lowered.contains("info") {
            Some(LogTag::Info)
        } else {
            None
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTag::Info => write!(f, "info"),
            LogTag::Success => write!(f, "success"),
            LogTag::Warning => write!(f, "warning"),
            LogTag::Error => write!(f, "error"),
            LogTag::Poll => write!(f, "poll"),
            LogTag::Router => write!(f, "router"),
            LogTag::FloatingIp => write!(f, "floating-ip"),
            LogTag::Ports => write!(f, "ports"),
            LogTag::Auth => write!(f, "auth"),
            LogTag::Ui => write!(f, "ui"),
            LogTag::Plain => write!(f, "plain"),
        }
    }
}

/// A single rendered log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub tag: LogTag,
    pub text: String,
}

impl LogLine {
    /// Build a line under `tag`, adding the tag's prefix.
    pub fn tagged(tag: LogTag, message: impl AsRef<str>) -> Self {
        let message = message.as_ref();
        let text = match tag.prefix() {
            Some(prefix) => format!("{} {}", prefix, message),
            None => message.to_string(),
        };
        Self { tag, text }
    }

    /// Wrap already-rendered text, inferring its tag.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let tag = LogTag::infer(&text).unwrap_or(LogTag::Plain);
        Self { tag, text }
    }
}

impl std::fmt::Display for LogLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Cloneable handle the core writes log lines into.
///
/// Lines are mirrored to `tracing` and, when a receiver is attached, pushed
/// onto an unbounded channel for the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    tx: Option<mpsc::UnboundedSender<LogLine>>,
}

impl LogSink {
    /// Sink plus the receiving end of its line stream
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that only forwards to `tracing`
    pub fn tracing_only() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, line: LogLine) {
        match line.tag {
            LogTag::Error => tracing::error!(target: "stackdeck::console", "{}", line.text),
            LogTag::Warning => tracing::warn!(target: "stackdeck::console", "{}", line.text),
            _ => tracing::info!(target: "stackdeck::console", "{}", line.text),
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is watching any more
            let _ = tx.send(line);
        }
    }

    pub fn tagged(&self, tag: LogTag, message: impl AsRef<str>) {
        self.emit(LogLine::tagged(tag, message));
    }

    pub fn plain(&self, text: impl Into<String>) {
        self.emit(LogLine::plain(text));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.tagged(LogTag::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.tagged(LogTag::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.tagged(LogTag::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_prefixes() {
        assert_eq!(LogTag::infer("Error: boom"), Some(LogTag::Error));
        assert_eq!(LogTag::infer("  Warning: careful"), Some(LogTag::Warning));
        assert_eq!(LogTag::infer("Info: fyi"), Some(LogTag::Info));
        assert_eq!(LogTag::infer("[poll] Polling images"), Some(LogTag::Poll));
        assert_eq!(LogTag::infer("[router] Created"), Some(LogTag::Router));
        assert_eq!(LogTag::infer("[floating-ip] Associated"), Some(LogTag::FloatingIp));
        assert_eq!(LogTag::infer("[ports] Fetched 1 port(s)"), Some(LogTag::Ports));
        assert_eq!(LogTag::infer("[auth] Requesting"), Some(LogTag::Auth));
        assert_eq!(LogTag::infer("[ui] Updated"), Some(LogTag::Ui));
    }

    #[test]
    fn test_prefix_beats_keywords() {
        // "[poll] ... failed" is still a poll line
        assert_eq!(
            LogTag::infer("[poll] Failed to fetch ports. Status: 500"),
            Some(LogTag::Poll)
        );
    }

    #[test]
    fn test_infer_keywords() {
        assert_eq!(LogTag::infer("Network creation successful."), Some(LogTag::Success));
        assert_eq!(LogTag::infer("Subnet creation failed."), Some(LogTag::Error));
        assert_eq!(LogTag::infer("an Exception occurred"), Some(LogTag::Error));
        assert_eq!(LogTag::infer("this is a warning"), Some(LogTag::Warning));
        assert_eq!(LogTag::infer("more info here"), Some(LogTag::Info));
        assert_eq!(LogTag::infer("Refresh complete."), None);
        assert_eq!(LogTag::infer("   "), None);
    }

    #[test]
    fn test_tagged_rendering() {
        assert_eq!(LogLine::tagged(LogTag::Poll, "x").text, "[poll] x");
        assert_eq!(LogLine::tagged(LogTag::Warning, "x").text, "Warning: x");
        assert_eq!(LogLine::tagged(LogTag::Success, "done").text, "done");
        assert_eq!(LogLine::plain("Refresh complete.").tag, LogTag::Plain);
    }

    #[tokio::test]
    async fn test_sink_delivers_lines_in_order() {
        let (sink, mut rx) = LogSink::channel();
        sink.info("first");
        sink.tagged(LogTag::Router, "second");
        sink.plain("Instance creation successful. ID: srv-1");
        drop(sink);

        let lines: Vec<LogLine> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "Info: first");
        assert_eq!(lines[1].tag, LogTag::Router);
        assert_eq!(lines[2].tag, LogTag::Success);
    }

    #[test]
    fn test_sink_without_receiver_does_not_panic() {
        let (sink, rx) = LogSink::channel();
        drop(rx);
        sink.error("nobody listening");
        LogSink::tracing_only().warn("still fine");
    }
}
