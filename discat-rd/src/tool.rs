//! External disc tool adapter
//!
//! Launches the disc-reading tool in robot mode and exposes its stdout as a
//! stream of raw records. Output framing only lives here: one line per
//! record, `KIND:field,field,...`, with double-quoted fields that may
//! contain commas and backslash escapes. Interpretation of the fields
//! belongs to the parser.

use crate::error::SessionError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One line of tool output, split into kind and fields but not interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Record kind prefix, uppercased (`CINFO`, `TINFO`, `MSG`, ...)
    pub kind: String,
    /// Comma-separated fields with quoting removed
    pub fields: Vec<String>,
}

/// What the adapter delivers to the session
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// A line of tool output
    Record(RawRecord),
    /// The tool process exited and stdout is drained. Synthesized by the
    /// adapter; the tool itself has no end-of-output record.
    Closed { clean: bool, detail: String },
}

/// Split one output line into a raw record.
///
/// Returns `None` for blank lines. A line without a kind separator is kept
/// as a record with no fields so the parser can count it as unknown.
pub fn split_record(line: &str) -> Option<RawRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let (kind, rest) = match line.split_once(':') {
        Some((kind, rest)) => (kind, Some(rest)),
        None => (line, None),
    };

    Some(RawRecord {
        kind: kind.trim().to_ascii_uppercase(),
        fields: rest.map(split_fields).unwrap_or_default(),
    })
}

/// Split the field portion of a record on top-level commas.
///
/// Double-quoted fields may contain commas and backslash-escaped characters;
/// the quotes are stripped and escapes resolved. An unterminated quote runs
/// to end of line rather than being rejected.
fn split_fields(rest: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = rest.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Launches the external tool and adapts its output
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    binary: String,
    extra_args: Vec<String>,
    min_title_seconds: u64,
}

impl ToolAdapter {
    pub fn new(binary: String, extra_args: Vec<String>, min_title_seconds: u64) -> Self {
        Self {
            binary,
            extra_args,
            min_title_seconds,
        }
    }

    /// Launch a robot-mode `info` read of the given device.
    ///
    /// Failure to spawn maps to `ToolUnavailable`; everything after a
    /// successful spawn is reported through the stream, ending with a
    /// `Closed` event once the process exits.
    pub async fn start_read(&self, device_path: &Path) -> Result<ReadStream, SessionError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-r")
            .arg("--messages=-stdout")
            .arg("--progress=-stdout")
            .arg(format!("--minlength={}", self.min_title_seconds))
            .args(&self.extra_args)
            .arg("info")
            .arg(format!("dev:{}", device_path.display()))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(binary = %self.binary, device = %device_path.display(), "Launching disc tool");

        let mut child = command
            .spawn()
            .map_err(|e| SessionError::ToolUnavailable(format!("{}: {}", self.binary, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SessionError::ToolUnavailable("Tool stdout not captured".to_string())
        })?;

        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(record) = split_record(&line) {
                            if tx.send(RawEvent::Record(record)).await.is_err() {
                                // Receiver dropped; kill_on_drop reaps the child
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading tool output: {}", e);
                        break;
                    }
                }
            }

            let closed = match child.wait().await {
                Ok(status) => RawEvent::Closed {
                    clean: status.success(),
                    detail: status.to_string(),
                },
                Err(e) => RawEvent::Closed {
                    clean: false,
                    detail: format!("Wait failed: {}", e),
                },
            };
            let _ = tx.send(closed).await;
        });

        Ok(ReadStream {
            events: rx,
            task: Some(task),
        })
    }
}

/// Ordered stream of raw events from one tool invocation
#[derive(Debug)]
pub struct ReadStream {
    events: mpsc::Receiver<RawEvent>,
    task: Option<JoinHandle<()>>,
}

impl ReadStream {
    /// Next event, or `None` once the stream is exhausted after `Closed`
    pub async fn next_event(&mut self) -> Option<RawEvent> {
        self.events.recv().await
    }

    /// Stream that replays a fixed event script. Used by tests to exercise
    /// the session pipeline without a real tool process.
    pub fn scripted(events: Vec<RawEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let task = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Self {
            events: rx,
            task: Some(task),
        }
    }

    /// Stream that replays a script and then goes silent with the channel
    /// held open, like a hung tool process. Consumers see neither further
    /// events nor a close; only their own timeout ends the wait.
    pub fn scripted_stall(events: Vec<RawEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let task = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the sender alive so the receiver never observes a close
            std::future::pending::<()>().await;
        });
        Self {
            events: rx,
            task: Some(task),
        }
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_record_basic() {
        let record = split_record("TCOUT:12").unwrap();
        assert_eq!(record.kind, "TCOUT");
        assert_eq!(record.fields, vec!["12"]);
    }

    #[test]
    fn test_split_record_quoted_fields() {
        let record =
            split_record(r#"CINFO:2,0,"The Disc, Part One""#).unwrap();
        assert_eq!(record.kind, "CINFO");
        assert_eq!(record.fields, vec!["2", "0", "The Disc, Part One"]);
    }

    #[test]
    fn test_split_record_escaped_quote() {
        let record = split_record(r#"MSG:1005,0,1,"said \"hi\"","%1""#).unwrap();
        assert_eq!(record.fields[3], r#"said "hi""#);
        assert_eq!(record.fields[4], "%1");
    }

    #[test]
    fn test_split_record_blank_line() {
        assert!(split_record("").is_none());
        assert!(split_record("   \r\n").is_none());
    }

    #[test]
    fn test_split_record_no_separator() {
        let record = split_record("GARBAGE").unwrap();
        assert_eq!(record.kind, "GARBAGE");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_split_record_lowercase_kind_normalized() {
        let record = split_record("tinfo:0,9,0,\"1:30:00\"").unwrap();
        assert_eq!(record.kind, "TINFO");
    }

    #[test]
    fn test_split_fields_empty_fields_preserved() {
        let record = split_record("SINFO:0,1,,0,").unwrap();
        assert_eq!(record.fields, vec!["0", "1", "", "0", ""]);
    }

    #[test]
    fn test_split_fields_unterminated_quote_runs_to_eol() {
        let record = split_record(r#"MSG:1,"open ended, still one field"#).unwrap();
        assert_eq!(record.fields, vec!["1", "open ended, still one field"]);
    }

    #[tokio::test]
    async fn test_scripted_stream_replays_in_order() {
        let mut stream = ReadStream::scripted(vec![
            RawEvent::Record(split_record("TCOUT:2").unwrap()),
            RawEvent::Closed {
                clean: true,
                detail: "exit status: 0".to_string(),
            },
        ]);

        match stream.next_event().await {
            Some(RawEvent::Record(r)) => assert_eq!(r.kind, "TCOUT"),
            other => panic!("unexpected event: {:?}", other),
        }
        match stream.next_event().await {
            Some(RawEvent::Closed { clean, .. }) => assert!(clean),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_unavailable() {
        let adapter = ToolAdapter::new(
            "/nonexistent/discat-test-binary".to_string(),
            Vec::new(),
            0,
        );
        let result = adapter.start_read(Path::new("/dev/sr0")).await;
        assert!(matches!(result, Err(SessionError::ToolUnavailable(_))));
    }
}
