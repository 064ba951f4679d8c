//! Non-blocking access to a session process's output
//!
//! A pump task copies everything the process writes into the session's
//! [`OutputBuffer`] as it arrives, whether or not anyone is waiting on a
//! command. The reader side only walks a cursor over that buffer.

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::detector::ActivityProbe;
use super::output_buffer::OutputBuffer;
use super::session::SessionId;
use super::wrapped_child::WrappedChild;
use crate::types::{EngineError, Result};

const READ_CHUNK_SIZE: usize = 8192;

/// Stream reader over one session process
#[derive(Debug)]
pub struct StreamReader {
    session: SessionId,
    child: Mutex<WrappedChild>,
    pid: u32,
    stdin: Mutex<Option<ChildStdin>>,
    buffer: Arc<OutputBuffer>,
    cursor: AtomicUsize,
    eof: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl StreamReader {
    /// Spawn `program args...` and start pumping its output into `buffer`
    pub fn spawn(
        session: SessionId,
        program: &str,
        args: &[String],
        buffer: Arc<OutputBuffer>,
    ) -> Result<Self> {
        let mut child = WrappedChild::spawn(program, args).map_err(|e| {
            EngineError::process_dead(session, format!("failed to spawn {program}: {e}"))
        })?;
        let pid = child.id();

        let stdin = child
            .take_stdin()
            .ok_or_else(|| EngineError::internal("child stdin was not piped"))?;
        let mut stdout = child
            .take_stdout()
            .ok_or_else(|| EngineError::internal("child stdout was not piped"))?;

        let eof = Arc::new(AtomicBool::new(false));
        let pump = {
            let buffer = buffer.clone();
            let eof = eof.clone();
            tokio::spawn(async move {
                let mut chunk = vec![0u8; READ_CHUNK_SIZE];
                loop {
                    match stdout.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer.append(&chunk[..n]).await,
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            tracing::debug!(session = %session, error = %e, "Output pump stopped");
                            break;
                        }
                    }
                }
                eof.store(true, Ordering::SeqCst);
                tracing::debug!(session = %session, "Session output reached EOF");
            })
        };

        tracing::debug!(session = %session, pid, program, "Spawned session process");

        Ok(Self {
            session,
            child: Mutex::new(child),
            pid,
            stdin: Mutex::new(Some(stdin)),
            buffer,
            cursor: AtomicUsize::new(0),
            eof,
            pump,
        })
    }

    /// Process id of the session process
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Write one line of input, followed by a newline
    pub async fn write(&self, text: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(EngineError::process_dead(self.session, self.exit_detail()));
        }

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(EngineError::process_dead(self.session, "input stream closed"));
        };

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            guard.take();
            return Err(EngineError::process_dead(
                self.session,
                format!("failed to write input: {e}"),
            ));
        }
        Ok(())
    }

    /// Output that arrived since the previous call
    ///
    /// Waits at most `poll` for something new; returns an empty chunk when
    /// nothing arrived in that window.
    pub async fn read_available(&self, poll: Duration) -> Vec<u8> {
        let notified = self.buffer.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let offset = self.cursor.load(Ordering::SeqCst);
        let mut chunk = self.buffer.read_from(offset).await;
        if chunk.is_empty() {
            if self.eof.load(Ordering::SeqCst) {
                // Nothing more will arrive; keep callers from spinning
                tokio::time::sleep(poll).await;
            } else if tokio::time::timeout(poll, notified).await.is_ok() {
                chunk = self.buffer.read_from(offset).await;
            }
        }

        self.cursor.store(offset + chunk.len(), Ordering::SeqCst);
        chunk
    }

    /// Move the read cursor past everything buffered so far
    pub async fn skip_to_end(&self) {
        self.cursor.store(self.buffer.len().await, Ordering::SeqCst);
    }

    /// Whether the session process is still running
    pub fn is_alive(&self) -> bool {
        match self.child.try_lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            // Someone is killing or reaping it right now
            Err(_) => !self.eof.load(Ordering::SeqCst),
        }
    }

    /// Human readable reason the process is unusable
    pub fn exit_detail(&self) -> String {
        if let Ok(mut child) = self.child.try_lock() {
            if let Ok(Some(status)) = child.try_wait() {
                return status.to_string();
            }
        }
        if self.eof.load(Ordering::SeqCst) {
            "output stream closed".to_string()
        } else {
            "process unavailable".to_string()
        }
    }

    /// Output still in flight after the process exited
    ///
    /// Waits up to `grace` for the pump to reach EOF, then returns everything
    /// past the cursor.
    pub async fn read_remaining(&self, grace: Duration) -> Vec<u8> {
        let deadline = tokio::time::Instant::now() + grace;
        let mut rest = Vec::new();
        loop {
            let eof = self.eof.load(Ordering::SeqCst);
            rest.extend(self.read_available(Duration::from_millis(20)).await);
            if eof || tokio::time::Instant::now() >= deadline {
                return rest;
            }
        }
    }

    /// Kill the process group and stop pumping output
    ///
    /// The kill comes first: a write blocked on a full pipe holds the stdin
    /// lock until the reader side goes away.
    pub async fn terminate(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(session = %self.session, error = %e, "Kill failed, process likely already exited");
        }
        drop(child);

        self.stdin.lock().await.take();
        self.pump.abort();
    }
}

impl ActivityProbe for StreamReader {
    fn is_busy(&self) -> bool {
        process_is_busy(self.pid)
    }
}

/// Whether `pid` is running or has live children
#[cfg(target_os = "linux")]
fn process_is_busy(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };

    for entry in entries.flatten() {
        let Some(other) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{other}/stat")) else {
            continue;
        };
        let Some((state, ppid)) = parse_proc_stat(&stat) else {
            continue;
        };

        if other == pid && state == 'R' {
            return true;
        }
        if ppid == pid && state != 'Z' && state != 'X' {
            return true;
        }
    }
    false
}

#[cfg(not(target_os = "linux"))]
fn process_is_busy(_pid: u32) -> bool {
    false
}

/// Extract (state, ppid) from a `/proc/<pid>/stat` line
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are read after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_stat(stat: &str) -> Option<(char, u32)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((state, ppid))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    fn spawn_shell(buffer: Arc<OutputBuffer>) -> StreamReader {
        StreamReader::spawn(SessionId::new(0), "/bin/bash", &[], buffer).unwrap()
    }

    async fn read_until(stream: &StreamReader, needle: &str) -> String {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            seen.extend(stream.read_available(POLL).await);
            if String::from_utf8_lossy(&seen).contains(needle) {
                break;
            }
        }
        String::from_utf8_lossy(&seen).into_owned()
    }

    #[test]
    fn test_parse_proc_stat() {
        let stat = "1234 (my (odd) prog) S 99 1234 1234 0 -1 4194560";
        assert_eq!(parse_proc_stat(stat), Some(('S', 99)));
        assert_eq!(parse_proc_stat("garbage"), None);
    }

    #[tokio::test]
    async fn test_write_and_read_available() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = spawn_shell(buffer.clone());

        stream.write("echo hello").await.unwrap();
        let output = read_until(&stream, "hello").await;
        assert_eq!(output, "hello\n");

        // Cursor advanced: nothing is returned twice
        assert!(stream.read_available(POLL).await.is_empty());
        // The buffer keeps the history
        assert_eq!(buffer.full_text().await, "hello\n");

        stream.terminate().await;
    }

    #[tokio::test]
    async fn test_skip_to_end() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = spawn_shell(buffer);

        stream.write("echo stale").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        stream.skip_to_end().await;

        stream.write("echo fresh").await.unwrap();
        let output = read_until(&stream, "fresh").await;
        assert!(!output.contains("stale"));

        stream.terminate().await;
    }

    #[tokio::test]
    async fn test_write_after_exit_is_process_dead() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = spawn_shell(buffer);

        stream.write("exit 0").await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while stream.is_alive() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL).await;
        }
        assert!(!stream.is_alive());

        let err = stream.write("echo never").await.unwrap_err();
        assert!(matches!(err, EngineError::ProcessDead { .. }));
    }

    #[tokio::test]
    async fn test_terminate_unblocks_stuck_write() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = Arc::new(spawn_shell(buffer));

        // The shell stops reading stdin, so a large write fills the pipe
        stream.write("sleep 60").await.unwrap();
        let writer = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.write(&format!("echo {}", "a".repeat(300_000))).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        tokio::time::timeout(Duration::from_secs(5), stream.terminate())
            .await
            .expect("terminate must not wait on the blocked write");
        let result = tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .expect("blocked write must fail once the process is gone")
            .unwrap();
        assert!(matches!(result, Err(EngineError::ProcessDead { .. })));
    }

    #[tokio::test]
    async fn test_read_remaining_after_exit() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = spawn_shell(buffer);

        stream.write("echo bye; exit 0").await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while stream.is_alive() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL).await;
        }

        let rest = stream.read_remaining(Duration::from_secs(1)).await;
        assert_eq!(String::from_utf8_lossy(&rest), "bye\n");
        assert!(stream.read_remaining(Duration::ZERO).await.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_busy_probe_sees_running_child() {
        let buffer = Arc::new(OutputBuffer::new());
        let stream = spawn_shell(buffer);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stream.is_busy());

        stream.write("sleep 2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(stream.is_busy());

        stream.terminate().await;
    }
}
