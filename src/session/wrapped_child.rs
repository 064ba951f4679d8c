//! Wrapped child process with process group support
//!
//! Spawns session processes through process-wrap so that terminating a
//! session takes every descendant of the shell down with it.

use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use process_wrap::tokio::{ChildWrapper, CommandWrap, KillOnDrop};
#[cfg(unix)]
use process_wrap::tokio::ProcessGroup;
use tokio::process::{ChildStdin, ChildStdout};

/// Wrapper around `Box<dyn ChildWrapper>`
///
/// The child leads its own process group and is killed on drop, so a
/// session that is dropped without an explicit terminate cannot leak.
#[derive(Debug)]
pub struct WrappedChild {
    inner: Box<dyn ChildWrapper>,
}

impl WrappedChild {
    /// Spawn `program args...` with piped stdin/stdout
    ///
    /// stderr is discarded here; sessions merge it into stdout themselves so
    /// both streams keep their relative order.
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut command = CommandWrap::with_new(program, |cmd| {
            cmd.args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null());
        });
        #[cfg(unix)]
        command.wrap(ProcessGroup::leader());
        command.wrap(KillOnDrop);

        Ok(Self {
            inner: command.spawn()?,
        })
    }

    /// Take the child's stdin pipe
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.inner.stdin().take()
    }

    /// Take the child's stdout pipe
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.inner.stdout().take()
    }

    /// Kill the process group and wait for exit
    pub async fn kill(&mut self) -> io::Result<()> {
        Pin::from(self.inner.kill()).await
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        Pin::from(self.inner.wait()).await
    }

    /// Try to wait without blocking
    ///
    /// Returns Some(status) if the process has exited, None if still running.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.inner.try_wait()
    }

    /// Get the process ID (0 once the child has been reaped)
    pub fn id(&self) -> u32 {
        self.inner.id().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut child = WrappedChild::spawn("/bin/sh", &["-c".to_string(), "exit 3".to_string()])
            .unwrap();
        assert!(child.id() > 0);
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_kill_running_child() {
        let mut child =
            WrappedChild::spawn("/bin/sh", &["-c".to_string(), "sleep 30".to_string()]).unwrap();
        assert!(child.try_wait().unwrap().is_none());
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = WrappedChild::spawn("/nonexistent/program", &[]);
        assert!(result.is_err());
    }
}
