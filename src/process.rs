//! External process execution with a hard wall-clock timeout.
//!
//! Every spawn runs from the workspace root with stdin closed. On unix the
//! child leads its own process group, and the whole group (including anything
//! the child started) is killed when the deadline passes. With serialization
//! enabled, runs share one async mutex per workspace and execute one at a time.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut all = String::with_capacity(self.stdout.len() + self.stderr.len());
        all.push_str(&self.stdout);
        all.push_str(&self.stderr);
        all
    }
}

#[derive(Clone)]
pub struct ProcessRunner {
    cwd: PathBuf,
    lock: Option<Arc<Mutex<()>>>,
}

impl ProcessRunner {
    pub fn new(cwd: impl Into<PathBuf>, serialize: bool) -> Self {
        Self {
            cwd: cwd.into(),
            lock: serialize.then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// Run `argv` (program first) and capture its output.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ToolFailure`] when the program cannot be started.
    /// - [`CoreError::ExecutionTimeout`] when it outlives `timeout_secs`.
    pub async fn run(
        &self,
        tool: &str,
        argv: &[String],
        timeout_secs: u64,
    ) -> CoreResult<ProcessOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| CoreError::ToolFailure {
            tool: tool.to_string(),
            message: "empty command line".to_string(),
        })?;

        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::info!(tool, command = %argv.join(" "), timeout_secs, "spawning");
        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| CoreError::ToolFailure {
            tool: tool.to_string(),
            message: format!("failed to start '{}': {}", program, e),
        })?;
        let pid = child.id();

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result.map_err(|e| CoreError::ToolFailure {
                tool: tool.to_string(),
                message: format!("failed to collect output: {}", e),
            })?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                tracing::warn!(tool, timeout_secs, "process timed out and was killed");
                return Err(CoreError::ExecutionTimeout {
                    tool: tool.to_string(),
                    secs: timeout_secs,
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(tool, exit = ?output.status.code(), duration_ms, "process finished");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration_ms,
        })
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: plain syscall; a negative pid addresses the group led by the child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_captures_both_streams_from_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
        let runner = ProcessRunner::new(tmp.path(), false);
        let out = runner
            .run("sh", &sh("cat marker.txt; echo oops >&2; exit 3"), 10)
            .await
            .unwrap();
        assert_eq!(out.stdout, "here");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.combined(), "hereoops\n");
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let tmp = TempDir::new().unwrap();
        let runner = ProcessRunner::new(tmp.path(), false);
        let started = Instant::now();
        let err = runner.run("sleepy", &sh("sleep 30"), 1).await.unwrap_err();
        assert!(matches!(err, CoreError::ExecutionTimeout { secs: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// Alive and not a zombie waiting to be reaped by its new parent.
    fn process_alive(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let tmp = TempDir::new().unwrap();
        let runner = ProcessRunner::new(tmp.path(), false);
        let err = runner
            .run("sh", &sh("sleep 20 & echo $! > pid; wait"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExecutionTimeout { secs: 1, .. }));

        let pid: i32 = std::fs::read_to_string(tmp.path().join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = true;
        for _ in 0..40 {
            alive = process_alive(pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "background sleep {} survived the timeout", pid);
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_failure() {
        let tmp = TempDir::new().unwrap();
        let runner = ProcessRunner::new(tmp.path(), false);
        let err = runner
            .run("ghost", &["definitely-not-a-real-binary-xyz".to_string()], 5)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "tool_failure");
        assert!(runner.run("empty", &[], 5).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serialized_runs_do_not_overlap() {
        let tmp = TempDir::new().unwrap();
        let runner = ProcessRunner::new(tmp.path(), true);
        let started = Instant::now();
        let a = runner.clone();
        let b = runner.clone();
        let (ra, rb) = tokio::join!(
            async move { a.run("a", &sh("sleep 0.4"), 10).await },
            async move { b.run("b", &sh("sleep 0.4"), 10).await },
        );
        ra.unwrap();
        rb.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(800));
    }
}
