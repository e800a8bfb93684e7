//! Supervised subprocess execution.
//!
//! Children run in their own process group so that a timeout or an
//! interrupt can take down the whole tree, not just the direct child.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::interrupt::Interrupt;
use crate::domain::models::OutputProgress;

/// Time a group gets between SIGTERM and SIGKILL.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Time allowed to drain buffered output after the child exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited { success: bool, code: Option<i32> },
    TimedOut,
    Interrupted,
}

/// Captured result of a supervised process.
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub outcome: ProcessOutcome,
    /// Combined stdout and stderr, in arrival order
    pub output: String,
    pub duration: Duration,
}

/// Options for [`run_supervised`].
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub timeout: Duration,
    pub log_path: Option<PathBuf>,
    pub progress: Option<OutputProgress>,
    pub stdin: Option<String>,
}

/// Run `command` to completion, capturing its output.
///
/// The child is killed (with its whole process group) when `timeout`
/// elapses or `interrupt` fires.
pub async fn run_supervised(
    mut command: Command,
    options: CaptureOptions,
    interrupt: &Interrupt,
) -> DomainResult<CapturedRun> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let stdin = if options.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    command
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| EngineError::SpawnFailed {
        program: program.clone(),
        reason: e.to_string(),
    })?;
    let pgid = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
    debug!(program = %program, pid = ?child.id(), "spawned supervised process");

    if let Some(input) = options.stdin {
        if let Some(mut pipe) = child.stdin.take() {
            // A child that exits without reading stdin is not an engine error
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                debug!(program = %program, error = %e, "child closed stdin early");
            }
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let stdout = child.stdout.take().ok_or_else(|| EngineError::SpawnFailed {
        program: program.clone(),
        reason: "stdout was not captured".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| EngineError::SpawnFailed {
        program: program.clone(),
        reason: "stderr was not captured".to_string(),
    })?;
    tokio::spawn(forward_lines(stdout, tx.clone()));
    tokio::spawn(forward_lines(stderr, tx));

    let mut log = open_log(options.log_path.as_ref()).await;
    let mut output = String::new();
    let mut record = |line: String, log_buf: &mut Vec<u8>| {
        if let Some(progress) = &options.progress {
            progress.add(line.len() as u64 + 1);
        }
        log_buf.extend_from_slice(line.as_bytes());
        log_buf.push(b'\n');
        output.push_str(&line);
        output.push('\n');
    };

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        let mut log_buf = Vec::new();
        tokio::select! {
            biased;
            Some(line) = rx.recv() => {
                record(line, &mut log_buf);
            }
            status = child.wait() => {
                let status = status?;
                break ProcessOutcome::Exited {
                    success: status.success(),
                    code: status.code(),
                };
            }
            () = &mut deadline => {
                warn!(program = %program, timeout_secs = options.timeout.as_secs(), "process timed out, terminating group");
                terminate_group(&mut child, pgid).await;
                break ProcessOutcome::TimedOut;
            }
            () = interrupt.cancelled() => {
                warn!(program = %program, "interrupt received, terminating group");
                terminate_group(&mut child, pgid).await;
                break ProcessOutcome::Interrupted;
            }
        }
        write_log(&mut log, &log_buf).await;
    };

    // Collect whatever the readers still hold
    let mut tail = Vec::new();
    let drain_until = Instant::now() + DRAIN_TIMEOUT;
    while let Ok(Some(line)) = tokio::time::timeout_at(drain_until, rx.recv()).await {
        record(line, &mut tail);
    }
    write_log(&mut log, &tail).await;

    Ok(CapturedRun {
        outcome,
        output,
        duration: started.elapsed(),
    })
}

async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

async fn open_log(path: Option<&PathBuf>) -> Option<File> {
    let path = path?;
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            warn!(path = %path.display(), error = %e, "cannot create log directory");
            return None;
        }
    }
    match File::create(path).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot create invocation log");
            None
        }
    }
}

async fn write_log(log: &mut Option<File>, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if let Some(file) = log.as_mut() {
        if let Err(e) = file.write_all(bytes).await {
            warn!(error = %e, "invocation log write failed, disabling log");
            *log = None;
        }
    }
}

/// SIGTERM the group, then SIGKILL it if it outlives the grace period.
pub async fn terminate_group(child: &mut Child, pgid: Option<Pid>) {
    if let Some(pgid) = pgid {
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            debug!(pgid = %pgid, error = %e, "SIGTERM to process group failed");
        }
    }

    if tokio::time::timeout(TERMINATION_GRACE, child.wait()).await.is_ok() {
        return;
    }

    if let Some(pgid) = pgid {
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            debug!(pgid = %pgid, error = %e, "SIGKILL to process group failed");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill of direct child failed");
    }
}

/// Keep only the last `max_lines` lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn options(timeout: Duration) -> CaptureOptions {
        CaptureOptions {
            timeout,
            ..CaptureOptions::default()
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let run = run_supervised(
            shell("echo out; echo err 1>&2; exit 3"),
            options(Duration::from_secs(10)),
            &Interrupt::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            run.outcome,
            ProcessOutcome::Exited {
                success: false,
                code: Some(3)
            }
        );
        assert!(run.output.contains("out"));
        assert!(run.output.contains("err"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let run = run_supervised(
            shell("sleep 30"),
            options(Duration::from_millis(200)),
            &Interrupt::new(),
        )
        .await
        .unwrap();
        assert_eq!(run.outcome, ProcessOutcome::TimedOut);
        assert!(run.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_interrupt_kills_process() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });
        let run = run_supervised(shell("sleep 30"), options(Duration::from_secs(60)), &interrupt)
            .await
            .unwrap();
        assert_eq!(run.outcome, ProcessOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_stdin_and_progress_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs/attempt.log");
        let progress = OutputProgress::new();
        let run = run_supervised(
            shell("cat"),
            CaptureOptions {
                timeout: Duration::from_secs(10),
                log_path: Some(log_path.clone()),
                progress: Some(progress.clone()),
                stdin: Some("hello\n".to_string()),
            },
            &Interrupt::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.output, "hello\n");
        assert_eq!(progress.bytes(), 6);
        let logged = std::fs::read_to_string(log_path).unwrap();
        assert_eq!(logged, "hello\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let result = run_supervised(
            Command::new("/nonexistent/definitely-not-here"),
            options(Duration::from_secs(1)),
            &Interrupt::new(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::SpawnFailed { .. })));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }
}
