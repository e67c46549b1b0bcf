//! Lossless file-size optimization through an external tool.
//!
//! The default tool is `jpegoptim`, driven purely by exit codes:
//!
//! ```text
//! jpegoptim --help          probe: is the tool installed and runnable?
//! jpegoptim -s <path>       strip metadata, optimize losslessly, in place
//! ```
//!
//! ## Probe vs. run
//!
//! The two invocations fail differently, on purpose:
//!
//! | Situation | Result | Pipeline effect |
//! |---|---|---|
//! | Probe cannot spawn or exits non-zero | `Ok(ToolUnavailable)` | stage skipped, pipeline continues |
//! | Run cannot spawn | `Err(Spawn)` | image fails |
//! | Run exits non-zero | `Err(Failed)` | image fails |
//! | Run exceeds the timeout | `Err(TimedOut)` (child killed) | image fails |
//!
//! A missing tool is an environment problem. A tool that is present but
//! rejects a specific file points at a bad asset.
//!
//! Calls block the current thread until the tool exits.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting on a child with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Could not start {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Optimizer failed on {path} ({status}): {stderr}")]
    Failed {
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Optimizer timed out after {after:?} on {path}")]
    TimedOut { path: PathBuf, after: Duration },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a non-fatal optimize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeOutcome {
    Optimized,
    /// The probe failed; the file was not touched.
    ToolUnavailable,
}

/// Anything that can shrink a stored file in place.
pub trait Optimizer: Sync {
    fn optimize(&self, path: &Path) -> Result<OptimizeOutcome, OptimizeError>;
}

/// External command-line optimizer (`jpegoptim` by default).
#[derive(Debug, Clone)]
pub struct JpegOptim {
    tool: PathBuf,
    timeout: Option<Duration>,
}

impl JpegOptim {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            timeout: None,
        }
    }

    /// Bound every invocation. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Whether `tool --help` runs and exits zero.
    pub fn probe(&self) -> bool {
        let child = Command::new(&self.tool)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match child {
            Ok(child) => matches!(
                wait_with_timeout(child, self.timeout),
                Ok(Some(status)) if status.success()
            ),
            Err(e) => {
                log::debug!("optimizer probe could not start {}: {}", self.tool.display(), e);
                false
            }
        }
    }

    fn run(&self, path: &Path) -> Result<(), OptimizeError> {
        let mut child = Command::new(&self.tool)
            .arg("-s")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OptimizeError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        // Drain stderr on its own thread so a chatty tool cannot fill the
        // pipe and stall while we poll for exit.
        let stderr = child.stderr.take();
        let drain = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let Some(status) = wait_with_timeout(child, self.timeout)? else {
            // A grandchild of a killed wrapper can hold stderr open for as
            // long as it lives; the drain thread is detached, not joined.
            return Err(OptimizeError::TimedOut {
                path: path.to_path_buf(),
                after: self.timeout.unwrap_or_default(),
            });
        };
        let stderr = drain.join().unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(OptimizeError::Failed {
                path: path.to_path_buf(),
                status,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl Default for JpegOptim {
    fn default() -> Self {
        Self::new("jpegoptim")
    }
}

impl Optimizer for JpegOptim {
    fn optimize(&self, path: &Path) -> Result<OptimizeOutcome, OptimizeError> {
        if !self.probe() {
            log::warn!(
                "optimizer {} unavailable, skipping {}",
                self.tool.display(),
                path.display()
            );
            return Ok(OptimizeOutcome::ToolUnavailable);
        }
        let started = Instant::now();
        self.run(path)?;
        log::debug!("optimized {} in {:?}", path.display(), started.elapsed());
        Ok(OptimizeOutcome::Optimized)
    }
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Returns `Ok(None)` when the child was killed.
fn wait_with_timeout(mut child: Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
