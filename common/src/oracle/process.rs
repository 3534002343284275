use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{Oracle, OracleError, Problem};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to run an external solver.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    /// Where each problem is written before the solver runs.
    pub prompt_dir: PathBuf,
    /// Where each raw solver answer is kept.
    pub response_dir: PathBuf,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            program: PathBuf::from("mace4"),
            args: Vec::new(),
            timeout_ms: 10_000,
            prompt_dir: PathBuf::from("mace4_prompts"),
            response_dir: PathBuf::from("mace4_responses"),
        }
    }
}

impl ProcessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Shared flag for abandoning an in-flight oracle call from another thread.
///
/// A cancellation only reaches the call running when it is raised; one
/// raised between calls is discarded when the next call starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consumes a pending cancellation, returning whether there was one.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Runs an external solver process per problem.
///
/// The problem text goes to the child's stdin and its stdout is the answer.
/// Every call is bounded by the configured timeout and can be cancelled
/// through [`CancelToken`]; in both cases the child is killed.
pub struct ProcessOracle {
    config: ProcessConfig,
    cancel: CancelToken,
    step: u64,
}

impl ProcessOracle {
    pub fn new(config: ProcessConfig) -> Self {
        ProcessOracle {
            config,
            cancel: CancelToken::new(),
            step: 0,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// A token that cancels calls made by this oracle.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Empties the prompt and response directories, creating them if needed.
    /// Left to whoever owns the oracle's lifecycle; nothing calls this
    /// implicitly.
    pub fn reset_workspace(&mut self) -> Result<(), OracleError> {
        for dir in [&self.config.prompt_dir, &self.config.response_dir] {
            clear_dir(dir)?;
        }
        self.step = 0;
        Ok(())
    }

    fn spawn(&self) -> Result<Child, OracleError> {
        Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => OracleError::Unavailable(
                    format!("{}: {e}", self.config.program.display()),
                ),
                _ => OracleError::Io(e),
            })
    }

    /// Polls the child until it exits, the deadline passes or the call is
    /// cancelled.
    fn wait(&self, child: &mut Child) -> Result<std::process::ExitStatus, OracleError> {
        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.take() {
                kill(child);
                return Err(OracleError::Cancelled);
            }
            if Instant::now() >= deadline {
                kill(child);
                return Err(OracleError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Oracle for ProcessOracle {
    fn invoke(&mut self, problem: &Problem) -> Result<String, OracleError> {
        self.step += 1;
        if self.cancel.take() {
            debug!(step = self.step, "discarding cancellation raised between calls");
        }

        let text = problem.render();
        fs::create_dir_all(&self.config.prompt_dir)?;
        fs::write(
            self.config.prompt_dir.join(format!("step_{}.in", self.step)),
            text.as_bytes(),
        )?;

        info!(
            program = %self.config.program.display(),
            step = self.step,
            revision = problem.revision,
            "invoking oracle"
        );
        let mut child = self.spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let stdin = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(text.as_bytes()) {
                // The solver may exit without reading its input
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });

        let status = self.wait(&mut child)?;
        if let Some(writer) = stdin {
            writer
                .join()
                .map_err(|_| std::io::Error::other("oracle input writer panicked"))??;
        }
        let stdout = join(stdout)?;
        let stderr = join(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            warn!(%status, %stderr, "oracle failed");
            return Err(OracleError::Failed {
                status: status.to_string(),
                stderr,
            });
        }

        fs::create_dir_all(&self.config.response_dir)?;
        fs::write(
            self.config.response_dir.join(format!("step_{}.out", self.step)),
            &stdout,
        )?;

        String::from_utf8(stdout).map_err(|e| OracleError::MalformedOutput(e.to_string()))
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill oracle process");
    }
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>, OracleError> {
    match handle {
        Some(handle) => match handle.join() {
            Ok(bytes) => Ok(bytes?),
            Err(_) => Err(OracleError::Io(std::io::Error::other(
                "oracle output reader panicked",
            ))),
        },
        None => Ok(Vec::new()),
    }
}

fn clear_dir(dir: &Path) -> Result<(), OracleError> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
