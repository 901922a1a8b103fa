//! Recorder process capability and the livedl implementation.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::platform::SessionCredential;

const LINE_CHANNEL_CAPACITY: usize = 256;

/// Everything a recorder needs to capture one program.
#[derive(Debug, Clone)]
pub struct RecorderInvocation {
    /// Working and output directory.
    pub output_dir: PathBuf,
    /// Program to capture; also the output file name template.
    pub program_id: String,
    /// Session the recorder logs in with.
    pub session: SessionCredential,
}

/// One line of recorder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Line from standard output.
    Stdout(String),
    /// Line from standard error.
    Stderr(String),
}

/// Launches recorder processes.
pub trait Recorder: Send + Sync {
    /// Starts one recorder attempt.
    ///
    /// # Errors
    ///
    /// Returns the IO error when the process cannot be started.
    fn spawn(&self, invocation: &RecorderInvocation) -> io::Result<Box<dyn RecorderRun>>;
}

/// A running recorder attempt.
#[async_trait]
pub trait RecorderRun: Send {
    /// Next output line from either stream; `None` once both streams closed.
    async fn next_line(&mut self) -> Option<OutputLine>;

    /// Waits for exit; `None` when the process was killed by a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Kills the process.
    async fn kill(&mut self) -> io::Result<()>;
}

/// Recorder backed by the `livedl` binary.
#[derive(Debug, Clone)]
pub struct LivedlRecorder {
    program: PathBuf,
}

impl LivedlRecorder {
    /// Creates a recorder running the binary at `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Builds the livedl command line for `invocation`.
#[must_use]
pub fn livedl_args(invocation: &RecorderInvocation) -> Vec<String> {
    vec![
        "-no-chdir".to_string(),
        "-nico".to_string(),
        "-nico-session".to_string(),
        invocation.session.token().to_string(),
        "-nico-login-only=on".to_string(),
        "-nico-fast-ts".to_string(),
        "-nico-auto-convert=off".to_string(),
        "-nico-format".to_string(),
        invocation.program_id.clone(),
        "--".to_string(),
        invocation.program_id.clone(),
    ]
}

impl Recorder for LivedlRecorder {
    fn spawn(&self, invocation: &RecorderInvocation) -> io::Result<Box<dyn RecorderRun>> {
        debug!(
            program = %self.program.display(),
            program_id = %invocation.program_id,
            output_dir = %invocation.output_dir.display(),
            "Launching recorder"
        );
        let mut child = Command::new(&self.program)
            .args(livedl_args(invocation))
            .current_dir(&invocation.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("recorder stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("recorder stderr was not captured"))?;

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        tokio::spawn(forward_lines(stdout, tx.clone(), OutputLine::Stdout));
        tokio::spawn(forward_lines(stderr, tx, OutputLine::Stderr));

        Ok(Box::new(LivedlRun { child, lines: rx }))
    }
}

/// Forwards lines of `stream` until EOF; invalid UTF-8 is replaced.
async fn forward_lines<R>(stream: R, tx: mpsc::Sender<OutputLine>, wrap: fn(String) -> OutputLine)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(wrap(line)).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                trace!(error = %error, "Recorder output stream closed with error");
                break;
            }
        }
    }
}

struct LivedlRun {
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
}

#[async_trait]
impl RecorderRun for LivedlRun {
    async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().await.map(|status| status.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
