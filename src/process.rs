//! Centralized command execution with consistent error handling.
//!
//! Every external program (`diskutil`, `createinstallmedia`) goes through
//! [`Cmd`]. Failures come back as typed [`Error`]s: a program that cannot be
//! started is [`Error::CommandNotFound`], a non-zero exit is
//! [`Error::CommandFailed`] carrying the captured output.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, ExitKind, Result};

/// How long to wait for the output reader after the process has exited.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of a captured command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitKind,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == ExitKind::Code(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Stdout and stderr joined, the way a failure is reported.
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    fn spawn_error(&self, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Error::CommandNotFound {
                program: self.program.clone(),
            },
            _ => Error::Io(err),
        }
    }

    fn failure(&self, status: ExitKind, output: Option<String>) -> Error {
        Error::CommandFailed {
            argv: self.argv(),
            status,
            output,
            reported: false,
        }
    }

    /// Run the command and capture stdout and stderr.
    pub fn run(&self) -> Result<CommandResult> {
        debug!("Running: {}", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        let result = CommandResult {
            status: ExitKind::from_status(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            let combined = result.combined_output();
            let output = (!combined.is_empty()).then_some(combined);
            return Err(self.failure(result.status, output));
        }

        Ok(result)
    }

    /// Run and return trimmed stdout.
    pub fn output(&self) -> Result<String> {
        Ok(self.run()?.stdout_trimmed().to_string())
    }

    /// Run the command with inherited stdio.
    ///
    /// Output goes directly to the terminal and nothing is captured.
    pub fn run_interactive(&self) -> Result<()> {
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(e))?;

        let status = ExitKind::from_status(status);
        if status != ExitKind::Code(0) {
            return Err(self.failure(status, None));
        }
        Ok(())
    }

    /// Spawn with stdout and stderr merged into one pipe.
    ///
    /// A reader thread splits the stream into lines, records them and hands
    /// each one to `on_line` in emission order.
    pub fn spawn_merged<F>(&self, on_line: F) -> Result<RunningCommand>
    where
        F: FnMut(&str) + Send + 'static,
    {
        debug!("Spawning: {}", self.display());
        let (reader, writer) = io::pipe()?;
        let mut command = self.command();
        command
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);

        let child = command.spawn().map_err(|e| self.spawn_error(e))?;
        // The Command still holds our copies of the write end; the reader only
        // sees end-of-stream once they are gone.
        drop(command);

        let lines = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();
        let reader_lines = Arc::clone(&lines);
        let handle = thread::spawn(move || {
            let mut on_line = on_line;
            let result = read_lines(reader, |line| {
                on_line(&line);
                if let Ok(mut lines) = reader_lines.lock() {
                    lines.push(line);
                }
            });
            if let Err(e) = result {
                debug!("Output reader stopped: {}", e);
            }
            let _ = done_tx.send(());
        });

        Ok(RunningCommand {
            cmd: self.clone(),
            child,
            lines,
            done: done_rx,
            reader: Some(handle),
        })
    }
}

/// A spawned command whose merged output is being drained.
pub struct RunningCommand {
    cmd: Cmd,
    child: Child,
    lines: Arc<Mutex<Vec<String>>>,
    done: Receiver<()>,
    reader: Option<JoinHandle<()>>,
}

/// Exit status and every output line of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub argv: Vec<String>,
    pub status: ExitKind,
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == ExitKind::Code(0)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`].
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.success() {
            return Ok(self.lines);
        }
        let text = self.text();
        Err(Error::CommandFailed {
            argv: self.argv,
            status: self.status,
            output: (!text.is_empty()).then_some(text),
            reported: false,
        })
    }
}

impl RunningCommand {
    /// Block until the process exits, then drain what is left of its output.
    pub fn wait(mut self) -> Result<CommandOutput> {
        let status = ExitKind::from_status(self.child.wait()?);
        if let Some(reader) = self.reader.take() {
            drain_remaining(&self.done, reader, DRAIN_TIMEOUT);
        }
        let lines = match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(CommandOutput {
            argv: self.cmd.argv(),
            status,
            lines,
        })
    }
}

/// Give the reader up to `timeout` to reach end-of-stream.
///
/// Returns false if it is still blocked (for example when a grandchild kept
/// the pipe open); the lines read so far are used as-is.
pub fn drain_remaining(done: &Receiver<()>, reader: JoinHandle<()>, timeout: Duration) -> bool {
    match done.recv_timeout(timeout) {
        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
            let _ = reader.join();
            true
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            debug!("Output reader still busy after {:?}, continuing", timeout);
            false
        }
    }
}

/// Read a stream, splitting on `\n` and `\r` and skipping blank lines.
///
/// Lines are handed out as soon as their terminator arrives, so a status a
/// tool redraws with `\r` is seen without waiting for the next newline.
pub fn read_lines<R: Read>(mut reader: R, mut on_line: impl FnMut(String)) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &chunk[..read] {
            if byte == b'\n' || byte == b'\r' {
                emit_line(&pending, &mut on_line);
                pending.clear();
            } else {
                pending.push(byte);
            }
        }
    }
    emit_line(&pending, &mut on_line);
    Ok(())
}

fn emit_line(raw: &[u8], on_line: &mut impl FnMut(String)) {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if !line.is_empty() {
        on_line(line.to_string());
    }
}

/// Locate a program on PATH.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}
