//! Error taxonomy for the installer-disk workflow.
//!
//! Every failure the orchestrator has to reason about is an [`Error`]
//! variant. Callers decide on cleanup and reporting by matching
//! [`Error::kind`], never by downcasting.

use std::fmt;

use thiserror::Error;

/// How an external command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Process exited with this code.
    Code(i32),
    /// Process was killed by this signal.
    Signal(i32),
}

impl ExitKind {
    /// Build from a finished process status.
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitKind::Code(code),
            (None, Some(signal)) => ExitKind::Signal(signal),
            (None, None) => ExitKind::Code(-1),
        }
    }

    /// Numeric code; signals are reported negated.
    pub fn code(&self) -> i32 {
        match *self {
            ExitKind::Code(code) => code,
            ExitKind::Signal(signal) => -signal,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, ExitKind::Signal(_))
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit code {}", code),
            ExitKind::Signal(libc::SIGKILL) => write!(f, "killed by SIGKILL"),
            ExitKind::Signal(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

/// Discriminant of [`Error`], switched on by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CommandFailed,
    CommandNotFound,
    MetadataParseFailed,
    SizingInvalid,
    InstallationFailed,
    DiscoveryFailed,
    NoExternalDisk,
    Prompt,
    Io,
    Interrupted,
}

impl ErrorKind {
    /// Short label used in the fatal cause line.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::CommandFailed | ErrorKind::CommandNotFound => "Command error",
            ErrorKind::MetadataParseFailed => "Disk metadata error",
            ErrorKind::SizingInvalid => "Validation error",
            ErrorKind::InstallationFailed => "Installation error",
            ErrorKind::DiscoveryFailed => "Installer discovery error",
            ErrorKind::NoExternalDisk => "Disk selection error",
            ErrorKind::Prompt => "Terminal error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// External command exited unsuccessfully.
    #[error("command failed: {} ({status})", .argv.join(" "))]
    CommandFailed {
        argv: Vec<String>,
        status: ExitKind,
        /// Captured stdout and stderr, if the command was captured.
        output: Option<String>,
        /// Set when specialised guidance has already been printed for this failure.
        reported: bool,
    },

    #[error("command not found: {program}")]
    CommandNotFound { program: String },

    #[error("failed to parse disk metadata: {0}")]
    MetadataParseFailed(#[from] plist::Error),

    #[error(
        "partitions are too large for the disk: {needed_gb:.2} GB needed for the fixed partitions, {available_gb:.2} GB available",
        needed_gb = gb(.needed),
        available_gb = gb(.available)
    )]
    SizingInvalid { needed: u64, available: u64 },

    #[error("{installer}: {cause}")]
    InstallationFailed {
        installer: String,
        cause: String,
        /// Output of the media-creation tool, when it ran.
        output: Option<String>,
    },

    #[error("{0}")]
    DiscoveryFailed(String),

    #[error("no external disk found - connect a USB disk and try again")]
    NoExternalDisk,

    #[error("terminal interaction failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("interrupted by user")]
    Interrupted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CommandFailed { .. } => ErrorKind::CommandFailed,
            Error::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            Error::MetadataParseFailed(_) => ErrorKind::MetadataParseFailed,
            Error::SizingInvalid { .. } => ErrorKind::SizingInvalid,
            Error::InstallationFailed { .. } => ErrorKind::InstallationFailed,
            Error::DiscoveryFailed(_) => ErrorKind::DiscoveryFailed,
            Error::NoExternalDisk => ErrorKind::NoExternalDisk,
            Error::Prompt(_) => ErrorKind::Prompt,
            Error::Io(_) => ErrorKind::Io,
            Error::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub fn installation(installer: impl Into<String>, cause: impl Into<String>) -> Self {
        Error::InstallationFailed {
            installer: installer.into(),
            cause: cause.into(),
            output: None,
        }
    }

    /// Captured output of a failed command, if any.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed {
                output: Some(output),
                ..
            }
            | Error::InstallationFailed {
                output: Some(output),
                ..
            } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    /// True when detailed guidance for this failure was already printed.
    pub fn already_reported(&self) -> bool {
        matches!(self, Error::CommandFailed { reported: true, .. })
    }
}

fn gb(bytes: &u64) -> f64 {
    crate::size::to_gb(*bytes)
}

pub type Result<T> = std::result::Result<T, Error>;
