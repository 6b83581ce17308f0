//! Syntax highlighting through GNU `source-highlight`.
//!
//! Fenced code blocks with a language are piped through
//! `source-highlight -s <lang> -f html` and the tool's HTML replaces the
//! block body. The tool is optional: when it is not on `PATH`, or fails for a
//! particular language, the caller leaves that block empty and carries on.
//!
//! There is no timeout on the child process. A hung `source-highlight`
//! stalls the whole (single-threaded) generation pass.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// Name of the external highlighter binary.
pub const SOURCE_HIGHLIGHT: &str = "source-highlight";

#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("{SOURCE_HIGHLIGHT} not found on PATH")]
    NotInstalled,
    #[error("failed to run {SOURCE_HIGHLIGHT}: {0}")]
    Io(#[from] io::Error),
    #[error("{SOURCE_HIGHLIGHT} exited with {status} for language {language:?}: {stderr}")]
    Failed {
        language: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Turns source code into highlighted HTML.
pub trait Highlighter {
    fn highlight(&self, language: &str, source: &str) -> Result<String, HighlightError>;
}

/// Runs the external `source-highlight` tool.
#[derive(Debug, Clone)]
pub struct SourceHighlight {
    program: Option<PathBuf>,
}

impl SourceHighlight {
    /// Locate `source-highlight` on `PATH`. A missing tool is not an error
    /// here; every [`highlight`](Highlighter::highlight) call reports it.
    pub fn detect() -> Self {
        let program = which::which(SOURCE_HIGHLIGHT).ok();
        if program.is_none() {
            log::warn!("{SOURCE_HIGHLIGHT} not found on PATH, code blocks will not be highlighted");
        }
        Self { program }
    }

    /// Use an explicit binary (or none at all).
    pub fn with_program(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

impl Highlighter for SourceHighlight {
    fn highlight(&self, language: &str, source: &str) -> Result<String, HighlightError> {
        let program = self.program.as_ref().ok_or(HighlightError::NotInstalled)?;

        let mut child = Command::new(program)
            .args(["-s", language, "-f", "html"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from a separate thread so a large block can't deadlock
        // against a full stdout pipe.
        let mut stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "child stdin unavailable")
        })?;
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(source.as_bytes()));
            let output = child.wait_with_output();
            match writer.join() {
                Ok(Ok(())) => output,
                Ok(Err(e)) => Err(e),
                Err(_) => Err(io::Error::other("stdin writer panicked")),
            }
        })?;

        if !output.status.success() {
            return Err(HighlightError::Failed {
                language: language.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A highlighter that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHighlight;

impl Highlighter for NoHighlight {
    fn highlight(&self, _language: &str, _source: &str) -> Result<String, HighlightError> {
        Err(HighlightError::NotInstalled)
    }
}
