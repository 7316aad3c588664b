// Typed builders for the external tools the seeding loop drives.
//
// Every builder produces a `ToolCommand`; nothing here goes through a shell,
// so arguments are never re-split or interpolated.

pub mod aligner;
pub mod assembler;
pub mod samtools;

use crate::error::ToolError;
use log::debug;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// A fully specified external command, ready to run.
#[derive(Clone, Debug)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    stdout_path: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ToolCommand {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            stdout_path: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Send the command's stdout to `path` instead of discarding it.
    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Human-readable command line, for logs and diagnostics.
    pub fn render(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        if let Some(path) = &self.stdout_path {
            line.push_str(" > ");
            line.push_str(&path.display().to_string());
        }
        line
    }

    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Run to completion. A non-zero exit is an error carrying the captured stderr.
    pub fn run(&self) -> Result<ExitStatus, ToolError> {
        debug!("Running: {}", self.render());

        let spawn_err = |source| ToolError::Spawn {
            program: self.program_name(),
            command: self.render(),
            source,
        };

        let stdout = match &self.stdout_path {
            Some(path) => Stdio::from(File::create(path).map_err(spawn_err)?),
            None => Stdio::null(),
        };

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .output()
            .map_err(spawn_err)?;

        if output.status.success() {
            Ok(output.status)
        } else {
            Err(ToolError::Failed {
                program: self.program_name(),
                command: self.render(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// True when `path` exists and is non-empty.
pub fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_includes_redirect() {
        let cmd = ToolCommand::new("/usr/bin/samtools")
            .args(["fastq", "in.bam"])
            .stdout_to("out.fastq");
        assert_eq!(cmd.render(), "/usr/bin/samtools fastq in.bam > out.fastq");
        assert_eq!(cmd.program_name(), "samtools");
    }

    #[test]
    fn test_run_missing_program_is_spawn_error() {
        let cmd = ToolCommand::new("definitely-not-a-real-program-riboseed");
        assert!(matches!(cmd.run(), Err(ToolError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stderr_on_failure() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        match cmd.run() {
            Err(ToolError::Failed { stderr, status, .. }) => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_redirects_stdout() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        ToolCommand::new("sh")
            .args(["-c", "echo hello"])
            .stdout_to(&out)
            .run()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
        assert!(is_nonempty_file(&out));
        assert!(!is_nonempty_file(&dir.path().join("missing")));
    }
}
