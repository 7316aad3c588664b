use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure of a single external-tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {program} ({command})")]
    Spawn {
        program: String,
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}\n  command: {command}\n  stderr: {stderr}")]
    Failed {
        program: String,
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} reported success but did not produce {}", path.display())]
    MissingOutput { program: String, path: PathBuf },
}

/// Run-level errors. Region-local assembly results are `Outcome` values, not errors.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("mapping failed in iteration {iteration}")]
    Mapping {
        iteration: usize,
        #[source]
        source: Box<SeedError>,
    },

    #[error("partitioning failed for region {region} in iteration {iteration}: {reason}")]
    Partition {
        region: usize,
        iteration: usize,
        reason: String,
    },

    #[error("cannot extract seed {sequence_id}:{start}-{end}: {reason}")]
    Seed {
        sequence_id: String,
        start: i64,
        end: i64,
        reason: String,
    },

    #[error("could not start the worker pool for {stage}")]
    WorkerPool {
        stage: String,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("no region had sufficient mapping in iteration {iteration}; every region was excluded")]
    NoActiveRegions { iteration: usize },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SeedError {
    pub fn config(msg: impl Into<String>) -> Self {
        SeedError::Configuration(msg.into())
    }

    pub fn mapping(iteration: usize, source: impl Into<SeedError>) -> Self {
        SeedError::Mapping {
            iteration,
            source: Box::new(source.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeedError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn chain(err: &dyn std::error::Error) -> Vec<String> {
        let mut lines = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            lines.push(cause.to_string());
            source = cause.source();
        }
        lines
    }

    #[test]
    fn test_error_chain_names_each_cause_once() {
        let spawn = ToolError::Spawn {
            program: "bwa".to_string(),
            command: "bwa index ref.fasta".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        let err = SeedError::mapping(0, spawn);
        let lines = chain(&err);
        assert_eq!(lines[0], "mapping failed in iteration 0");
        assert_eq!(
            lines.iter().filter(|l| l.contains("no such file")).count(),
            1,
            "{lines:?}"
        );
        assert_eq!(
            lines.iter().filter(|l| l.contains("failed to launch bwa")).count(),
            1
        );
        assert!(err.source().is_some());
    }
}
