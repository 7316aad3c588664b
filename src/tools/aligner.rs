use super::ToolCommand;
use crate::config::MapperMethod;
use crate::error::{Result, SeedError};
use std::path::{Path, PathBuf};

/// Reads handed to one aligner invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlignerReads<'a> {
    Paired { forward: &'a Path, reverse: &'a Path },
    Single(&'a Path),
}

/// A short-read aligner that writes SAM.
#[derive(Clone, Debug)]
pub enum Aligner {
    Bwa {
        exe: PathBuf,
    },
    Smalt {
        exe: PathBuf,
        scoring: String,
        /// Insert-size distribution sampled from the master library.
        distances: Option<PathBuf>,
    },
}

impl Aligner {
    pub fn new(
        method: MapperMethod,
        exe: impl AsRef<Path>,
        scoring: &str,
        distances: Option<PathBuf>,
    ) -> Self {
        match method {
            MapperMethod::Bwa => Aligner::Bwa {
                exe: exe.as_ref().to_path_buf(),
            },
            MapperMethod::Smalt => Aligner::Smalt {
                exe: exe.as_ref().to_path_buf(),
                scoring: scoring.to_string(),
                distances,
            },
        }
    }

    /// Attach an insert-size distribution; a no-op for BWA.
    pub fn with_distances(self, path: PathBuf) -> Self {
        match self {
            Aligner::Smalt { exe, scoring, .. } => Aligner::Smalt {
                exe,
                scoring,
                distances: Some(path),
            },
            bwa => bwa,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aligner::Bwa { .. } => "BWA",
            Aligner::Smalt { .. } => "SMALT",
        }
    }

    /// Index `reference` in place (the index lives next to the FASTA).
    pub fn index(&self, reference: &Path) -> ToolCommand {
        match self {
            Aligner::Bwa { exe } => ToolCommand::new(exe).arg("index").arg(reference),
            Aligner::Smalt { exe, .. } => ToolCommand::new(exe)
                .args(["index", "-k", "5", "-s", "3"])
                .arg(reference)
                .arg(reference),
        }
    }

    /// Map `reads` against an indexed `reference`, writing SAM to `output`.
    pub fn map(
        &self,
        reference: &Path,
        reads: &AlignerReads<'_>,
        score_min: Option<i32>,
        cores: usize,
        output: &Path,
    ) -> Result<ToolCommand> {
        if let Some(min) = score_min {
            if min <= 0 {
                return Err(SeedError::config(format!(
                    "minimum alignment score must be positive, got {min}"
                )));
            }
        }
        let cmd = match self {
            Aligner::Bwa { exe } => {
                let mut cmd = ToolCommand::new(exe)
                    .arg("mem")
                    .arg("-t")
                    .arg(cores.max(1).to_string())
                    .args(["-L", "0,0", "-U", "0", "-k", "15"]);
                if let Some(min) = score_min {
                    cmd = cmd.arg("-T").arg(min.to_string());
                }
                cmd = cmd.arg("-o").arg(output).arg(reference);
                match reads {
                    AlignerReads::Paired { forward, reverse } => cmd.arg(forward).arg(reverse),
                    AlignerReads::Single(reads) => cmd.arg(reads),
                }
            }
            Aligner::Smalt {
                exe,
                scoring,
                distances,
            } => {
                let min = score_min.ok_or_else(|| {
                    SeedError::config("SMALT mapping requires a minimum alignment score")
                })?;
                let mut cmd = ToolCommand::new(exe).arg("map");
                if matches!(reads, AlignerReads::Paired { .. }) {
                    cmd = cmd.args(["-l", "pe"]);
                }
                cmd = cmd
                    .arg("-S")
                    .arg(scoring)
                    .arg("-m")
                    .arg(min.to_string())
                    .arg("-n")
                    .arg(cores.max(1).to_string());
                if let Some(dist) = distances {
                    cmd = cmd.arg("-g").arg(dist);
                }
                cmd = cmd.args(["-f", "sam", "-o"]).arg(output).arg(reference);
                match reads {
                    AlignerReads::Paired { forward, reverse } => cmd.arg(forward).arg(reverse),
                    AlignerReads::Single(reads) => cmd.arg(reads),
                }
            }
        };
        Ok(cmd)
    }

    /// Commands that sample insert sizes for SMALT; BWA needs none.
    pub fn distance_commands(
        &self,
        reference: &Path,
        forward: &Path,
        reverse: &Path,
        cores: usize,
        output: &Path,
    ) -> Vec<ToolCommand> {
        match self {
            Aligner::Bwa { .. } => Vec::new(),
            Aligner::Smalt { exe, .. } => vec![
                ToolCommand::new(exe)
                    .args(["index", "-k", "20", "-s", "10"])
                    .arg(output)
                    .arg(reference),
                ToolCommand::new(exe)
                    .arg("sample")
                    .arg("-n")
                    .arg(cores.max(1).to_string())
                    .arg("-o")
                    .arg(output)
                    .arg(output)
                    .arg(forward)
                    .arg(reverse),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bwa_paired_command() {
        let aligner = Aligner::new(MapperMethod::Bwa, "bwa", "", None);
        let reads = AlignerReads::Paired {
            forward: Path::new("r1.fq"),
            reverse: Path::new("r2.fq"),
        };
        let cmd = aligner
            .map(Path::new("ref.fa"), &reads, Some(75), 4, Path::new("out.sam"))
            .unwrap();
        assert_eq!(
            cmd.arg_strings(),
            vec![
                "mem", "-t", "4", "-L", "0,0", "-U", "0", "-k", "15", "-T", "75", "-o", "out.sam",
                "ref.fa", "r1.fq", "r2.fq"
            ]
        );
    }

    #[test]
    fn test_smalt_requires_score() {
        let aligner = Aligner::new(MapperMethod::Smalt, "smalt", "match=1", None);
        let reads = AlignerReads::Single(Path::new("s.fq"));
        assert!(aligner
            .map(Path::new("ref.fa"), &reads, None, 1, Path::new("out.sam"))
            .is_err());
        let cmd = aligner
            .map(Path::new("ref.fa"), &reads, Some(50), 1, Path::new("out.sam"))
            .unwrap();
        let args = cmd.arg_strings();
        assert!(!args.contains(&"pe".to_string()));
        assert_eq!(args.last().unwrap(), "s.fq");
    }

    #[test]
    fn test_rejects_non_positive_score() {
        let aligner = Aligner::new(MapperMethod::Bwa, "bwa", "", None);
        let reads = AlignerReads::Single(Path::new("s.fq"));
        assert!(aligner
            .map(Path::new("ref.fa"), &reads, Some(0), 1, Path::new("o.sam"))
            .is_err());
    }

    #[test]
    fn test_distance_commands_only_for_smalt() {
        let bwa = Aligner::new(MapperMethod::Bwa, "bwa", "", None);
        let smalt = Aligner::new(MapperMethod::Smalt, "smalt", "", None);
        let (r, f, o) = (Path::new("ref.fa"), Path::new("f.fq"), Path::new("dist"));
        assert!(bwa.distance_commands(r, f, f, 2, o).is_empty());
        assert_eq!(smalt.distance_commands(r, f, f, 2, o).len(), 2);

        let smalt = smalt.with_distances(PathBuf::from("dist"));
        let cmd = smalt
            .map(r, &AlignerReads::Paired { forward: f, reverse: f }, Some(10), 1, Path::new("o.sam"))
            .unwrap();
        assert!(cmd.arg_strings().windows(2).any(|w| w == ["-g", "dist"]));
    }
}
