use super::ToolCommand;
use crate::config::{GuideTrust, KmerLadder};
use crate::error::{Result, SeedError};
use std::path::{Path, PathBuf};

/// Name of the contig file SPAdes writes into its output directory.
pub const CONTIGS_FILE: &str = "contigs.fasta";

/// Which SPAdes pipeline to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblyMode {
    /// Per-region seeding: assembler only, coverage cutoff off.
    Preliminary,
    /// Whole-library assembly with coverage correction.
    Final,
}

/// How read files are presented to the assembler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblerReads {
    /// One flattened pool of reads.
    Single(PathBuf),
    /// A paired library with optional singletons.
    Paired {
        forward: PathBuf,
        reverse: PathBuf,
        singles: Option<PathBuf>,
    },
}

impl AssemblerReads {
    pub fn files(&self) -> Vec<&Path> {
        match self {
            AssemblerReads::Single(s) => vec![s.as_path()],
            AssemblerReads::Paired {
                forward,
                reverse,
                singles,
            } => {
                let mut files = vec![forward.as_path(), reverse.as_path()];
                if let Some(s) = singles {
                    files.push(s.as_path());
                }
                files
            }
        }
    }

    fn push_args(&self, mut cmd: ToolCommand) -> ToolCommand {
        match self {
            AssemblerReads::Single(s) => cmd.arg("--pe1-s").arg(s),
            AssemblerReads::Paired {
                forward,
                reverse,
                singles,
            } => {
                cmd = cmd.arg("--pe1-1").arg(forward).arg("--pe1-2").arg(reverse);
                if let Some(s) = singles {
                    cmd = cmd.arg("--pe1-s").arg(s);
                }
                cmd
            }
        }
    }
}

/// Builder for a SPAdes invocation.
#[derive(Clone, Debug)]
pub struct Spades {
    exe: PathBuf,
    mode: AssemblyMode,
    kmers: Option<KmerLadder>,
    reads: Option<AssemblerReads>,
    guide: Option<(GuideTrust, PathBuf)>,
    threads: usize,
    output_dir: Option<PathBuf>,
}

impl Spades {
    pub fn new(exe: impl AsRef<Path>, mode: AssemblyMode) -> Self {
        Spades {
            exe: exe.as_ref().to_path_buf(),
            mode,
            kmers: None,
            reads: None,
            guide: None,
            threads: 1,
            output_dir: None,
        }
    }

    pub fn kmers(mut self, kmers: &KmerLadder) -> Self {
        self.kmers = Some(kmers.clone());
        self
    }

    pub fn reads(mut self, reads: AssemblerReads) -> Self {
        self.reads = Some(reads);
        self
    }

    pub fn guide(mut self, guide: Option<(GuideTrust, PathBuf)>) -> Self {
        self.guide = guide;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Validate the required fields and produce the command.
    pub fn build(self) -> Result<ToolCommand> {
        let kmers = self
            .kmers
            .ok_or_else(|| SeedError::config("assembler k-mer ladder not set"))?;
        let reads = self
            .reads
            .ok_or_else(|| SeedError::config("assembler reads not set"))?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| SeedError::config("assembler output directory not set"))?;

        let mut cmd = ToolCommand::new(&self.exe);
        cmd = match self.mode {
            AssemblyMode::Preliminary => {
                cmd.args(["--only-assembler", "--cov-cutoff", "off", "--sc", "--careful"])
            }
            AssemblyMode::Final => cmd.arg("--careful"),
        };
        cmd = cmd
            .arg("-k")
            .arg(kmers.to_string())
            .arg("-t")
            .arg(self.threads.to_string());
        cmd = reads.push_args(cmd);
        if let Some((trust, contig)) = &self.guide {
            cmd = cmd.arg(trust.flag()).arg(contig);
        }
        Ok(cmd.arg("-o").arg(&output_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preliminary_single_with_trusted_seed() {
        let ladder = KmerLadder::parse("21,33").unwrap();
        let cmd = Spades::new("spades.py", AssemblyMode::Preliminary)
            .kmers(&ladder)
            .reads(AssemblerReads::Single(PathBuf::from("reads.fq")))
            .guide(Some((GuideTrust::Trusted, PathBuf::from("seed.fa"))))
            .output_dir("asm")
            .build()
            .unwrap();
        assert_eq!(
            cmd.arg_strings(),
            vec![
                "--only-assembler",
                "--cov-cutoff",
                "off",
                "--sc",
                "--careful",
                "-k",
                "21,33",
                "-t",
                "1",
                "--pe1-s",
                "reads.fq",
                "--trusted-contigs",
                "seed.fa",
                "-o",
                "asm"
            ]
        );
    }

    #[test]
    fn test_final_paired_with_singletons() {
        let ladder = KmerLadder::parse("21,33,55").unwrap();
        let reads = AssemblerReads::Paired {
            forward: PathBuf::from("f.fq"),
            reverse: PathBuf::from("r.fq"),
            singles: Some(PathBuf::from("s.fq")),
        };
        assert_eq!(reads.files().len(), 3);
        let cmd = Spades::new("spades.py", AssemblyMode::Final)
            .kmers(&ladder)
            .reads(reads)
            .threads(8)
            .output_dir("final")
            .build()
            .unwrap();
        let args = cmd.arg_strings();
        assert_eq!(args[0], "--careful");
        assert!(!args.contains(&"--only-assembler".to_string()));
        assert!(args.windows(2).any(|w| w == ["--pe1-1", "f.fq"]));
        assert!(args.windows(2).any(|w| w == ["--pe1-s", "s.fq"]));
        assert!(args.windows(2).any(|w| w == ["-t", "8"]));
    }

    #[test]
    fn test_build_requires_reads() {
        let ladder = KmerLadder::parse("21").unwrap();
        let result = Spades::new("spades.py", AssemblyMode::Final)
            .kmers(&ladder)
            .output_dir("x")
            .build();
        assert!(matches!(result, Err(SeedError::Configuration(_))));
    }
}
