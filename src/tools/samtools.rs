use super::ToolCommand;
use std::path::{Path, PathBuf};

/// Command builders for the samtools subcommands the loop relies on.
#[derive(Clone, Debug)]
pub struct Samtools {
    exe: PathBuf,
}

impl Samtools {
    pub fn new(exe: impl AsRef<Path>) -> Self {
        Samtools {
            exe: exe.as_ref().to_path_buf(),
        }
    }

    /// Coordinate-sort `input` (SAM or BAM) into a BAM at `output`.
    pub fn sort(&self, input: &Path, output: &Path, threads: usize) -> ToolCommand {
        ToolCommand::new(&self.exe)
            .arg("sort")
            .arg("-@")
            .arg(threads.saturating_sub(1).to_string())
            .arg("-o")
            .arg(output)
            .arg(input)
    }

    /// Merge any number of BAMs into `output`, overwriting it.
    pub fn merge(&self, output: &Path, inputs: &[&Path]) -> ToolCommand {
        ToolCommand::new(&self.exe)
            .args(["merge", "-f"])
            .arg(output)
            .args(inputs)
    }

    /// Flatten every read in `input` into a single FASTQ, ignoring pairing.
    pub fn fastq_single(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.exe)
            .arg("fastq")
            .arg(input)
            .stdout_to(output)
    }

    /// Group the records of `input` by read name so mates sit next to each other.
    pub fn collate(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.exe)
            .arg("collate")
            .arg("-o")
            .arg(output)
            .arg(input)
    }

    /// Split `input` into forward, reverse and singleton FASTQs.
    ///
    /// Mates are only paired when adjacent, so `input` must be grouped by name.
    pub fn fastq_paired(
        &self,
        input: &Path,
        forward: &Path,
        reverse: &Path,
        singles: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.exe)
            .arg("fastq")
            .arg("-1")
            .arg(forward)
            .arg("-2")
            .arg(reverse)
            .arg("-s")
            .arg(singles)
            .arg(input)
    }
}
