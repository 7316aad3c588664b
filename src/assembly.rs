use crate::config::{GuideTrust, KmerLadder};
use crate::error::{Result, SeedError, ToolError};
use crate::reads::ReadLibrary;
use crate::tools::assembler::{AssemblerReads, AssemblyMode, Spades, CONTIGS_FILE};
use crate::tools::samtools::Samtools;
use crate::tools::is_nonempty_file;
use bio::io::fasta;
use log::{debug, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// First record of a FASTA file.
pub fn read_first_record(path: &Path) -> Result<fasta::Record> {
    let reader = fasta::Reader::new(File::open(path)?);
    match reader.records().next() {
        Some(record) => Ok(record?),
        None => Err(SeedError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no FASTA records in '{}'", path.display()),
        ))),
    }
}

/// Length of the first sequence in a FASTA file.
pub fn contig_length(path: &Path) -> Result<usize> {
    Ok(read_first_record(path)?.seq().len())
}

/// Keep only the longest record of `contigs`, renamed to `name`, in `output`.
///
/// Returns its length, or `None` when `contigs` holds no sequence.
pub fn keep_longest_contig(contigs: &Path, output: &Path, name: &str) -> Result<Option<usize>> {
    let reader = fasta::Reader::new(File::open(contigs)?);
    let mut best: Option<fasta::Record> = None;
    for record in reader.records() {
        let record = record?;
        if best.as_ref().map_or(true, |b| record.seq().len() > b.seq().len()) {
            best = Some(record);
        }
    }
    let Some(best) = best.filter(|b| !b.seq().is_empty()) else {
        return Ok(None);
    };
    let mut writer = fasta::Writer::to_file(output)?;
    writer.write(name, None, best.seq())?;
    writer.flush()?;
    Ok(Some(best.seq().len()))
}

/// What came out of one region's local reassembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyResult {
    /// No reads were available, so the assembler was not called.
    Skipped(String),
    /// The assembler ran but left no usable contig file.
    NoOutput,
    /// The longest contig, renamed, and its length.
    Assembled { contig: PathBuf, length: usize },
}

/// Per-region reassembly and the whole-library final assemblies.
#[derive(Clone, Debug)]
pub struct AssemblyStage {
    pub spades: PathBuf,
    pub samtools: Samtools,
    pub pre_kmers: KmerLadder,
    pub kmers: KmerLadder,
    pub threads: usize,
}

impl AssemblyStage {
    /// Turn a region BAM into reads and assemble them guided by `seed`.
    ///
    /// With `single_lib` every read goes into one unpaired pool.
    pub fn assemble_region(
        &self,
        region_bam: &Path,
        seed: &Path,
        work_dir: &Path,
        contig_name: &str,
        single_lib: bool,
    ) -> Result<AssemblyResult> {
        fs::create_dir_all(work_dir)?;
        let Some(reads) = self.extract_reads(region_bam, work_dir, single_lib)? else {
            return Ok(AssemblyResult::Skipped(format!(
                "no reads extracted from {}",
                region_bam.display()
            )));
        };

        let asm_dir = work_dir.join("assembly");
        let cmd = Spades::new(&self.spades, AssemblyMode::Preliminary)
            .kmers(&self.pre_kmers)
            .reads(reads)
            .guide(Some((GuideTrust::Trusted, seed.to_path_buf())))
            .threads(self.threads)
            .output_dir(&asm_dir)
            .build()?;
        run_assembler(&cmd)?;

        let produced = asm_dir.join(CONTIGS_FILE);
        if !is_nonempty_file(&produced) {
            return Ok(AssemblyResult::NoOutput);
        }
        let contig = work_dir.join(format!("{contig_name}.fasta"));
        match keep_longest_contig(&produced, &contig, contig_name)? {
            Some(length) => Ok(AssemblyResult::Assembled { contig, length }),
            None => Ok(AssemblyResult::NoOutput),
        }
    }

    fn extract_reads(
        &self,
        region_bam: &Path,
        work_dir: &Path,
        single_lib: bool,
    ) -> Result<Option<AssemblerReads>> {
        if single_lib {
            let singles = work_dir.join("mapped_reads.fastq");
            self.samtools.fastq_single(region_bam, &singles).run()?;
            return Ok(is_nonempty_file(&singles).then_some(AssemblerReads::Single(singles)));
        }

        let collated = work_dir.join("mapped_collated.bam");
        self.samtools.collate(region_bam, &collated).run()?;
        let forward = work_dir.join("mapped_readF.fastq");
        let reverse = work_dir.join("mapped_readR.fastq");
        let singles = work_dir.join("mapped_readS.fastq");
        self.samtools
            .fastq_paired(&collated, &forward, &reverse, &singles)
            .run()?;
        let has_pairs = is_nonempty_file(&forward) && is_nonempty_file(&reverse);
        let has_singles = is_nonempty_file(&singles);
        Ok(match (has_pairs, has_singles) {
            (true, _) => Some(AssemblerReads::Paired {
                forward,
                reverse,
                singles: has_singles.then_some(singles),
            }),
            (false, true) => Some(AssemblerReads::Single(singles)),
            (false, false) => None,
        })
    }

    /// Assemble the whole master library with the final k-mer ladder.
    ///
    /// Returns the contig file, or `None` when the assembler left nothing.
    pub fn assemble_library(
        &self,
        library: &ReadLibrary,
        guide: Option<(GuideTrust, PathBuf)>,
        threads: usize,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let reads = match (&library.forward, &library.reverse, &library.singletons) {
            (Some(f), Some(r), s) => AssemblerReads::Paired {
                forward: f.clone(),
                reverse: r.clone(),
                singles: s.clone(),
            },
            (_, _, Some(s)) => AssemblerReads::Single(s.clone()),
            _ => {
                return Err(SeedError::config(format!(
                    "read library '{}' has no usable read files",
                    library.name
                )))
            }
        };
        if let Some(missing) = reads.files().into_iter().find(|p| !is_nonempty_file(p)) {
            warn!(
                "Skipping assembly in {}: input {} is missing or empty",
                output_dir.display(),
                missing.display()
            );
            return Ok(None);
        }
        let cmd = Spades::new(&self.spades, AssemblyMode::Final)
            .kmers(&self.kmers)
            .reads(reads)
            .guide(guide)
            .threads(threads)
            .output_dir(output_dir)
            .build()?;
        run_assembler(&cmd)?;
        let contigs = output_dir.join(CONTIGS_FILE);
        Ok(is_nonempty_file(&contigs).then_some(contigs))
    }
}

/// Success is judged by the contig file, so a non-zero exit is only logged.
fn run_assembler(cmd: &crate::tools::ToolCommand) -> Result<()> {
    match cmd.run() {
        Ok(_) => Ok(()),
        Err(ToolError::Failed { status, stderr, .. }) => {
            debug!("{} exited with {}: {}", cmd.program_name(), status, stderr);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_keep_longest_contig_renames() {
        let dir = TempDir::new().unwrap();
        let contigs = dir.path().join("contigs.fasta");
        fs::write(
            &contigs,
            ">NODE_1\nACGT\n>NODE_2\nACGTACGTAC\n>NODE_3\nACG\n",
        )
        .unwrap();
        let out = dir.path().join("best.fasta");
        let len = keep_longest_contig(&contigs, &out, "NC_1_cluster_0").unwrap();
        assert_eq!(len, Some(10));
        let record = read_first_record(&out).unwrap();
        assert_eq!(record.id(), "NC_1_cluster_0");
        assert_eq!(record.seq(), b"ACGTACGTAC");
        assert_eq!(contig_length(&out).unwrap(), 10);
    }

    #[test]
    fn test_keep_longest_contig_empty_file() {
        let dir = TempDir::new().unwrap();
        let contigs = dir.path().join("contigs.fasta");
        fs::write(&contigs, "").unwrap();
        let out = dir.path().join("best.fasta");
        assert_eq!(keep_longest_contig(&contigs, &out, "x").unwrap(), None);
        assert!(!out.exists());
    }

    #[test]
    fn test_read_first_record_errors_on_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.fasta");
        fs::write(&path, "").unwrap();
        assert!(read_first_record(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_assemble_region_skips_when_no_reads() {
        // `true` stands in for samtools: it succeeds without writing anything.
        let dir = TempDir::new().unwrap();
        let stage = AssemblyStage {
            spades: PathBuf::from("spades-not-installed"),
            samtools: Samtools::new("true"),
            pre_kmers: KmerLadder::parse("21,33").unwrap(),
            kmers: KmerLadder::parse("21,33,55").unwrap(),
            threads: 1,
        };
        let result = stage
            .assemble_region(
                Path::new("region.bam"),
                Path::new("seed.fasta"),
                &dir.path().join("work"),
                "NC_1_cluster_0",
                true,
            )
            .unwrap();
        assert!(matches!(result, AssemblyResult::Skipped(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_paired_extraction_collates_before_fastq() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let fake = dir.path().join("samtools");
        fs::write(
            &fake,
            format!("#!/bin/sh\necho \"$*\" >> {}\n", log.display()),
        )
        .unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        let stage = AssemblyStage {
            spades: PathBuf::from("spades-not-installed"),
            samtools: Samtools::new(&fake),
            pre_kmers: KmerLadder::parse("21,33").unwrap(),
            kmers: KmerLadder::parse("21,33,55").unwrap(),
            threads: 1,
        };
        let work = dir.path().join("work");
        let result = stage
            .assemble_region(
                Path::new("region.bam"),
                Path::new("seed.fasta"),
                &work,
                "NC_1_cluster_0",
                false,
            )
            .unwrap();
        assert!(matches!(result, AssemblyResult::Skipped(_)));

        let calls = fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        let collated = work.join("mapped_collated.bam");
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            format!("collate -o {} region.bam", collated.display())
        );
        assert!(calls[1].starts_with("fastq -1 "));
        assert!(calls[1].ends_with(&collated.display().to_string()));
    }
}
