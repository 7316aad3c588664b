use crate::error::{Result, SeedError, ToolError};
use crate::reads::ReadLibrary;
use crate::tools::aligner::{Aligner, AlignerReads};
use crate::tools::samtools::Samtools;
use crate::tools::is_nonempty_file;
use bio::io::fasta;
use log::{debug, info};
use rust_htslib::bam::{self, Header, HeaderView};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Minimum alignment score for an iteration: `read_len * (1 - 1/(2 + iteration))`.
///
/// Later iterations map against longer seeds, so they demand closer matches.
pub fn score_minimum(read_len: usize, iteration: usize) -> i32 {
    let factor = 1.0 - 1.0 / (2.0 + iteration as f64);
    (read_len as f64 * factor) as i32
}

/// Files produced by one whole-library mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingOutput {
    /// Paired and singleton alignments merged into one BAM.
    pub combined_bam: PathBuf,
    /// Intermediate SAM/BAM files, safe to purge once the iteration is done.
    pub intermediates: Vec<PathBuf>,
}

/// Maps a read library against a reference and merges the results.
#[derive(Clone, Debug)]
pub struct MappingStage {
    pub aligner: Aligner,
    pub samtools: Samtools,
    pub cores: usize,
}

impl MappingStage {
    /// Map `library` against `reference`, writing into `work_dir`.
    ///
    /// Any failure in the index/map/sort/merge chain is a mapping failure for `iteration`.
    pub fn map(
        &self,
        library: &ReadLibrary,
        reference: &Path,
        score_min: Option<i32>,
        ignore_singletons: bool,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<MappingOutput> {
        self.map_inner(library, reference, score_min, ignore_singletons, work_dir)
            .map_err(|e| SeedError::mapping(iteration, e))
    }

    fn map_inner(
        &self,
        library: &ReadLibrary,
        reference: &Path,
        score_min: Option<i32>,
        ignore_singletons: bool,
        work_dir: &Path,
    ) -> Result<MappingOutput> {
        fs::create_dir_all(work_dir)?;
        let library = library.without_empty_files().ok_or_else(|| {
            SeedError::config(format!(
                "read library '{}' has no non-empty read files left to map",
                library.name
            ))
        })?;

        info!(
            "Mapping {} reads against {} with {}",
            library.name,
            reference.display(),
            self.aligner.name()
        );
        self.aligner.index(reference).run()?;

        let mut intermediates = Vec::new();
        let paired_bam = work_dir.join("paired_mapping.bam");
        match (&library.forward, &library.reverse) {
            (Some(forward), Some(reverse)) => {
                let sam = work_dir.join("paired_mapping.sam");
                let reads = AlignerReads::Paired { forward, reverse };
                self.align_and_sort(reference, &reads, score_min, &sam, &paired_bam)?;
                intermediates.push(sam);
            }
            _ => write_placeholder_bam(reference, &paired_bam)?,
        }
        intermediates.push(paired_bam.clone());

        let singles_bam = work_dir.join("singles_mapping.bam");
        match &library.singletons {
            Some(singles) if !ignore_singletons => {
                let sam = work_dir.join("singles_mapping.sam");
                let reads = AlignerReads::Single(singles);
                self.align_and_sort(reference, &reads, score_min, &sam, &singles_bam)?;
                intermediates.push(sam);
            }
            _ => write_placeholder_bam(reference, &singles_bam)?,
        }
        intermediates.push(singles_bam.clone());

        let combined_bam = work_dir.join("combined_mapping.bam");
        self.samtools
            .merge(&combined_bam, &[&paired_bam, &singles_bam])
            .run()?;
        if !combined_bam.exists() {
            return Err(ToolError::MissingOutput {
                program: "samtools merge".to_string(),
                path: combined_bam,
            }
            .into());
        }
        Ok(MappingOutput {
            combined_bam,
            intermediates,
        })
    }

    fn align_and_sort(
        &self,
        reference: &Path,
        reads: &AlignerReads<'_>,
        score_min: Option<i32>,
        sam: &Path,
        bam: &Path,
    ) -> Result<()> {
        self.aligner
            .map(reference, reads, score_min, self.cores, sam)?
            .run()?;
        if !is_nonempty_file(sam) {
            return Err(ToolError::MissingOutput {
                program: self.aligner.name().to_string(),
                path: sam.to_path_buf(),
            }
            .into());
        }
        self.samtools.sort(sam, bam, self.cores).run()?;
        Ok(())
    }

    /// Sample insert sizes from the paired master library, for aligners that use them.
    pub fn estimate_distances(
        &self,
        library: &ReadLibrary,
        reference: &Path,
        output: &Path,
    ) -> Result<Option<PathBuf>> {
        let (Some(forward), Some(reverse)) = (&library.forward, &library.reverse) else {
            return Ok(None);
        };
        let cmds = self
            .aligner
            .distance_commands(reference, forward, reverse, self.cores, output);
        if cmds.is_empty() {
            return Ok(None);
        }
        for cmd in &cmds {
            cmd.run()?;
        }
        debug!("Insert size distribution written to {}", output.display());
        Ok(Some(output.to_path_buf()))
    }
}

/// SAM header text with one `@SQ` line per record of a FASTA reference.
pub fn header_text_for_reference(reference: &Path) -> Result<String> {
    let reader = fasta::Reader::new(File::open(reference)?);
    let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n");
    for record in reader.records() {
        let record = record?;
        text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", record.id(), record.seq().len()));
    }
    Ok(text)
}

/// A valid BAM with the reference's header and no records.
pub fn write_placeholder_bam(reference: &Path, output: &Path) -> Result<()> {
    let text = header_text_for_reference(reference)?;
    let view = HeaderView::from_bytes(text.as_bytes());
    let header = Header::from_template(&view);
    let writer = bam::Writer::from_path(output, &header, bam::Format::Bam)?;
    drop(writer);
    debug!("Wrote placeholder alignment {}", output.display());
    Ok(())
}
