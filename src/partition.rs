use crate::config::Flank;
use crate::error::{Result, SeedError};
use crate::tools::samtools::Samtools;
use log::{debug, info};
use rust_htslib::bam::{self, index, Header, Read};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A region's extraction window for one iteration. 1-based, inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionWindow {
    pub region: usize,
    pub sequence_id: String,
    pub start: i64,
    pub end: i64,
    /// Where the region-local BAM goes.
    pub output_bam: PathBuf,
}

/// Mean depth over the 5' and 3' flank windows of a region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlankCoverage {
    pub upstream: f64,
    pub downstream: f64,
}

#[derive(Clone, Debug)]
pub struct RegionReads {
    pub region: usize,
    pub bam: PathBuf,
    pub records: usize,
    pub read_names: usize,
    pub coverage: Option<FlankCoverage>,
}

/// Everything partitioning produced for one iteration.
#[derive(Debug)]
pub struct PartitionOutput {
    pub sorted_bam: PathBuf,
    /// One entry per requested window, in request order.
    pub regions: Vec<(usize, Result<RegionReads>)>,
    /// Every read name claimed so far in the run.
    pub claimed: BTreeSet<String>,
    /// Whole-library records whose name is not claimed.
    pub unmapped_bam: PathBuf,
    pub unmapped_records: usize,
}

/// Splits a whole-library alignment into region-local and leftover subsets.
#[derive(Clone, Debug)]
pub struct PartitionStage {
    pub samtools: Samtools,
    pub cores: usize,
    /// Pull in the mate of every claimed read.
    pub paired_inference: bool,
    /// Extra margin when fetching, so soft-clipped overhangs are seen.
    pub read_len: usize,
    pub flank: Flank,
}

/// Does an alignment, widened by its soft clips, touch `[start, end]`?
///
/// `pos`/`end_pos` are 0-based half-open, the window is 1-based inclusive.
pub fn clipped_span_overlaps(
    pos: i64,
    end_pos: i64,
    leading_clip: i64,
    trailing_clip: i64,
    start: i64,
    end: i64,
) -> bool {
    let clipped_start = pos - leading_clip;
    let clipped_end = end_pos + trailing_clip;
    clipped_start < end && clipped_end > start - 1
}

/// Union of the previous claim set and this iteration's names.
pub fn accumulate_claims<I>(previous: &BTreeSet<String>, current: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    let mut claimed = previous.clone();
    claimed.extend(current);
    claimed
}

impl PartitionStage {
    pub fn partition(
        &self,
        combined_bam: &Path,
        windows: &[RegionWindow],
        previous_claims: &BTreeSet<String>,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<PartitionOutput> {
        fs::create_dir_all(work_dir)?;
        let sorted_bam = work_dir.join("combined_sorted.bam");
        self.samtools
            .sort(combined_bam, &sorted_bam, self.cores)
            .run()?;
        index::build(&sorted_bam, None, index::Type::Bai, self.cores.max(1) as u32)?;

        let mut regions = Vec::with_capacity(windows.len());
        let mut current = Vec::new();
        for window in windows {
            match self.extract_window(&sorted_bam, window, iteration) {
                Ok((reads, names)) => {
                    debug!(
                        "Region {}: {} record(s), {} read name(s) in {}:{}-{}",
                        window.region,
                        reads.records,
                        reads.read_names,
                        window.sequence_id,
                        window.start,
                        window.end
                    );
                    current.extend(names);
                    regions.push((window.region, Ok(reads)));
                }
                Err(e @ SeedError::Partition { .. }) => regions.push((window.region, Err(e))),
                Err(e) => {
                    regions.push((
                        window.region,
                        Err(SeedError::Partition {
                            region: window.region,
                            iteration,
                            reason: e.to_string(),
                        }),
                    ));
                }
            }
        }

        let claimed = accumulate_claims(previous_claims, current);

        let unmapped_bam = work_dir.join("unmapped.bam");
        let unmapped_records = write_unclaimed(&sorted_bam, &claimed, &unmapped_bam)?;
        info!(
            "Iteration {}: {} claimed read name(s), {} unclaimed record(s)",
            iteration,
            claimed.len(),
            unmapped_records
        );

        Ok(PartitionOutput {
            sorted_bam,
            regions,
            claimed,
            unmapped_bam,
            unmapped_records,
        })
    }

    fn extract_window(
        &self,
        sorted_bam: &Path,
        window: &RegionWindow,
        iteration: usize,
    ) -> Result<(RegionReads, FxHashSet<String>)> {
        let window_error = |reason: String| SeedError::Partition {
            region: window.region,
            iteration,
            reason,
        };
        if window.start < 1 || window.end < window.start {
            return Err(window_error(format!(
                "invalid window {}:{}-{}",
                window.sequence_id, window.start, window.end
            )));
        }
        if let Some(parent) = window.output_bam.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut reader = bam::IndexedReader::from_path(sorted_bam)?;
        let tid = reader
            .header()
            .tid(window.sequence_id.as_bytes())
            .ok_or_else(|| {
                window_error(format!(
                    "sequence '{}' is not in the alignment header",
                    window.sequence_id
                ))
            })?;
        let margin = self.read_len as i64;
        let fetch_start = (window.start - 1 - margin).max(0);
        let fetch_end = window.end + margin;
        reader.fetch((tid as i32, fetch_start, fetch_end))?;

        let header = Header::from_template(reader.header());
        let mut names = FxHashSet::default();
        let mut overlapping = Vec::new();
        for result in reader.records() {
            let record = result?;
            if record.is_unmapped() {
                continue;
            }
            let cigar = record.cigar();
            if clipped_span_overlaps(
                record.pos(),
                cigar.end_pos(),
                cigar.leading_softclips(),
                cigar.trailing_softclips(),
                window.start,
                window.end,
            ) {
                names.insert(String::from_utf8_lossy(record.qname()).into_owned());
                overlapping.push(record);
            }
        }

        let records = if self.paired_inference {
            copy_named_records(sorted_bam, &names, &window.output_bam)?
        } else {
            let mut writer = bam::Writer::from_path(&window.output_bam, &header, bam::Format::Bam)?;
            for record in &overlapping {
                writer.write(record)?;
            }
            overlapping.len()
        };

        let coverage = self.flank_coverage(sorted_bam, tid, window)?;
        Ok((
            RegionReads {
                region: window.region,
                bam: window.output_bam.clone(),
                records,
                read_names: names.len(),
                coverage,
            },
            names,
        ))
    }

    fn flank_coverage(
        &self,
        sorted_bam: &Path,
        tid: u32,
        window: &RegionWindow,
    ) -> Result<Option<FlankCoverage>> {
        if self.flank.upstream == 0 && self.flank.downstream == 0 {
            return Ok(None);
        }
        let up = (window.start, (window.start + self.flank.upstream - 1).min(window.end));
        let down = ((window.end - self.flank.downstream + 1).max(window.start), window.end);
        Ok(Some(FlankCoverage {
            upstream: mean_depth(sorted_bam, tid, up.0, up.1)?,
            downstream: mean_depth(sorted_bam, tid, down.0, down.1)?,
        }))
    }
}

/// Mean pileup depth over `[start, end]` (1-based, inclusive).
pub fn mean_depth(sorted_bam: &Path, tid: u32, start: i64, end: i64) -> Result<f64> {
    if end < start {
        return Ok(0.0);
    }
    let mut reader = bam::IndexedReader::from_path(sorted_bam)?;
    reader.fetch((tid as i32, start - 1, end))?;
    let mut total = 0u64;
    for pileup in reader.pileup() {
        let pileup = pileup?;
        let pos = pileup.pos() as i64 + 1;
        if pos >= start && pos <= end {
            total += pileup.depth() as u64;
        }
    }
    Ok(total as f64 / (end - start + 1) as f64)
}

/// Copy every record of `input` whose name is in `names`.
fn copy_named_records(input: &Path, names: &FxHashSet<String>, output: &Path) -> Result<usize> {
    let mut reader = bam::Reader::from_path(input)?;
    let header = Header::from_template(reader.header());
    let mut writer = bam::Writer::from_path(output, &header, bam::Format::Bam)?;
    let mut record = bam::Record::new();
    let mut written = 0;
    while let Some(result) = reader.read(&mut record) {
        result?;
        if names.contains(String::from_utf8_lossy(record.qname()).as_ref()) {
            writer.write(&record)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Write every record of `input` whose name is not claimed. Exact name match.
pub fn write_unclaimed(input: &Path, claimed: &BTreeSet<String>, output: &Path) -> Result<usize> {
    let exclude: FxHashSet<&str> = claimed.iter().map(String::as_str).collect();
    let mut reader = bam::Reader::from_path(input)?;
    let header = Header::from_template(reader.header());
    let mut writer = bam::Writer::from_path(output, &header, bam::Format::Bam)?;
    let mut record = bam::Record::new();
    let mut written = 0;
    while let Some(result) = reader.read(&mut record) {
        result?;
        if !exclude.contains(String::from_utf8_lossy(record.qname()).as_ref()) {
            writer.write(&record)?;
            written += 1;
        }
    }
    Ok(written)
}
