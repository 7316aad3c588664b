use crate::config::LengthTarget;
use crate::tools::is_nonempty_file;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// A contig more than this many times the seed is treated as an artifact.
pub const OVERSIZE_FACTOR: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Met the configured length target.
    TargetReached,
    /// Grew by less than the minimum delta since the previous iteration.
    Plateau,
    /// Shorter than the minimum assembly length but short contigs are allowed.
    ShortAccepted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeReason {
    TooShort,
    Oversized,
    /// Read extraction for the region failed.
    PartitionFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalReason {
    /// The assembler produced no contig file, or an empty one.
    NoOutput,
    /// The assembler could not be run.
    ToolFailed,
}

/// Result of evaluating one region after one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Continue,
    Stop(StopReason),
    Exclude(ExcludeReason),
    Fatal(FatalReason),
}

impl Outcome {
    /// Numeric decision code: 0 continue, 1 stop, 2 exclude, 3 failure.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Continue => 0,
            Outcome::Stop(_) => 1,
            Outcome::Exclude(_) => 2,
            Outcome::Fatal(_) => 3,
        }
    }

    pub fn keep_contig(&self) -> bool {
        matches!(self, Outcome::Continue | Outcome::Stop(_))
    }

    pub fn continue_iterating(&self) -> bool {
        matches!(self, Outcome::Continue)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::TargetReached => "target length reached",
            StopReason::Plateau => "growth plateaued",
            StopReason::ShortAccepted => "short contig kept",
        })
    }
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExcludeReason::TooShort => "contig shorter than minimum assembly length",
            ExcludeReason::Oversized => "contig more than three times the seed length",
            ExcludeReason::PartitionFailed => "read extraction failed",
        })
    }
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FatalReason::NoOutput => "assembler produced no usable contigs",
            FatalReason::ToolFailed => "assembler could not be run",
        })
    }
}

/// Thresholds for judging growth.
#[derive(Clone, Copy, Debug)]
pub struct GrowthEvaluator {
    pub min_assembly_len: usize,
    pub min_delta: usize,
    pub include_short_contigs: bool,
    pub target: Option<LengthTarget>,
}

/// Lengths describing one region's result in one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrowthInput {
    pub iteration: usize,
    /// Length of the seed the assembly was guided by.
    pub seed_len: usize,
    /// Length of the region's iteration-0 seed, the baseline for fractional targets.
    pub initial_seed_len: usize,
    /// `None` when no contig file was produced or it was empty.
    pub contig_len: Option<usize>,
}

impl GrowthEvaluator {
    /// Classify the result. Pure: the same input always yields the same outcome.
    pub fn evaluate(&self, input: &GrowthInput) -> Outcome {
        let contig_len = match input.contig_len {
            Some(len) if len > 0 => len,
            _ => return Outcome::Fatal(FatalReason::NoOutput),
        };
        if contig_len > OVERSIZE_FACTOR * input.seed_len {
            return Outcome::Exclude(ExcludeReason::Oversized);
        }
        if contig_len < self.min_assembly_len {
            return if self.include_short_contigs {
                Outcome::Stop(StopReason::ShortAccepted)
            } else {
                Outcome::Exclude(ExcludeReason::TooShort)
            };
        }
        if let Some(target) = self.target {
            if contig_len >= target.resolve(input.initial_seed_len) {
                return Outcome::Stop(StopReason::TargetReached);
            }
        }
        if input.iteration != 0 && contig_len.abs_diff(input.seed_len) < self.min_delta {
            return Outcome::Stop(StopReason::Plateau);
        }
        Outcome::Continue
    }

    /// Like `evaluate`, reading the contig length from a FASTA on disk.
    pub fn evaluate_file(&self, contig: &Path, input: GrowthInput) -> Outcome {
        let contig_len = if is_nonempty_file(contig) {
            crate::assembly::contig_length(contig).ok()
        } else {
            None
        };
        self.evaluate(&GrowthInput {
            contig_len,
            ..input
        })
    }
}
