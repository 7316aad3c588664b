use crate::error::{Result, SeedError};
use std::fmt;
use std::path::PathBuf;

/// Upstream/downstream margin added around a region before read extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flank {
    pub upstream: i64,
    pub downstream: i64,
}

impl Flank {
    pub fn symmetric(len: i64) -> Self {
        Flank {
            upstream: len,
            downstream: len,
        }
    }

    /// Parse `"1000"` or `"500:800"`.
    pub fn parse(s: &str) -> Result<Self> {
        let parse_one = |part: &str| -> Result<i64> {
            let value: i64 = part.trim().parse().map_err(|_| {
                SeedError::config(format!(
                    "invalid flanking length '{s}'; must be an integer or two colon-separated integers"
                ))
            })?;
            if value < 0 {
                return Err(SeedError::config(format!(
                    "flanking length cannot be negative: '{s}'"
                )));
            }
            Ok(value)
        };

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [both] => Ok(Flank::symmetric(parse_one(both)?)),
            [up, down] => Ok(Flank {
                upstream: parse_one(up)?,
                downstream: parse_one(down)?,
            }),
            _ => Err(SeedError::config(format!(
                "invalid flanking length '{s}'; must be an integer or two colon-separated integers"
            ))),
        }
    }
}

impl fmt::Display for Flank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.upstream, self.downstream)
    }
}

/// How far a region should grow before it stops iterating.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LengthTarget {
    /// Multiple of the iteration-0 seed length.
    Fraction(f64),
    /// Absolute length in bp.
    Absolute(usize),
}

impl LengthTarget {
    /// Values in (0, 5) are fractions of the seed, values above 50 are base pairs.
    pub fn from_value(value: f64) -> Result<Self> {
        if value > 0.0 && value < 5.0 {
            Ok(LengthTarget::Fraction(value))
        } else if value > 50.0 {
            Ok(LengthTarget::Absolute(value as usize))
        } else {
            Err(SeedError::config(format!(
                "invalid target length {value}; give a fraction of the seed length between 0 and 5, \
                 or an absolute number of base pairs greater than 50"
            )))
        }
    }

    pub fn resolve(&self, seed_len: usize) -> usize {
        match *self {
            LengthTarget::Fraction(frac) => (frac * seed_len as f64) as usize,
            LengthTarget::Absolute(bp) => bp,
        }
    }
}

/// Ordered list of k-mer sizes handed to the assembler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KmerLadder(Vec<u32>);

impl KmerLadder {
    pub fn parse(s: &str) -> Result<Self> {
        let mut kmers = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let k: u32 = part
                .parse()
                .map_err(|_| SeedError::config(format!("invalid k-mer '{part}' in '{s}'")))?;
            if k % 2 == 0 || !(11..=127).contains(&k) {
                return Err(SeedError::config(format!(
                    "k-mer sizes must be odd and between 11 and 127, got {k}"
                )));
            }
            if kmers.last().is_some_and(|&last| last >= k) {
                return Err(SeedError::config(format!(
                    "k-mer ladder must be strictly increasing: '{s}'"
                )));
            }
            kmers.push(k);
        }
        if kmers.is_empty() {
            return Err(SeedError::config("k-mer ladder is empty"));
        }
        Ok(KmerLadder(kmers))
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for KmerLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", joined.join(","))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapperMethod {
    Bwa,
    Smalt,
}

impl MapperMethod {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bwa" => Ok(MapperMethod::Bwa),
            "smalt" => Ok(MapperMethod::Smalt),
            other => Err(SeedError::config(format!(
                "unknown mapping method '{other}'; valid: bwa, smalt"
            ))),
        }
    }
}

/// How the assembler should treat a guide contig.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuideTrust {
    Trusted,
    Untrusted,
}

impl GuideTrust {
    /// `None` disables guide contigs entirely.
    pub fn parse(s: &str) -> Result<Option<Self>> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(None),
            "trusted" => Ok(Some(GuideTrust::Trusted)),
            "untrusted" => Ok(Some(GuideTrust::Untrusted)),
            other => Err(SeedError::config(format!(
                "unknown guide contig mode '{other}'; valid: none, trusted, untrusted"
            ))),
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            GuideTrust::Trusted => "--trusted-contigs",
            GuideTrust::Untrusted => "--untrusted-contigs",
        }
    }
}

/// Paths to the external executables.
#[derive(Clone, Debug)]
pub struct Executables {
    pub bwa: PathBuf,
    pub smalt: PathBuf,
    pub samtools: PathBuf,
    pub spades: PathBuf,
}

impl Default for Executables {
    fn default() -> Self {
        Executables {
            bwa: PathBuf::from("bwa"),
            smalt: PathBuf::from("smalt"),
            samtools: PathBuf::from("samtools"),
            spades: PathBuf::from("spades.py"),
        }
    }
}

/// Configuration for a seeding run.
#[derive(Clone, Debug)]
pub struct SeedConfig {
    /// Prefix for results files.
    pub experiment_name: String,
    pub output_root: PathBuf,
    pub flank: Flank,
    pub method: MapperMethod,
    /// Worker pool size.
    pub cores: usize,
    /// Threads per assembler process.
    pub threads: usize,
    /// Ladder for the final whole-library assembly.
    pub kmers: KmerLadder,
    /// Ladder for per-region seeding assemblies.
    pub pre_kmers: KmerLadder,
    pub ignore_singletons: bool,
    /// Fixed minimum alignment score; derived from read length when unset.
    pub score_min: Option<i32>,
    pub include_short_contigs: bool,
    pub min_assembly_len: usize,
    /// Minimum change in contig length between iterations.
    pub min_delta: usize,
    pub paired_inference: bool,
    /// Circular-origin handling pads each record by `padding` bp.
    pub circular: bool,
    pub padding: usize,
    /// Guide mode for the final de fere novo assembly.
    pub final_guide: Option<GuideTrust>,
    pub keep_temps: bool,
    pub skip_control: bool,
    pub max_iterations: usize,
    pub target_len: Option<LengthTarget>,
    /// Run per-region work in a plain loop instead of the worker pool.
    pub serialize: bool,
    pub smalt_scoring: String,
    /// Length of the `N` spacer between contigs in the faux genome.
    pub buffer_len: usize,
    pub exes: Executables,
}

impl Default for SeedConfig {
    fn default() -> Self {
        SeedConfig {
            experiment_name: "riboSeed".to_string(),
            output_root: PathBuf::from("riboSeed_output"),
            flank: Flank::symmetric(1000),
            method: MapperMethod::Bwa,
            cores: num_cpus::get(),
            threads: 1,
            kmers: KmerLadder(vec![21, 33, 55, 77, 99, 127]),
            pre_kmers: KmerLadder(vec![21, 33, 55, 77, 99]),
            ignore_singletons: false,
            score_min: None,
            include_short_contigs: false,
            min_assembly_len: 6000,
            min_delta: 10,
            paired_inference: false,
            circular: true,
            padding: 5000,
            final_guide: Some(GuideTrust::Untrusted),
            keep_temps: false,
            skip_control: false,
            max_iterations: 3,
            target_len: None,
            serialize: false,
            smalt_scoring: "match=1,subst=-4,gapopen=-4,gapext=-3".to_string(),
            buffer_len: 5000,
            exes: Executables::default(),
        }
    }
}

impl SeedConfig {
    /// Reject thresholds that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SeedError::config("--iterations must be at least 1"));
        }
        if self.cores == 0 {
            return Err(SeedError::config("--cores must be at least 1"));
        }
        if self.threads == 0 {
            return Err(SeedError::config("--threads must be at least 1"));
        }
        if self.buffer_len == 0 {
            return Err(SeedError::config(
                "--buffer-len must be positive so contigs cannot be bridged",
            ));
        }
        if self.experiment_name.is_empty() || self.experiment_name.contains(char::is_whitespace)
        {
            return Err(SeedError::config(format!(
                "experiment name '{}' must be non-empty and contain no whitespace",
                self.experiment_name
            )));
        }
        if let Some(min) = self.score_min {
            if min <= 0 {
                return Err(SeedError::config("--score-min must be positive"));
            }
        }
        Ok(())
    }
}
