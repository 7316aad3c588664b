use crate::assembly::AssemblyResult;
use crate::config::{GuideTrust, SeedConfig};
use crate::error::{Result, SeedError};
use crate::evaluate::{ExcludeReason, FatalReason, GrowthEvaluator, GrowthInput, Outcome};
use crate::events::{Observer, RunEvent};
use crate::mapping::{score_minimum, MappingOutput};
use crate::partition::{PartitionOutput, RegionWindow};
use crate::reads::ReadLibrary;
use crate::reconstitute::reconstitute;
use crate::regions::{Region, RegionCatalog};
use bio::io::fasta;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Combined FASTA of every seeded contig.
pub const SEEDED_CONTIGS: &str = "riboSeedContigs.fasta";
pub const FINAL_CONTIGS_DIR: &str = "final_long_reads";
pub const RUN_SUMMARY: &str = "run_summary.json";

/// The external work the controller schedules.
pub trait SeedStages: Sync {
    fn map(
        &self,
        pool: &ReadLibrary,
        reference: &Path,
        score_min: Option<i32>,
        ignore_singletons: bool,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<MappingOutput>;

    fn partition(
        &self,
        combined_bam: &Path,
        windows: &[RegionWindow],
        previous_claims: &BTreeSet<String>,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<PartitionOutput>;

    /// Read pool for `iteration`, built from the previous iteration's unclaimed reads.
    fn next_pool(
        &self,
        master: &ReadLibrary,
        unmapped_bam: &Path,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<ReadLibrary>;

    fn assemble(
        &self,
        region_bam: &Path,
        seed: &Path,
        work_dir: &Path,
        contig_name: &str,
        single_lib: bool,
    ) -> Result<AssemblyResult>;

    fn final_assembly(
        &self,
        library: &ReadLibrary,
        guide: Option<(GuideTrust, PathBuf)>,
        threads: usize,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    Iterating,
    Finalizing,
    Done,
}

/// One region's result for one iteration. Never modified once recorded.
#[derive(Clone, Debug, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Mapping target the coordinates refer to.
    pub reference: PathBuf,
    pub sequence_id: String,
    pub start: i64,
    pub end: i64,
    pub seed: Option<PathBuf>,
    pub seed_len: usize,
    pub region_bam: Option<PathBuf>,
    pub contig: Option<PathBuf>,
    pub contig_len: Option<usize>,
    pub outcome: Outcome,
}

/// Append-only per-region history.
#[derive(Clone, Debug)]
pub struct RegionHistory {
    pub region: Region,
    pub records: Vec<IterationRecord>,
    pub final_contig: Option<PathBuf>,
}

impl RegionHistory {
    pub fn new(region: Region) -> Self {
        RegionHistory {
            region,
            records: Vec::new(),
            final_contig: None,
        }
    }

    pub fn latest(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    pub fn keep_contig(&self) -> bool {
        self.latest().map_or(true, |r| r.outcome.keep_contig())
    }

    pub fn continue_iterating(&self) -> bool {
        self.latest().map_or(true, |r| r.outcome.continue_iterating())
    }

    pub fn is_active(&self) -> bool {
        self.keep_contig() && self.continue_iterating()
    }

    /// Seed length of the first iteration, the baseline for fractional targets.
    pub fn initial_seed_len(&self) -> Option<usize> {
        self.records.first().map(|r| r.seed_len)
    }
}

/// Files one iteration produced outside the region directories.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IterationArtifacts {
    pub iteration: usize,
    pub reference: PathBuf,
    pub mapping_success: bool,
    /// Bulky alignment files.
    pub alignments: Vec<PathBuf>,
    /// Derived read files; empty when the master library was mapped.
    pub pool_reads: Vec<PathBuf>,
    pub unmapped_bam: PathBuf,
    pub claimed_reads: usize,
    pub unmapped_records: usize,
    pub genome: Option<PathBuf>,
}

/// Files safe to delete once `iteration` has completed: alignments from two
/// iterations back and the read pool of the previous iteration.
pub fn purgeable_after(history: &[IterationArtifacts], iteration: usize) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for artifacts in history {
        if iteration >= 2 && artifacts.iteration == iteration - 2 {
            paths.extend(artifacts.alignments.iter().cloned());
        }
        if iteration >= 1 && artifacts.iteration == iteration - 1 {
            paths.extend(artifacts.pool_reads.iter().cloned());
        }
    }
    paths
}

/// Every intermediate file of the run.
pub fn purgeable_at_end(history: &[IterationArtifacts]) -> Vec<PathBuf> {
    history
        .iter()
        .flat_map(|a| a.alignments.iter().chain(a.pool_reads.iter()).cloned())
        .collect()
}

fn remove_files(paths: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

#[derive(Clone, Debug, Serialize)]
pub struct RegionSummary {
    pub index: usize,
    pub name: String,
    pub loci: Vec<String>,
    pub iterations: Vec<IterationRecord>,
    pub final_contig: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FinalAssemblySummary {
    pub name: String,
    pub contigs: Option<PathBuf>,
}

/// Machine-readable account of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub experiment_name: String,
    pub iterations_run: usize,
    pub regions: Vec<RegionSummary>,
    pub iterations: Vec<IterationArtifacts>,
    pub seeded_contigs: Option<PathBuf>,
    pub final_assemblies: Vec<FinalAssemblySummary>,
}

/// Work for one region in one iteration.
struct RegionJob {
    region: usize,
    name: String,
    sequence_id: String,
    start: i64,
    end: i64,
    seed: PathBuf,
    seed_len: usize,
    initial_seed_len: usize,
    bam: PathBuf,
    work_dir: PathBuf,
}

/// Drives the map, partition, assemble, evaluate, reconstitute loop.
pub struct IterationController<'a, S: SeedStages> {
    config: &'a SeedConfig,
    stages: &'a S,
    observer: &'a dyn Observer,
    master: ReadLibrary,
    evaluator: GrowthEvaluator,
    state: RunState,
    regions: Vec<RegionHistory>,
    artifacts: Vec<IterationArtifacts>,
    reference: PathBuf,
    /// Current extraction window per region index, in the current reference's coordinates.
    windows: FxHashMap<usize, (String, i64, i64)>,
    claims: BTreeSet<String>,
}

impl<'a, S: SeedStages> IterationController<'a, S> {
    /// Set up the first iteration. `reference` must already hold the catalog's sequences.
    pub fn new(
        config: &'a SeedConfig,
        stages: &'a S,
        observer: &'a dyn Observer,
        catalog: RegionCatalog,
        master: ReadLibrary,
        reference: PathBuf,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_root)?;
        fs::create_dir_all(config.output_root.join(FINAL_CONTIGS_DIR))?;

        let mut windows = FxHashMap::default();
        let mut regions = Vec::with_capacity(catalog.regions.len());
        for (position, region) in catalog.regions.into_iter().enumerate() {
            if region.index != position {
                return Err(SeedError::config(format!(
                    "region index {} does not match its position {}",
                    region.index, position
                )));
            }
            if !region.loci_in_order() {
                observer.notify(&RunEvent::LociOutOfOrder {
                    region: region.index,
                });
            }
            let seq_len = catalog
                .sequences
                .iter()
                .find(|(id, _)| *id == region.sequence_id)
                .map(|(_, seq)| seq.len())
                .ok_or_else(|| {
                    SeedError::config(format!(
                        "no sequence '{}' for region {}",
                        region.sequence_id, region.index
                    ))
                })?;
            let (start, end, clamped) = region.initial_range(config.flank, seq_len);
            if clamped {
                warn!(
                    "Cannot retrieve the full flanking region for region {}; it runs past the end of {}. \
                     Try a smaller --flanking-length, or circular handling if appropriate",
                    region.index, region.sequence_id
                );
            }
            windows.insert(region.index, (region.sequence_id.clone(), start, end));
            regions.push(RegionHistory::new(region));
        }
        if regions.is_empty() {
            return Err(SeedError::config("no regions to seed"));
        }

        Ok(IterationController {
            config,
            stages,
            observer,
            master,
            evaluator: GrowthEvaluator {
                min_assembly_len: config.min_assembly_len,
                min_delta: config.min_delta,
                include_short_contigs: config.include_short_contigs,
                target: config.target_len,
            },
            state: RunState::Init,
            regions,
            artifacts: Vec::new(),
            reference,
            windows,
            claims: BTreeSet::new(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn regions(&self) -> &[RegionHistory] {
        &self.regions
    }

    pub fn artifacts(&self) -> &[IterationArtifacts] {
        &self.artifacts
    }

    fn active_regions(&self) -> Vec<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_active())
            .map(|(i, _)| i)
            .collect()
    }

    /// Run every iteration, then finalise.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.state = RunState::Iterating;
        let mut iterations_run = 0;
        for iteration in 0..self.config.max_iterations {
            let active = self.active_regions();
            if active.is_empty() {
                break;
            }
            self.run_iteration(iteration, &active)?;
            iterations_run = iteration + 1;

            let still_active = self.active_regions();
            if still_active.is_empty() {
                if !self.regions.iter().any(RegionHistory::keep_contig) {
                    return Err(SeedError::NoActiveRegions { iteration });
                }
                break;
            }
            if iteration + 1 < self.config.max_iterations
                && !self.reconstitute(iteration, &still_active)?
            {
                break;
            }
        }

        self.state = RunState::Finalizing;
        let summary = self.finalize(iterations_run)?;
        self.state = RunState::Done;
        Ok(summary)
    }

    fn region_dir(&self, index: usize, iteration: usize) -> PathBuf {
        self.config
            .output_root
            .join(self.regions[index].region.name())
            .join(format!("iteration_{iteration}"))
    }

    fn run_iteration(&mut self, iteration: usize, active: &[usize]) -> Result<()> {
        let iter_dir = self
            .config
            .output_root
            .join(format!("iteration_{iteration}"));
        let pool = match self.artifacts.last() {
            Some(previous) if iteration > 0 => self.stages.next_pool(
                &self.master,
                &previous.unmapped_bam,
                iteration,
                &iter_dir.join("pool"),
            )?,
            _ => self.master.clone(),
        };
        self.observer.notify(&RunEvent::IterationStarted {
            iteration,
            active_regions: active.len(),
            reference: self.reference.clone(),
        });

        let score_min = self.config.score_min.or_else(|| {
            self.master
                .read_len
                .map(|len| score_minimum(len, iteration))
        });
        let mapping = self.stages.map(
            &pool,
            &self.reference,
            score_min,
            self.config.ignore_singletons && iteration == 0,
            iteration,
            &iter_dir.join("mapping"),
        )?;

        let sequences = load_sequences(&self.reference)?;
        let mut windows = Vec::with_capacity(active.len());
        let mut seeds: FxHashMap<usize, (PathBuf, usize)> = FxHashMap::default();
        let mut finished: Vec<(usize, IterationRecord)> = Vec::new();
        for &index in active {
            let (sequence_id, start, end) = self.windows.get(&index).cloned().ok_or_else(|| {
                SeedError::Partition {
                    region: index,
                    iteration,
                    reason: "no coordinates recorded for this region".to_string(),
                }
            })?;
            self.observer.notify(&RunEvent::RegionRange {
                region: index,
                iteration,
                sequence: sequence_id.clone(),
                start,
                end,
            });
            let region_dir = self.region_dir(index, iteration);
            let seed = region_dir.join("seed.fasta");
            let name = self.regions[index].region.name();
            match write_seed(&sequences, &sequence_id, start, end, &seed, &name) {
                Ok(seed_len) => {
                    seeds.insert(index, (seed, seed_len));
                    windows.push(RegionWindow {
                        region: index,
                        sequence_id,
                        start,
                        end,
                        output_bam: region_dir.join("mapped.bam"),
                    });
                }
                Err(e) => {
                    self.observer.notify(&RunEvent::RegionFailed {
                        region: index,
                        iteration,
                        message: e.to_string(),
                    });
                    finished.push((
                        index,
                        self.failed_record(iteration, &sequence_id, start, end),
                    ));
                }
            }
        }

        let partition = self.stages.partition(
            &mapping.combined_bam,
            &windows,
            &self.claims,
            iteration,
            &iter_dir.join("partition"),
        )?;
        self.observer.notify(&RunEvent::MappingFinished {
            iteration,
            claimed_reads: partition.claimed.len(),
            unmapped_reads: partition.unmapped_records,
        });

        let mut jobs = Vec::new();
        for (index, result) in &partition.regions {
            let Some(window) = windows.iter().find(|w| w.region == *index) else {
                continue;
            };
            match result {
                Ok(reads) => {
                    if let Some(coverage) = reads.coverage {
                        self.observer.notify(&RunEvent::FlankCoverage {
                            region: *index,
                            iteration,
                            upstream: coverage.upstream,
                            downstream: coverage.downstream,
                        });
                    }
                    let Some((seed, seed_len)) = seeds.get(index).cloned() else {
                        continue;
                    };
                    let history = &self.regions[*index];
                    jobs.push(RegionJob {
                        region: *index,
                        name: history.region.name(),
                        sequence_id: window.sequence_id.clone(),
                        start: window.start,
                        end: window.end,
                        seed,
                        seed_len,
                        initial_seed_len: history.initial_seed_len().unwrap_or(seed_len),
                        bam: reads.bam.clone(),
                        work_dir: self.region_dir(*index, iteration),
                    });
                }
                Err(e) => {
                    self.observer.notify(&RunEvent::RegionFailed {
                        region: *index,
                        iteration,
                        message: e.to_string(),
                    });
                    finished.push((
                        *index,
                        self.failed_record(iteration, &window.sequence_id, window.start, window.end),
                    ));
                }
            }
        }

        finished.extend(self.assemble_all(iteration, &jobs)?);
        finished.sort_by_key(|(index, _)| *index);

        let final_dir = self.config.output_root.join(FINAL_CONTIGS_DIR);
        for (index, record) in finished {
            let history = &mut self.regions[index];
            if let (Outcome::Stop(_), Some(contig)) = (&record.outcome, &record.contig) {
                let dest = final_dir.join(format!("{}.fasta", history.region.name()));
                fs::copy(contig, &dest)?;
                history.final_contig = Some(dest);
            }
            history.records.push(record);
        }

        let mut alignments = mapping.intermediates.clone();
        alignments.push(mapping.combined_bam.clone());
        alignments.push(partition.sorted_bam.clone());
        alignments.push(PathBuf::from(format!(
            "{}.bai",
            partition.sorted_bam.display()
        )));
        alignments.push(partition.unmapped_bam.clone());
        alignments.extend(windows.iter().map(|w| w.output_bam.clone()));
        let pool_reads = if iteration > 0 {
            pool.files().into_iter().map(Path::to_path_buf).collect()
        } else {
            Vec::new()
        };
        self.artifacts.push(IterationArtifacts {
            iteration,
            reference: self.reference.clone(),
            mapping_success: true,
            alignments,
            pool_reads,
            unmapped_bam: partition.unmapped_bam.clone(),
            claimed_reads: partition.claimed.len(),
            unmapped_records: partition.unmapped_records,
            genome: None,
        });
        self.claims = partition.claimed;

        if !self.config.keep_temps {
            let removed = remove_files(&purgeable_after(&self.artifacts, iteration))?;
            if removed > 0 {
                self.observer.notify(&RunEvent::ArtifactsPurged {
                    iteration,
                    files: removed,
                });
            }
        }
        Ok(())
    }

    fn failed_record(
        &self,
        iteration: usize,
        sequence_id: &str,
        start: i64,
        end: i64,
    ) -> IterationRecord {
        IterationRecord {
            iteration,
            reference: self.reference.clone(),
            sequence_id: sequence_id.to_string(),
            start,
            end,
            seed: None,
            seed_len: (end - start + 1).max(0) as usize,
            region_bam: None,
            contig: None,
            contig_len: None,
            outcome: Outcome::Exclude(ExcludeReason::PartitionFailed),
        }
    }

    /// Assemble and evaluate every job, on the worker pool unless serialised.
    fn assemble_all(
        &self,
        iteration: usize,
        jobs: &[RegionJob],
    ) -> Result<Vec<(usize, IterationRecord)>> {
        let stages = self.stages;
        let observer = self.observer;
        let evaluator = self.evaluator;
        let reference = self.reference.clone();
        let single_lib = iteration > 0;

        let run_job = |job: &RegionJob| -> (usize, IterationRecord) {
            let input = GrowthInput {
                iteration,
                seed_len: job.seed_len,
                initial_seed_len: job.initial_seed_len,
                contig_len: None,
            };
            let (contig, contig_len, outcome) =
                match stages.assemble(&job.bam, &job.seed, &job.work_dir, &job.name, single_lib) {
                    Ok(AssemblyResult::Assembled { contig, length }) => {
                        let outcome = evaluator.evaluate(&GrowthInput {
                            contig_len: Some(length),
                            ..input
                        });
                        (Some(contig), Some(length), outcome)
                    }
                    Ok(AssemblyResult::NoOutput) => (None, None, evaluator.evaluate(&input)),
                    Ok(AssemblyResult::Skipped(reason)) => {
                        observer.notify(&RunEvent::AssemblySkipped {
                            region: job.region,
                            iteration,
                            reason,
                        });
                        (None, None, evaluator.evaluate(&input))
                    }
                    Err(e) => {
                        observer.notify(&RunEvent::RegionFailed {
                            region: job.region,
                            iteration,
                            message: e.to_string(),
                        });
                        (None, None, Outcome::Fatal(FatalReason::ToolFailed))
                    }
                };
            observer.notify(&RunEvent::RegionEvaluated {
                region: job.region,
                iteration,
                contig_len,
                outcome,
            });
            (
                job.region,
                IterationRecord {
                    iteration,
                    reference: reference.clone(),
                    sequence_id: job.sequence_id.clone(),
                    start: job.start,
                    end: job.end,
                    seed: Some(job.seed.clone()),
                    seed_len: job.seed_len,
                    region_bam: Some(job.bam.clone()),
                    contig,
                    contig_len,
                    outcome,
                },
            )
        };

        if self.config.serialize || jobs.len() < 2 {
            if self.config.serialize {
                debug!("Running region assemblies serially");
            }
            return Ok(jobs.iter().map(run_job).collect());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.cores.min(jobs.len()))
            .build()
            .map_err(|source| SeedError::WorkerPool {
                stage: format!("iteration {iteration}"),
                source,
            })?;
        Ok(pool.install(|| jobs.par_iter().map(run_job).collect()))
    }

    /// Build the next mapping target. Returns false when nothing survived.
    fn reconstitute(&mut self, iteration: usize, still_active: &[usize]) -> Result<bool> {
        let contigs: Vec<(usize, PathBuf)> = still_active
            .iter()
            .filter_map(|&i| {
                self.regions[i]
                    .latest()
                    .and_then(|r| r.contig.clone())
                    .map(|c| (i, c))
            })
            .collect();
        let sequence_id = format!("{}_iter_{}", self.config.experiment_name, iteration);
        let path = self
            .config
            .output_root
            .join(format!("iter_{iteration}_buffered_genome.fasta"));
        let Some(genome) = reconstitute(&contigs, self.config.buffer_len, &sequence_id, &path)?
        else {
            return Ok(false);
        };

        self.windows.clear();
        for placement in &genome.placements {
            self.windows.insert(
                placement.region,
                (genome.sequence_id.clone(), placement.start, placement.end),
            );
        }
        self.observer.notify(&RunEvent::GenomeReconstituted {
            iteration,
            path: genome.path.clone(),
            contigs: genome.placements.len(),
            length: genome.length,
        });
        if let Some(last) = self.artifacts.last_mut() {
            last.genome = Some(genome.path.clone());
        }
        self.reference = genome.path;
        Ok(true)
    }

    fn finalize(&mut self, iterations_run: usize) -> Result<RunSummary> {
        let final_dir = self.config.output_root.join(FINAL_CONTIGS_DIR);
        for history in &mut self.regions {
            if !history.keep_contig() {
                continue;
            }
            let Some(contig) = history.latest().and_then(|r| r.contig.clone()) else {
                continue;
            };
            let dest = final_dir.join(format!("{}.fasta", history.region.name()));
            if !dest.exists() {
                fs::copy(&contig, &dest)?;
            }
            history.final_contig = Some(dest);
        }

        let combined = self.config.output_root.join(SEEDED_CONTIGS);
        let count = combine_contigs(&final_dir, &combined)?;
        self.observer.notify(&RunEvent::FinalContigs {
            path: combined.clone(),
            contigs: count,
        });

        let final_assemblies = if count == 0 {
            warn!("No seeded contigs survived; skipping final assemblies");
            Vec::new()
        } else {
            self.final_assemblies(&combined)?
        };

        if !self.config.keep_temps {
            let removed = remove_files(&purgeable_at_end(&self.artifacts))?;
            if removed > 0 {
                self.observer.notify(&RunEvent::ArtifactsPurged {
                    iteration: iterations_run.saturating_sub(1),
                    files: removed,
                });
            }
        }

        let summary = RunSummary {
            experiment_name: self.config.experiment_name.clone(),
            iterations_run,
            regions: self
                .regions
                .iter()
                .map(|h| RegionSummary {
                    index: h.region.index,
                    name: h.region.name(),
                    loci: h.region.loci.iter().map(|l| l.tag.clone()).collect(),
                    iterations: h.records.clone(),
                    final_contig: h.final_contig.clone(),
                })
                .collect(),
            iterations: self.artifacts.clone(),
            seeded_contigs: (count > 0).then_some(combined),
            final_assemblies,
        };
        let out = BufWriter::new(File::create(self.config.output_root.join(RUN_SUMMARY))?);
        serde_json::to_writer_pretty(out, &summary).map_err(io::Error::from)?;
        Ok(summary)
    }

    /// De fere novo assembly guided by the seeded contigs, plus the de novo control.
    fn final_assemblies(&self, seeded: &Path) -> Result<Vec<FinalAssemblySummary>> {
        let mut jobs: Vec<(&str, Option<(GuideTrust, PathBuf)>)> = vec![(
            "de_fere_novo",
            self.config
                .final_guide
                .map(|trust| (trust, seeded.to_path_buf())),
        )];
        if !self.config.skip_control {
            jobs.push(("de_novo", None));
        }
        let threads = (self.config.cores / jobs.len()).max(1);
        let stages = self.stages;
        let observer = self.observer;
        let master = &self.master;
        let root = &self.config.output_root;

        let run_job = |(name, guide): &(&str, Option<(GuideTrust, PathBuf)>)| {
            let dir = root.join(format!("final_{name}_assembly"));
            let result = stages.final_assembly(master, guide.clone(), threads, &dir);
            let (contigs, message) = match result {
                Ok(contigs) => (contigs, None),
                Err(e) => (None, Some(e.to_string())),
            };
            observer.notify(&RunEvent::FinalAssembly {
                name: name.to_string(),
                success: contigs.is_some(),
                message,
            });
            FinalAssemblySummary {
                name: name.to_string(),
                contigs,
            }
        };

        if self.config.serialize || jobs.len() < 2 {
            return Ok(jobs.iter().map(run_job).collect());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.len())
            .build()
            .map_err(|source| SeedError::WorkerPool {
                stage: "final assemblies".to_string(),
                source,
            })?;
        Ok(pool.install(|| jobs.par_iter().map(run_job).collect()))
    }
}

/// All records of a FASTA file keyed by id.
pub fn load_sequences(path: &Path) -> Result<FxHashMap<String, Vec<u8>>> {
    let reader = fasta::Reader::new(File::open(path)?);
    let mut sequences = FxHashMap::default();
    for record in reader.records() {
        let record = record?;
        sequences.insert(record.id().to_string(), record.seq().to_vec());
    }
    Ok(sequences)
}

/// Write `sequences[id][start..=end]` (1-based) as a single-record FASTA.
pub fn write_seed(
    sequences: &FxHashMap<String, Vec<u8>>,
    sequence_id: &str,
    start: i64,
    end: i64,
    path: &Path,
    name: &str,
) -> Result<usize> {
    let seed_error = |reason: String| SeedError::Seed {
        sequence_id: sequence_id.to_string(),
        start,
        end,
        reason,
    };
    let seq = sequences
        .get(sequence_id)
        .ok_or_else(|| seed_error("sequence is not in the mapping target".to_string()))?;
    if start < 1 || end < start || end as usize > seq.len() {
        return Err(seed_error(format!(
            "range is outside the sequence ({} bp)",
            seq.len()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let slice = &seq[(start - 1) as usize..end as usize];
    let mut writer = fasta::Writer::to_file(path)?;
    writer.write(name, None, slice)?;
    writer.flush()?;
    Ok(slice.len())
}

/// Concatenate every FASTA in `dir`, in natural file-name order, into `output`.
pub fn combine_contigs(dir: &Path, output: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "fasta"))
        .collect();
    files.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));

    let mut writer = fasta::Writer::to_file(output)?;
    let mut count = 0;
    for file in &files {
        let reader = fasta::Reader::new(File::open(file)?);
        for record in reader.records() {
            writer.write_record(&record?)?;
            count += 1;
        }
    }
    writer.flush()?;
    Ok(count)
}
