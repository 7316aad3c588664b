use crate::assembly::{AssemblyResult, AssemblyStage};
use crate::config::{GuideTrust, MapperMethod, SeedConfig};
use crate::controller::{IterationController, RunSummary, SeedStages};
use crate::error::{Result, ToolError};
use crate::events::Observer;
use crate::mapping::{MappingOutput, MappingStage};
use crate::partition::{PartitionOutput, PartitionStage, RegionWindow};
use crate::reads::ReadLibrary;
use crate::regions::{ClusterFile, GenBankReference, RegionCatalog};
use crate::tools::aligner::Aligner;
use crate::tools::samtools::Samtools;
use log::info;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Padded reference written at the start of a run.
pub const REFERENCE_FASTA: &str = "reference.fasta";

/// Fetch margin used when the read length could not be estimated.
const DEFAULT_READ_LEN: usize = 150;

/// Input files of a seeding run.
#[derive(Clone, Debug, Default)]
pub struct SeedInputs {
    pub clusters: PathBuf,
    pub genbank: PathBuf,
    pub forward: Option<PathBuf>,
    pub reverse: Option<PathBuf>,
    pub singletons: Option<PathBuf>,
}

/// Stages backed by the external aligner, samtools and SPAdes.
#[derive(Clone, Debug)]
pub struct ExternalStages {
    pub mapping: MappingStage,
    pub partition: PartitionStage,
    pub assembly: AssemblyStage,
    samtools: Samtools,
}

impl ExternalStages {
    pub fn new(config: &SeedConfig, read_len: Option<usize>) -> Self {
        let samtools = Samtools::new(&config.exes.samtools);
        let aligner_exe = match config.method {
            MapperMethod::Bwa => &config.exes.bwa,
            MapperMethod::Smalt => &config.exes.smalt,
        };
        ExternalStages {
            mapping: MappingStage {
                aligner: Aligner::new(config.method, aligner_exe, &config.smalt_scoring, None),
                samtools: samtools.clone(),
                cores: config.cores * config.threads,
            },
            partition: PartitionStage {
                samtools: samtools.clone(),
                cores: config.cores,
                paired_inference: config.paired_inference,
                read_len: read_len.unwrap_or(DEFAULT_READ_LEN),
                flank: config.flank,
            },
            assembly: AssemblyStage {
                spades: config.exes.spades.clone(),
                samtools: samtools.clone(),
                pre_kmers: config.pre_kmers.clone(),
                kmers: config.kmers.clone(),
                threads: config.threads,
            },
            samtools,
        }
    }
}

impl SeedStages for ExternalStages {
    fn map(
        &self,
        pool: &ReadLibrary,
        reference: &Path,
        score_min: Option<i32>,
        ignore_singletons: bool,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<MappingOutput> {
        self.mapping
            .map(pool, reference, score_min, ignore_singletons, iteration, work_dir)
    }

    fn partition(
        &self,
        combined_bam: &Path,
        windows: &[RegionWindow],
        previous_claims: &BTreeSet<String>,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<PartitionOutput> {
        self.partition
            .partition(combined_bam, windows, previous_claims, iteration, work_dir)
    }

    fn next_pool(
        &self,
        master: &ReadLibrary,
        unmapped_bam: &Path,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<ReadLibrary> {
        fs::create_dir_all(work_dir)?;
        let reads = work_dir.join("unmapped_reads.fastq");
        self.samtools.fastq_single(unmapped_bam, &reads).run()?;
        if !reads.exists() {
            return Err(ToolError::MissingOutput {
                program: "samtools fastq".to_string(),
                path: reads,
            }
            .into());
        }
        let mut pool = ReadLibrary::new(
            &format!("unmapped_iteration_{}", iteration.saturating_sub(1)),
            None,
            None,
            Some(reads),
        )?;
        pool.read_len = master.read_len;
        pool.distances = master.distances.clone();
        Ok(pool)
    }

    fn assemble(
        &self,
        region_bam: &Path,
        seed: &Path,
        work_dir: &Path,
        contig_name: &str,
        single_lib: bool,
    ) -> Result<AssemblyResult> {
        self.assembly
            .assemble_region(region_bam, seed, work_dir, contig_name, single_lib)
    }

    fn final_assembly(
        &self,
        library: &ReadLibrary,
        guide: Option<(GuideTrust, PathBuf)>,
        threads: usize,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        self.assembly
            .assemble_library(library, guide, threads, output_dir)
    }
}

/// Load the inputs, prepare the mapping target and run the iteration loop to completion.
pub fn run_seed(
    config: &SeedConfig,
    inputs: &SeedInputs,
    observer: &dyn Observer,
) -> Result<RunSummary> {
    config.validate()?;
    let clusters = ClusterFile::from_path(&inputs.clusters)?;
    info!(
        "Read {} clusters of {} features from {}",
        clusters.clusters.len(),
        clusters.feature,
        inputs.clusters.display()
    );
    let annotation = GenBankReference::from_path(&inputs.genbank)?;
    let padding = config.circular.then_some(config.padding);
    let catalog = RegionCatalog::build(&clusters, &annotation, padding)?;

    let mut master = ReadLibrary::master(
        inputs.forward.clone(),
        inputs.reverse.clone(),
        inputs.singletons.clone(),
    )?;

    fs::create_dir_all(&config.output_root)?;
    let reference = config.output_root.join(REFERENCE_FASTA);
    catalog.write_reference_fasta(&reference)?;

    let mut stages = ExternalStages::new(config, master.read_len);
    let distances = config.output_root.join("insert_distances.txt");
    if let Some(path) = stages
        .mapping
        .estimate_distances(&master, &reference, &distances)?
    {
        stages.mapping.aligner = stages.mapping.aligner.clone().with_distances(path.clone());
        master.distances = Some(path);
    }

    let mut controller =
        IterationController::new(config, &stages, observer, catalog, master, reference)?;
    controller.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::RecordingObserver;
    use crate::error::SeedError;
    use tempfile::TempDir;

    #[test]
    fn test_external_stages_scale_mapping_cores() {
        let config = SeedConfig {
            cores: 4,
            threads: 2,
            ..SeedConfig::default()
        };
        let stages = ExternalStages::new(&config, None);
        assert_eq!(stages.mapping.cores, 8);
        assert_eq!(stages.partition.cores, 4);
        assert_eq!(stages.assembly.threads, 2);
        assert_eq!(stages.partition.read_len, 150);
        assert_eq!(stages.mapping.aligner.name(), "BWA");
    }

    #[test]
    fn test_run_seed_rejects_genbank_as_cluster_file() {
        let dir = TempDir::new().unwrap();
        let gb = dir.path().join("ref.gb");
        fs::write(&gb, "LOCUS x\n").unwrap();
        let config = SeedConfig {
            output_root: dir.path().join("out"),
            ..SeedConfig::default()
        };
        let inputs = SeedInputs {
            clusters: gb.clone(),
            genbank: gb,
            ..SeedInputs::default()
        };
        let err = run_seed(&config, &inputs, &RecordingObserver::default()).unwrap_err();
        assert!(matches!(err, SeedError::Configuration(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_run_seed_validates_config_first() {
        let config = SeedConfig {
            max_iterations: 0,
            ..SeedConfig::default()
        };
        let err = run_seed(&config, &SeedInputs::default(), &RecordingObserver::default())
            .unwrap_err();
        assert!(matches!(err, SeedError::Configuration(_)));
    }
}
