use clap::Parser;
use log::{error, info};
use riboseed::config::{
    Executables, Flank, GuideTrust, KmerLadder, LengthTarget, MapperMethod, SeedConfig,
};
use riboseed::error::Result;
use riboseed::events::LogObserver;
use riboseed::pipeline::{run_seed, SeedInputs};
use std::error::Error;
use std::io;
use std::path::PathBuf;

/// Options for a seeding run
#[derive(Parser, Debug)]
struct SeedOpts {
    /// Cluster file: a `#$ FEATURE <type>` header, then `<sequence> <tag1:tag2:...>` per line
    #[clap(value_parser)]
    clustered_loci: PathBuf,

    /// Forward reads (FASTQ, optionally gzipped)
    #[clap(short = 'F', long, value_parser)]
    fastq1: Option<PathBuf>,

    /// Reverse reads (FASTQ, optionally gzipped)
    #[clap(short = 'R', long, value_parser)]
    fastq2: Option<PathBuf>,

    /// Singleton reads (FASTQ, optionally gzipped)
    #[clap(short = 'S', long, value_parser)]
    fastq_single: Option<PathBuf>,

    /// GenBank reference the cluster file was made from
    #[clap(short = 'r', long, value_parser)]
    reference_genbank: PathBuf,

    /// Output directory
    #[clap(short = 'o', long, value_parser)]
    output: PathBuf,

    /// Prefix for results files
    #[clap(short = 'n', long, value_parser, default_value = "riboSeed")]
    experiment_name: String,

    /// Flanking length around each region, as N or UPSTREAM:DOWNSTREAM
    #[clap(short = 'l', long, value_parser, default_value = "1000")]
    flanking_length: String,

    /// Short read mapper: bwa or smalt
    #[clap(short = 'm', long, value_parser, default_value = "bwa")]
    method: String,

    /// Number of regions processed at once. Defaults to all CPUs.
    #[clap(short = 'c', long, value_parser)]
    cores: Option<usize>,

    /// Threads per assembler process
    #[clap(short = 't', long, value_parser, default_value_t = 1)]
    threads: usize,

    /// K-mers for the final assemblies
    #[clap(short = 'k', long, value_parser, default_value = "21,33,55,77,99,127")]
    kmers: String,

    /// K-mers for the per-region seeding assemblies
    #[clap(short = 'p', long, value_parser, default_value = "21,33,55,77,99")]
    pre_kmers: String,

    /// Do not map singleton reads in the first iteration
    #[clap(short = 'I', long, action)]
    ignore_singletons: bool,

    /// Fixed minimum alignment score. Derived from read length and iteration when unset.
    #[clap(short = 's', long, value_parser)]
    score_min: Option<i32>,

    /// Keep contigs shorter than --min-assembly-len instead of excluding them
    #[clap(long, action)]
    include_shorts: bool,

    /// Minimum contig length for a region to stay in the run
    #[clap(short = 'a', long, value_parser, default_value_t = 6000)]
    min_assembly_len: usize,

    /// Minimum change in contig length between iterations before a region stops
    #[clap(long, value_parser, default_value_t = 10)]
    min_delta: usize,

    /// Also claim the mates of reads mapped to a region
    #[clap(long, action)]
    paired_inference: bool,

    /// Treat the reference as linear (no padding across the origin)
    #[clap(long, action)]
    linear: bool,

    /// Padding added across the origin of circular records
    #[clap(long, value_parser, default_value_t = 5000)]
    padding: usize,

    /// How the final de fere novo assembly uses the seeded contigs: none, trusted or untrusted
    #[clap(long, value_parser, default_value = "untrusted")]
    ref_as_contig: String,

    /// Keep intermediate alignments and read files
    #[clap(long, action)]
    keep_temps: bool,

    /// Skip the de novo control assembly
    #[clap(long, action)]
    skip_control: bool,

    /// Number of seeding iterations
    #[clap(short = 'i', long, value_parser, default_value_t = 3)]
    iterations: usize,

    /// Stop a region once its contig reaches this length: a multiple of the
    /// first seed when below 5, otherwise an absolute length in bp
    #[clap(long, value_parser)]
    target_len: Option<f64>,

    /// Process regions one at a time
    #[clap(short = 'z', long, action)]
    serialize: bool,

    /// SMALT scoring string
    #[clap(long, value_parser, default_value = "match=1,subst=-4,gapopen=-4,gapext=-3")]
    smalt_scoring: String,

    /// Length of the N spacer between contigs in the reconstituted genome
    #[clap(long, value_parser, default_value_t = 5000)]
    buffer_len: usize,

    #[clap(long, value_parser, default_value = "bwa")]
    bwa_exe: PathBuf,

    #[clap(long, value_parser, default_value = "smalt")]
    smalt_exe: PathBuf,

    #[clap(long, value_parser, default_value = "samtools")]
    samtools_exe: PathBuf,

    #[clap(long, value_parser, default_value = "spades.py")]
    spades_exe: PathBuf,

    /// Verbosity level (0 = warn, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Iterative seed extension for assembling rDNA regions.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Extend reference-derived seeds around clustered loci by iterative mapping and assembly
    Seed {
        #[clap(flatten)]
        opts: SeedOpts,
    },
}

impl SeedOpts {
    fn into_run(self) -> Result<(SeedConfig, SeedInputs)> {
        let defaults = SeedConfig::default();
        let config = SeedConfig {
            experiment_name: self.experiment_name,
            output_root: self.output,
            flank: Flank::parse(&self.flanking_length)?,
            method: MapperMethod::parse(&self.method)?,
            cores: self.cores.unwrap_or(defaults.cores),
            threads: self.threads,
            kmers: KmerLadder::parse(&self.kmers)?,
            pre_kmers: KmerLadder::parse(&self.pre_kmers)?,
            ignore_singletons: self.ignore_singletons,
            score_min: self.score_min,
            include_short_contigs: self.include_shorts,
            min_assembly_len: self.min_assembly_len,
            min_delta: self.min_delta,
            paired_inference: self.paired_inference,
            circular: !self.linear,
            padding: self.padding,
            final_guide: GuideTrust::parse(&self.ref_as_contig)?,
            keep_temps: self.keep_temps,
            skip_control: self.skip_control,
            max_iterations: self.iterations,
            target_len: self.target_len.map(LengthTarget::from_value).transpose()?,
            serialize: self.serialize,
            smalt_scoring: self.smalt_scoring,
            buffer_len: self.buffer_len,
            exes: Executables {
                bwa: self.bwa_exe,
                smalt: self.smalt_exe,
                samtools: self.samtools_exe,
                spades: self.spades_exe,
            },
        };
        let inputs = SeedInputs {
            clusters: self.clustered_loci,
            genbank: self.reference_genbank,
            forward: self.fastq1,
            reverse: self.fastq2,
            singletons: self.fastq_single,
        };
        Ok((config, inputs))
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Seed { opts } => {
            initialize_logger(opts.verbose);
            if let Err(e) = seed(opts) {
                error!("{e}");
                let mut source = e.source();
                while let Some(cause) = source {
                    error!("  caused by: {cause}");
                    source = cause.source();
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn seed(opts: SeedOpts) -> Result<()> {
    let (config, inputs) = opts.into_run()?;
    info!(
        "Seeding from {} with {} cores, flanks {}, {} iterations",
        inputs.clusters.display(),
        config.cores,
        config.flank,
        config.max_iterations
    );
    let summary = run_seed(&config, &inputs, &LogObserver)?;
    let seeded = summary
        .regions
        .iter()
        .filter(|r| r.final_contig.is_some())
        .count();
    info!(
        "Finished after {} iterations: {} of {} regions seeded",
        summary.iterations_run,
        seeded,
        summary.regions.len()
    );
    if let Some(path) = &summary.seeded_contigs {
        info!("Seeded contigs written to {}", path.display());
    }
    Ok(())
}

fn initialize_logger(verbose: u8) {
    env_logger::Builder::new()
        .filter_level(match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();
}
