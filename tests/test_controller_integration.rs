//! Drives the iteration controller end to end with in-process stages standing
//! in for the aligner, samtools and SPAdes.

use bio::io::fasta;
use riboseed::assembly::AssemblyResult;
use riboseed::config::{Flank, GuideTrust, SeedConfig};
use riboseed::controller::{IterationController, RunState, SeedStages, RUN_SUMMARY, SEEDED_CONTIGS};
use riboseed::error::Result;
use riboseed::events::{Observer, RunEvent};
use riboseed::mapping::MappingOutput;
use riboseed::partition::{PartitionOutput, RegionReads, RegionWindow};
use riboseed::reads::ReadLibrary;
use riboseed::regions::{AnnotatedFeature, AnnotatedRecord, ClusterFile, GenBankReference, RegionCatalog};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Every assembly returns the seed grown by a fixed amount.
struct GrowingStages {
    growth: usize,
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

impl SeedStages for GrowingStages {
    fn map(
        &self,
        _pool: &ReadLibrary,
        reference: &Path,
        _score_min: Option<i32>,
        _ignore_singletons: bool,
        _iteration: usize,
        work_dir: &Path,
    ) -> Result<MappingOutput> {
        assert!(reference.exists());
        let combined_bam = work_dir.join("combined_mapping.bam");
        touch(&combined_bam);
        Ok(MappingOutput {
            combined_bam,
            intermediates: Vec::new(),
        })
    }

    fn partition(
        &self,
        _combined_bam: &Path,
        windows: &[RegionWindow],
        previous_claims: &BTreeSet<String>,
        iteration: usize,
        work_dir: &Path,
    ) -> Result<PartitionOutput> {
        let mut claimed = previous_claims.clone();
        let regions = windows
            .iter()
            .map(|w| {
                touch(&w.output_bam);
                claimed.insert(format!("{}_{}", iteration, w.region));
                (
                    w.region,
                    Ok(RegionReads {
                        region: w.region,
                        bam: w.output_bam.clone(),
                        records: 2,
                        read_names: 1,
                        coverage: None,
                    }),
                )
            })
            .collect();
        let unmapped_bam = work_dir.join("unmapped.bam");
        touch(&unmapped_bam);
        Ok(PartitionOutput {
            sorted_bam: work_dir.join("sorted.bam"),
            regions,
            claimed,
            unmapped_bam,
            unmapped_records: 0,
        })
    }

    fn next_pool(
        &self,
        _master: &ReadLibrary,
        _unmapped_bam: &Path,
        _iteration: usize,
        work_dir: &Path,
    ) -> Result<ReadLibrary> {
        let reads = work_dir.join("unmapped_reads.fastq");
        touch(&reads);
        ReadLibrary::new("pool", None, None, Some(reads))
    }

    fn assemble(
        &self,
        _region_bam: &Path,
        seed: &Path,
        work_dir: &Path,
        contig_name: &str,
        _single_lib: bool,
    ) -> Result<AssemblyResult> {
        let record = fasta::Reader::new(fs::File::open(seed)?)
            .records()
            .next()
            .unwrap()
            .unwrap();
        let mut grown = record.seq().to_vec();
        grown.extend(std::iter::repeat(b'G').take(self.growth));
        let contig = work_dir.join(format!("{contig_name}.fasta"));
        let mut writer = fasta::Writer::to_file(&contig)?;
        writer.write(contig_name, None, &grown)?;
        writer.flush()?;
        Ok(AssemblyResult::Assembled {
            contig,
            length: grown.len(),
        })
    }

    fn final_assembly(
        &self,
        _library: &ReadLibrary,
        guide: Option<(GuideTrust, PathBuf)>,
        _threads: usize,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        match guide {
            Some((_, seeds)) => {
                let contigs = output_dir.join("contigs.fasta");
                fs::create_dir_all(output_dir)?;
                fs::copy(seeds, &contigs)?;
                Ok(Some(contigs))
            }
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<RunEvent>>);

impl Observer for EventLog {
    fn notify(&self, event: &RunEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

fn catalog() -> RegionCatalog {
    let feature = |tag: &str, start: i64| AnnotatedFeature {
        kind: "rRNA".to_string(),
        locus_tag: Some(tag.to_string()),
        product: Some("16S ribosomal RNA".to_string()),
        start,
        end: start + 1500,
        strand: 1,
    };
    let reference = GenBankReference::from_records(vec![AnnotatedRecord {
        id: "NC_000001.1".to_string(),
        seq: b"ACGT".repeat(5_000),
        features: vec![feature("RS_1", 2_000), feature("RS_2", 12_000)],
    }]);
    let clusters =
        ClusterFile::parse("#$ FEATURE rRNA\nNC_000001.1 RS_1\nNC_000001.1 RS_2\n").unwrap();
    RegionCatalog::build(&clusters, &reference, None).unwrap()
}

#[test]
fn test_regions_grow_until_iterations_run_out() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("out");
    let config = SeedConfig {
        output_root: root.clone(),
        flank: Flank::symmetric(1000),
        cores: 2,
        min_assembly_len: 1000,
        max_iterations: 3,
        buffer_len: 500,
        ..SeedConfig::default()
    };
    let reads = dir.path().join("reads.fq");
    fs::write(&reads, "@r\nACGT\n+\nIIII\n").unwrap();
    let master = ReadLibrary::new("master", None, None, Some(reads)).unwrap();

    let catalog = catalog();
    fs::create_dir_all(&root).unwrap();
    let reference = root.join("reference.fasta");
    catalog.write_reference_fasta(&reference).unwrap();

    let stages = GrowingStages { growth: 200 };
    let events = EventLog::default();
    let mut controller =
        IterationController::new(&config, &stages, &events, catalog, master, reference).unwrap();
    let summary = controller.run().unwrap();
    assert_eq!(controller.state(), RunState::Done);
    assert_eq!(summary.iterations_run, 3);

    for region in controller.regions() {
        let lengths: Vec<usize> = region.records.iter().map(|r| r.seed_len).collect();
        // 1500 bp locus plus 1000 bp flanks, then +200 per iteration
        assert_eq!(lengths, vec![3500, 3700, 3900]);
        assert!(region.final_contig.as_ref().unwrap().exists());
    }

    let seeded = fs::read_to_string(root.join(SEEDED_CONTIGS)).unwrap();
    let ids: Vec<&str> = seeded.lines().filter(|l| l.starts_with('>')).collect();
    assert_eq!(ids, vec![">NC_000001.1_cluster_0", ">NC_000001.1_cluster_1"]);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join(RUN_SUMMARY)).unwrap()).unwrap();
    assert_eq!(json["regions"].as_array().unwrap().len(), 2);
    assert_eq!(json["regions"][0]["iterations"][2]["outcome"]["outcome"], "continue");

    let events = events.0.lock().unwrap();
    let genomes = events
        .iter()
        .filter(|e| matches!(e, RunEvent::GenomeReconstituted { .. }))
        .count();
    assert_eq!(genomes, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::FinalAssembly { name, success: false, .. } if name == "de_novo"
    )));
}
