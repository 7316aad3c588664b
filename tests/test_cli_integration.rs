//! Command-line behaviour of the riboseed binary that needs no external tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn get_riboseed_binary() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_riboseed") {
        return PathBuf::from(path);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        manifest_dir.join("target/release/riboseed"),
        manifest_dir.join("target/debug/riboseed"),
    ];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }

    PathBuf::from("riboseed")
}

fn run_riboseed(work_dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new(get_riboseed_binary())
        .current_dir(work_dir)
        .args(args)
        .output()
}

const GENBANK: &str = "\
LOCUS       TEST1                     60 bp    DNA     linear   BCT 01-JAN-2020
DEFINITION  Test record.
ACCESSION   TEST1
VERSION     TEST1.1
FEATURES             Location/Qualifiers
     source          1..60
     rRNA            11..30
                     /locus_tag=\"RS_001\"
                     /product=\"16S ribosomal RNA\"
ORIGIN
        1 acgtacgtac gtacgtacgt acgtacgtac gtacgtacgt acgtacgtac gtacgtacgt
//
";

fn write_inputs(dir: &Path) {
    fs::write(dir.join("ref.gb"), GENBANK).unwrap();
    fs::write(dir.join("clusters.txt"), "#$ FEATURE rRNA\nTEST1.1 RS_001\n").unwrap();
    let fastq = "@r1\nACGTACGTAC\n+\nIIIIIIIIII\n@r2\nGTACGTACGT\n+\nIIIIIIIIII\n";
    fs::write(dir.join("reads_1.fq"), fastq).unwrap();
    fs::write(dir.join("reads_2.fq"), fastq).unwrap();
}

#[test]
fn test_help_lists_seed_command() -> std::io::Result<()> {
    let dir = TempDir::new()?;
    let output = run_riboseed(dir.path(), &["--help"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("seed"));

    let output = run_riboseed(dir.path(), &["seed", "--help"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--flanking-length"));
    assert!(stdout.contains("--skip-control"));
    Ok(())
}

#[test]
fn test_missing_cluster_file_fails() -> std::io::Result<()> {
    let dir = TempDir::new()?;
    write_inputs(dir.path());
    let output = run_riboseed(
        dir.path(),
        &[
            "seed",
            "missing.txt",
            "-r",
            "ref.gb",
            "-F",
            "reads_1.fq",
            "-R",
            "reads_2.fq",
            "-o",
            "out",
        ],
    )?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not read cluster file"));
    Ok(())
}

#[test]
fn test_bad_flank_is_rejected_before_any_work() -> std::io::Result<()> {
    let dir = TempDir::new()?;
    write_inputs(dir.path());
    let output = run_riboseed(
        dir.path(),
        &[
            "seed",
            "clusters.txt",
            "-r",
            "ref.gb",
            "-S",
            "reads_1.fq",
            "-o",
            "out",
            "-l",
            "1000:abc",
        ],
    )?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid flanking length"));
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test]
fn test_unavailable_mapper_fails_after_reference_is_written() -> std::io::Result<()> {
    let dir = TempDir::new()?;
    write_inputs(dir.path());
    let output = run_riboseed(
        dir.path(),
        &[
            "seed",
            "clusters.txt",
            "-r",
            "ref.gb",
            "-F",
            "reads_1.fq",
            "-R",
            "reads_2.fq",
            "-o",
            "out",
            "--linear",
            "--bwa-exe",
            "/nonexistent/bwa",
        ],
    )?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mapping failed in iteration 0"), "{stderr}");

    let reference = fs::read_to_string(dir.path().join("out/reference.fasta"))?;
    assert!(reference.starts_with(">TEST1.1"));
    let sequence: String = reference.lines().skip(1).collect();
    assert_eq!(sequence.len(), 60);
    Ok(())
}
