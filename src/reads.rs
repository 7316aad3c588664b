use crate::error::{Result, SeedError};
use crate::tools::is_nonempty_file;
use bio::io::fastq;
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Number of reads sampled when estimating read length.
const READ_LENGTH_SAMPLE: usize = 36;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    Single,
    Paired,
    PairedWithSingletons,
}

/// A set of read files plus derived properties.
#[derive(Clone, Debug)]
pub struct ReadLibrary {
    pub name: String,
    pub forward: Option<PathBuf>,
    pub reverse: Option<PathBuf>,
    pub singletons: Option<PathBuf>,
    pub libtype: LibraryType,
    /// Only estimated for the master library.
    pub read_len: Option<usize>,
    /// Insert-size distribution for aligners that need one.
    pub distances: Option<PathBuf>,
}

impl ReadLibrary {
    /// Build a library, classifying it from which files are present.
    pub fn new(
        name: &str,
        forward: Option<PathBuf>,
        reverse: Option<PathBuf>,
        singletons: Option<PathBuf>,
    ) -> Result<Self> {
        let libtype = classify(
            forward.is_some(),
            reverse.is_some(),
            singletons.is_some(),
        )
        .ok_or_else(|| {
            SeedError::config(format!(
                "cannot determine library type for '{name}': need a forward/reverse pair, singletons, or both"
            ))
        })?;
        Ok(ReadLibrary {
            name: name.to_string(),
            forward,
            reverse,
            singletons,
            libtype,
            read_len: None,
            distances: None,
        })
    }

    /// The run's user-supplied library. Checks pairing and estimates read length.
    pub fn master(
        forward: Option<PathBuf>,
        reverse: Option<PathBuf>,
        singletons: Option<PathBuf>,
    ) -> Result<Self> {
        let mut lib = ReadLibrary::new("master", forward, reverse, singletons)?;
        if let (Some(f), Some(r)) = (&lib.forward, &lib.reverse) {
            check_pair_line_counts(f, r)?;
        }
        let source = match lib.libtype {
            LibraryType::Single => lib.singletons.as_deref(),
            _ => lib.forward.as_deref(),
        };
        if let Some(path) = source {
            lib.read_len = Some(estimate_read_length(path, READ_LENGTH_SAMPLE)?);
            debug!(
                "Estimated read length of {} bp from {}",
                lib.read_len.unwrap_or_default(),
                path.display()
            );
        }
        Ok(lib)
    }

    /// Copy of this library with absent or empty read files dropped.
    ///
    /// Returns `None` when no usable file remains.
    pub fn without_empty_files(&self) -> Option<ReadLibrary> {
        let keep = |slot: &Option<PathBuf>, which: &str| -> Option<PathBuf> {
            let path = slot.as_ref()?;
            if is_nonempty_file(path) {
                Some(path.clone())
            } else {
                warn!(
                    "{} read file {} is missing or empty and will not be used for mapping",
                    which,
                    path.display()
                );
                None
            }
        };
        let mut forward = keep(&self.forward, "forward");
        let mut reverse = keep(&self.reverse, "reverse");
        if forward.is_none() || reverse.is_none() {
            forward = None;
            reverse = None;
        }
        let singletons = keep(&self.singletons, "singleton");
        let libtype = classify(forward.is_some(), reverse.is_some(), singletons.is_some())?;
        Some(ReadLibrary {
            name: self.name.clone(),
            forward,
            reverse,
            singletons,
            libtype,
            read_len: self.read_len,
            distances: self.distances.clone(),
        })
    }

    /// All read files present in the library.
    pub fn files(&self) -> Vec<&Path> {
        [&self.forward, &self.reverse, &self.singletons]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect()
    }
}

fn classify(forward: bool, reverse: bool, singletons: bool) -> Option<LibraryType> {
    match (forward, reverse, singletons) {
        (true, true, false) => Some(LibraryType::Paired),
        (true, true, true) => Some(LibraryType::PairedWithSingletons),
        (false, false, true) => Some(LibraryType::Single),
        _ => None,
    }
}

/// Open a possibly gzip-compressed file.
pub fn open_maybe_gz(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to open read file '{}': {e}", path.display()),
        )
    })?;
    let is_gz = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if is_gz {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Mean length of the first `sample` reads of a FASTQ file.
pub fn estimate_read_length(path: &Path, sample: usize) -> Result<usize> {
    let reader = fastq::Reader::new(open_maybe_gz(path)?);
    let mut total = 0usize;
    let mut count = 0usize;
    for record in reader.records().take(sample) {
        let record = record.map_err(|e| {
            SeedError::config(format!(
                "could not parse FASTQ '{}': {e}",
                path.display()
            ))
        })?;
        total += record.seq().len();
        count += 1;
    }
    if count == 0 {
        return Err(SeedError::config(format!(
            "no reads found in '{}'",
            path.display()
        )));
    }
    Ok(total / count)
}

fn count_lines(path: &Path) -> io::Result<usize> {
    let reader = BufReader::new(open_maybe_gz(path)?);
    let mut n = 0;
    for line in reader.lines() {
        line?;
        n += 1;
    }
    Ok(n)
}

/// Paired files must hold the same number of lines.
pub fn check_pair_line_counts(forward: &Path, reverse: &Path) -> Result<()> {
    let (f, r) = (count_lines(forward)?, count_lines(reverse)?);
    if f != r {
        return Err(SeedError::config(format!(
            "input FASTQ files are of unequal length ({} has {f} lines, {} has {r}); \
             re-pair the reads before seeding",
            forward.display(),
            reverse.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_fastq(path: &Path, reads: &[&str]) {
        let mut f = File::create(path).unwrap();
        for (i, seq) in reads.iter().enumerate() {
            writeln!(f, "@read{}\n{}\n+\n{}", i, seq, "I".repeat(seq.len())).unwrap();
        }
    }

    #[test]
    fn test_libtype_classification() {
        let lib = ReadLibrary::new(
            "x",
            Some("f.fq".into()),
            Some("r.fq".into()),
            None,
        )
        .unwrap();
        assert_eq!(lib.libtype, LibraryType::Paired);

        let lib = ReadLibrary::new("x", None, None, Some("s.fq".into())).unwrap();
        assert_eq!(lib.libtype, LibraryType::Single);

        assert!(ReadLibrary::new("x", Some("f.fq".into()), None, None).is_err());
        assert!(ReadLibrary::new("x", None, None, None).is_err());
    }

    #[test]
    fn test_master_estimates_read_length_and_checks_pairs() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("r1.fq");
        let r = dir.path().join("r2.fq");
        write_fastq(&f, &["ACGTACGTAC", "ACGTACGTACGT"]);
        write_fastq(&r, &["ACGTACGTAC", "ACGTACGTAC"]);
        let lib = ReadLibrary::master(Some(f.clone()), Some(r.clone()), None).unwrap();
        assert_eq!(lib.read_len, Some(11));

        write_fastq(&r, &["ACGT"]);
        assert!(matches!(
            ReadLibrary::master(Some(f), Some(r), None),
            Err(SeedError::Configuration(_))
        ));
    }

    #[test]
    fn test_read_length_from_gzip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reads.fq.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(enc, "@a\nACGTACGT\n+\nIIIIIIII").unwrap();
        enc.finish().unwrap();
        assert_eq!(estimate_read_length(&path, 36).unwrap(), 8);
    }

    #[test]
    fn test_without_empty_files_drops_empty_singletons() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("r1.fq");
        let r = dir.path().join("r2.fq");
        let s = dir.path().join("s.fq");
        write_fastq(&f, &["ACGT"]);
        write_fastq(&r, &["ACGT"]);
        File::create(&s).unwrap();
        let lib = ReadLibrary::new("x", Some(f), Some(r), Some(s)).unwrap();
        assert_eq!(lib.libtype, LibraryType::PairedWithSingletons);
        let cleaned = lib.without_empty_files().unwrap();
        assert_eq!(cleaned.libtype, LibraryType::Paired);
        assert!(cleaned.singletons.is_none());
    }

    #[test]
    fn test_without_empty_files_none_when_nothing_left() {
        let dir = TempDir::new().unwrap();
        let s = dir.path().join("s.fq");
        File::create(&s).unwrap();
        let lib = ReadLibrary::new("x", None, None, Some(s)).unwrap();
        assert!(lib.without_empty_files().is_none());
    }
}
