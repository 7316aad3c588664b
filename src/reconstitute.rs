use crate::assembly::read_first_record;
use crate::error::Result;
use bio::io::fasta;
use std::path::{Path, PathBuf};

/// Where a region's contig sits inside a faux genome. 1-based, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub region: usize,
    pub start: i64,
    pub end: i64,
}

/// A synthetic reference stitched from surviving contigs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FauxGenome {
    pub path: PathBuf,
    pub sequence_id: String,
    pub length: usize,
    pub placements: Vec<Placement>,
}

/// Lay out `N`-buffer + contig for each entry, followed by a trailing buffer.
///
/// Returns the placements and the total length.
pub fn layout(contigs: &[(usize, usize)], buffer_len: usize) -> (Vec<Placement>, usize) {
    let mut offset = 0usize;
    let mut placements = Vec::with_capacity(contigs.len());
    for &(region, len) in contigs {
        offset += buffer_len;
        placements.push(Placement {
            region,
            start: offset as i64 + 1,
            end: (offset + len) as i64,
        });
        offset += len;
    }
    (placements, offset + buffer_len)
}

/// Concatenate the first record of each contig file into a single buffered sequence.
///
/// `None` means nothing survived and no genome was written.
pub fn reconstitute(
    contigs: &[(usize, PathBuf)],
    buffer_len: usize,
    sequence_id: &str,
    output: &Path,
) -> Result<Option<FauxGenome>> {
    if contigs.is_empty() {
        return Ok(None);
    }

    let mut seqs = Vec::with_capacity(contigs.len());
    for (region, path) in contigs {
        let record = read_first_record(path)?;
        seqs.push((*region, record.seq().to_vec()));
    }
    let lengths: Vec<(usize, usize)> = seqs.iter().map(|(r, s)| (*r, s.len())).collect();
    let (placements, length) = layout(&lengths, buffer_len);

    let buffer = vec![b'N'; buffer_len];
    let mut genome = Vec::with_capacity(length);
    for (_, seq) in &seqs {
        genome.extend_from_slice(&buffer);
        genome.extend_from_slice(seq);
    }
    genome.extend_from_slice(&buffer);

    let mut writer = fasta::Writer::to_file(output)?;
    writer.write(sequence_id, None, &genome)?;
    writer.flush()?;

    Ok(Some(FauxGenome {
        path: output.to_path_buf(),
        sequence_id: sequence_id.to_string(),
        length,
        placements,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_layout_offsets() {
        let (placements, len) = layout(&[(0, 10), (3, 5)], 4);
        assert_eq!(
            placements,
            vec![
                Placement {
                    region: 0,
                    start: 5,
                    end: 14
                },
                Placement {
                    region: 3,
                    start: 19,
                    end: 23
                },
            ]
        );
        assert_eq!(len, 27);
    }

    #[test]
    fn test_reconstitute_single_survivor() {
        let dir = TempDir::new().unwrap();
        let contig = dir.path().join("contig.fasta");
        fs::write(&contig, ">c\nACGTACGT\n>shorter\nAC\n").unwrap();
        let out = dir.path().join("genome.fasta");
        let genome = reconstitute(&[(1, contig)], 5, "riboSeed_iter_1", &out)
            .unwrap()
            .unwrap();
        assert_eq!(genome.placements.len(), 1);
        assert_eq!(genome.length, 18);

        let record = read_first_record(&out).unwrap();
        assert_eq!(record.id(), "riboSeed_iter_1");
        assert_eq!(record.seq(), b"NNNNNACGTACGTNNNNN");
        let p = genome.placements[0];
        assert_eq!(&record.seq()[(p.start - 1) as usize..p.end as usize], b"ACGTACGT");
    }

    #[test]
    fn test_reconstitute_nothing_survives() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("genome.fasta");
        assert!(reconstitute(&[], 5, "x", &out).unwrap().is_none());
        assert!(!out.exists());
    }
}
