use crate::config::Flank;
use crate::error::{Result, SeedError};
use bio::io::fasta;
use gb_io::seq::Location;
use log::debug;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::path::Path;

/// One annotated feature of interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locus {
    pub index: usize,
    pub sequence_id: String,
    pub tag: String,
    /// +1 or -1
    pub strand: i8,
    /// 1-based, inclusive.
    pub start: i64,
    pub end: i64,
    pub product: String,
}

/// A cluster of loci seeded and extended together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub index: usize,
    pub sequence_id: String,
    pub loci: Vec<Locus>,
    /// Shift applied to every locus when the record was padded for circularity.
    pub padding: usize,
}

impl Region {
    /// `<sequence>_cluster_<index>`, used for contig names and directories.
    pub fn name(&self) -> String {
        format!("{}_cluster_{}", self.sequence_id, self.index)
    }

    pub fn loci_in_order(&self) -> bool {
        self.loci.windows(2).all(|w| w[0].start <= w[1].start)
    }

    /// Extraction range for the first iteration: the outermost loci widened by
    /// the flank and clamped to `[1, seq_len]`. The flag is set when clamping happened.
    pub fn initial_range(&self, flank: Flank, seq_len: usize) -> (i64, i64, bool) {
        let min_start = self.loci.iter().map(|l| l.start).min().unwrap_or(1);
        let max_end = self.loci.iter().map(|l| l.end).max().unwrap_or(1);
        let mut clamped = false;
        let mut start = min_start - flank.upstream;
        if start < 1 {
            start = 1;
            clamped = true;
        }
        let mut end = max_end + flank.downstream;
        if end > seq_len as i64 {
            end = seq_len as i64;
            clamped = true;
        }
        (start, end, clamped)
    }
}

/// One non-comment line of a cluster file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterLine {
    pub sequence_id: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterFile {
    /// Annotation feature type the tags refer to.
    pub feature: String,
    pub clusters: Vec<ClusterLine>,
}

impl ClusterFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if matches!(ext.as_str(), "gb" | "gbk" | "genbank") {
            return Err(SeedError::config(format!(
                "cluster file '{}' looks like a GenBank file; check the argument order",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            SeedError::config(format!(
                "could not read cluster file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&text)
    }

    /// Parse `<seqid> <tag1:tag2:...>` lines under a required `#$ FEATURE <type>` header.
    pub fn parse(text: &str) -> Result<Self> {
        let header = Regex::new(r"^#\$\s+FEATURE\s+(\S+)\s*$")
            .map_err(|e| SeedError::config(format!("bad header pattern: {e}")))?;
        let mut feature = None;
        let mut clusters = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(caps) = header.captures(line) {
                feature = Some(caps[1].to_string());
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [seqid, tags] = fields.as_slice() else {
                return Err(SeedError::config(format!(
                    "cluster file line {}: expected '<sequence_id> <tag1:tag2:...>', got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let tags: Vec<String> = tags.split(':').map(str::to_string).collect();
            if tags.iter().any(String::is_empty) {
                return Err(SeedError::config(format!(
                    "cluster file line {}: empty locus tag in '{}'",
                    lineno + 1,
                    line
                )));
            }
            clusters.push(ClusterLine {
                sequence_id: seqid.to_string(),
                tags,
            });
        }

        let feature = feature.ok_or_else(|| {
            SeedError::config("cluster file is missing the '#$ FEATURE <type>' header line")
        })?;
        if clusters.is_empty() {
            return Err(SeedError::config("cluster file contains no clusters"));
        }
        Ok(ClusterFile { feature, clusters })
    }
}

/// A feature as the catalog needs it. Coordinates are 0-based, end-exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedFeature {
    pub kind: String,
    pub locus_tag: Option<String>,
    pub product: Option<String>,
    pub start: i64,
    pub end: i64,
    pub strand: i8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub features: Vec<AnnotatedFeature>,
}

/// Random access to annotated records by sequence identifier.
pub trait AnnotationSource {
    fn record(&self, id: &str) -> Option<&AnnotatedRecord>;
    fn records(&self) -> &[AnnotatedRecord];
}

/// A multi-record GenBank reference.
#[derive(Clone, Debug, Default)]
pub struct GenBankReference {
    records: Vec<AnnotatedRecord>,
    by_id: FxHashMap<String, usize>,
}

impl GenBankReference {
    pub fn from_path(path: &Path) -> Result<Self> {
        let seqs = gb_io::reader::parse_file(path).map_err(|e| {
            SeedError::config(format!(
                "could not parse GenBank file '{}': {e}",
                path.display()
            ))
        })?;
        let mut aliases = Vec::new();
        let mut records = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let names: Vec<String> = [&seq.version, &seq.accession, &seq.name]
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            let Some(id) = names.first().cloned() else {
                return Err(SeedError::config(format!(
                    "GenBank record without a name in '{}'",
                    path.display()
                )));
            };
            let features = seq
                .features
                .iter()
                .filter_map(|f| {
                    let (start, end) = f.location.find_bounds().ok()?;
                    let first = |key: &str| f.qualifier_values(key.into()).next().map(str::to_string);
                    Some(AnnotatedFeature {
                        kind: f.kind.to_string(),
                        locus_tag: first("locus_tag"),
                        product: first("product"),
                        start,
                        end,
                        strand: if matches!(f.location, Location::Complement(_)) {
                            -1
                        } else {
                            1
                        },
                    })
                })
                .collect();
            aliases.push(names);
            records.push(AnnotatedRecord {
                id,
                seq: seq.seq,
                features,
            });
        }
        let mut reference = Self::from_records(records);
        for (i, names) in aliases.into_iter().enumerate() {
            for name in names {
                reference.by_id.entry(name).or_insert(i);
            }
        }
        debug!(
            "Loaded {} GenBank record(s) from {}",
            reference.records.len(),
            path.display()
        );
        Ok(reference)
    }

    pub fn from_records(records: Vec<AnnotatedRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        GenBankReference { records, by_id }
    }
}

impl AnnotationSource for GenBankReference {
    fn record(&self, id: &str) -> Option<&AnnotatedRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    fn records(&self) -> &[AnnotatedRecord] {
        &self.records
    }
}

/// The run's regions together with the sequences they live on.
#[derive(Clone, Debug)]
pub struct RegionCatalog {
    pub feature: String,
    pub regions: Vec<Region>,
    /// Mapping-target sequences keyed by the region sequence identifiers, padded when circular.
    pub sequences: Vec<(String, Vec<u8>)>,
}

impl RegionCatalog {
    /// Resolve every cluster's tags against the annotation.
    pub fn build(
        clusters: &ClusterFile,
        annotation: &dyn AnnotationSource,
        padding: Option<usize>,
    ) -> Result<Self> {
        let mut regions = Vec::with_capacity(clusters.clusters.len());
        for (index, line) in clusters.clusters.iter().enumerate() {
            let record = annotation.record(&line.sequence_id).ok_or_else(|| {
                SeedError::config(format!(
                    "sequence '{}' from the cluster file is not in the reference",
                    line.sequence_id
                ))
            })?;
            let mut loci = Vec::with_capacity(line.tags.len());
            for (i, tag) in line.tags.iter().enumerate() {
                let feature = record
                    .features
                    .iter()
                    .filter(|f| f.kind == clusters.feature)
                    .find(|f| f.locus_tag.as_deref() == Some(tag.as_str()))
                    .ok_or_else(|| {
                        SeedError::config(format!(
                            "locus tag '{}' ({} feature) not found on sequence '{}'",
                            tag, clusters.feature, line.sequence_id
                        ))
                    })?;
                loci.push(Locus {
                    index: i,
                    sequence_id: line.sequence_id.clone(),
                    tag: tag.clone(),
                    strand: feature.strand,
                    start: feature.start + 1,
                    end: feature.end,
                    product: feature.product.clone().unwrap_or_default(),
                });
            }
            if loci.is_empty() {
                return Err(SeedError::config(format!(
                    "region {} on '{}' has no annotated loci",
                    index, line.sequence_id
                )));
            }
            regions.push(Region {
                index,
                sequence_id: line.sequence_id.clone(),
                loci,
                padding: 0,
            });
        }

        let mut sequences: Vec<(String, Vec<u8>)> = annotation
            .records()
            .iter()
            .map(|r| (r.id.clone(), r.seq.clone()))
            .collect();
        for region in &mut regions {
            if let Some(rec) = annotation.record(&region.sequence_id) {
                region.sequence_id = rec.id.clone();
                for locus in &mut region.loci {
                    locus.sequence_id = rec.id.clone();
                }
            }
        }

        if let Some(padding) = padding {
            for (id, seq) in &mut sequences {
                *seq = pad_circular(seq, padding).ok_or_else(|| {
                    SeedError::config(format!(
                        "padding of {} bp is longer than sequence '{}' ({} bp)",
                        padding,
                        id,
                        seq.len()
                    ))
                })?;
            }
            for region in &mut regions {
                region.padding = padding;
                for locus in &mut region.loci {
                    locus.start += padding as i64;
                    locus.end += padding as i64;
                }
            }
        }

        Ok(RegionCatalog {
            feature: clusters.feature.clone(),
            regions,
            sequences,
        })
    }

    /// Write every (possibly padded) sequence as the first mapping target.
    pub fn write_reference_fasta(&self, path: &Path) -> Result<()> {
        let mut writer = fasta::Writer::to_file(path)?;
        for (id, seq) in &self.sequences {
            writer.write(id, None, seq)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Last `padding` bases + sequence + first `padding` bases.
pub fn pad_circular(seq: &[u8], padding: usize) -> Option<Vec<u8>> {
    if padding > seq.len() {
        return None;
    }
    let mut padded = Vec::with_capacity(seq.len() + 2 * padding);
    padded.extend_from_slice(&seq[seq.len() - padding..]);
    padded.extend_from_slice(seq);
    padded.extend_from_slice(&seq[..padding]);
    Some(padded)
}
