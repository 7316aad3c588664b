use crate::evaluate::{Outcome, StopReason};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Something that happened during a seeding run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    IterationStarted {
        iteration: usize,
        active_regions: usize,
        reference: PathBuf,
    },
    RegionRange {
        region: usize,
        iteration: usize,
        sequence: String,
        start: i64,
        end: i64,
    },
    LociOutOfOrder {
        region: usize,
    },
    MappingFinished {
        iteration: usize,
        claimed_reads: usize,
        unmapped_reads: usize,
    },
    FlankCoverage {
        region: usize,
        iteration: usize,
        upstream: f64,
        downstream: f64,
    },
    AssemblySkipped {
        region: usize,
        iteration: usize,
        reason: String,
    },
    RegionEvaluated {
        region: usize,
        iteration: usize,
        contig_len: Option<usize>,
        outcome: Outcome,
    },
    RegionFailed {
        region: usize,
        iteration: usize,
        message: String,
    },
    GenomeReconstituted {
        iteration: usize,
        path: PathBuf,
        contigs: usize,
        length: usize,
    },
    ArtifactsPurged {
        iteration: usize,
        files: usize,
    },
    FinalContigs {
        path: PathBuf,
        contigs: usize,
    },
    FinalAssembly {
        name: String,
        success: bool,
        message: Option<String>,
    },
}

/// Receives events from the iteration core and decides how to present them.
pub trait Observer: Sync {
    fn notify(&self, event: &RunEvent);
}

/// Renders events through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::IterationStarted {
                iteration,
                active_regions,
                reference,
            } => info!(
                "Iteration {}: seeding {} region(s) against {}",
                iteration,
                active_regions,
                reference.display()
            ),
            RunEvent::RegionRange {
                region,
                iteration,
                sequence,
                start,
                end,
            } => debug!(
                "Region {} (iteration {}): extracting {}:{}-{}",
                region, iteration, sequence, start, end
            ),
            RunEvent::LociOutOfOrder { region } => warn!(
                "Loci in region {} are not in increasing order; using the outermost coordinates",
                region
            ),
            RunEvent::MappingFinished {
                iteration,
                claimed_reads,
                unmapped_reads,
            } => info!(
                "Iteration {}: {} read(s) claimed by regions, {} left for the next round",
                iteration, claimed_reads, unmapped_reads
            ),
            RunEvent::FlankCoverage {
                region,
                iteration,
                upstream,
                downstream,
            } => info!(
                "Region {} (iteration {}): mean flank coverage 5' {:.2}x, 3' {:.2}x",
                region, iteration, upstream, downstream
            ),
            RunEvent::AssemblySkipped {
                region,
                iteration,
                reason,
            } => warn!(
                "Region {} (iteration {}): assembly skipped: {}",
                region, iteration, reason
            ),
            RunEvent::RegionEvaluated {
                region,
                iteration,
                contig_len,
                outcome,
            } => {
                let len = contig_len.map_or_else(|| "no".to_string(), |l| format!("{l} bp"));
                match outcome {
                    Outcome::Continue => info!(
                        "Region {} (iteration {}): {} contig, continuing",
                        region, iteration, len
                    ),
                    Outcome::Stop(StopReason::ShortAccepted) => warn!(
                        "Region {} (iteration {}): {} contig is below the minimum length; keeping it and stopping",
                        region, iteration, len
                    ),
                    Outcome::Stop(reason) => info!(
                        "Region {} (iteration {}): {} contig, stopping ({})",
                        region, iteration, len, reason
                    ),
                    Outcome::Exclude(reason) => warn!(
                        "Region {} (iteration {}): {} contig, excluded ({})",
                        region, iteration, len, reason
                    ),
                    Outcome::Fatal(reason) => warn!(
                        "Region {} (iteration {}): assembly failed ({})",
                        region, iteration, reason
                    ),
                }
            }
            RunEvent::RegionFailed {
                region,
                iteration,
                message,
            } => warn!(
                "Region {} (iteration {}) excluded: {}",
                region, iteration, message
            ),
            RunEvent::GenomeReconstituted {
                iteration,
                path,
                contigs,
                length,
            } => info!(
                "Iteration {}: faux genome of {} contig(s), {} bp, written to {}",
                iteration,
                contigs,
                length,
                path.display()
            ),
            RunEvent::ArtifactsPurged { iteration, files } => debug!(
                "Removed {} intermediate file(s) from iteration {}",
                files, iteration
            ),
            RunEvent::FinalContigs { path, contigs } => info!(
                "Wrote {} seeded contig(s) to {}",
                contigs,
                path.display()
            ),
            RunEvent::FinalAssembly {
                name,
                success,
                message,
            } => {
                if *success {
                    info!("Final assembly '{}' finished", name);
                } else {
                    warn!(
                        "Final assembly '{}' failed: {}",
                        name,
                        message.as_deref().unwrap_or("no contigs produced")
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects events for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub events: Mutex<Vec<RunEvent>>,
    }

    impl Observer for RecordingObserver {
        fn notify(&self, event: &RunEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::default();
        observer.notify(&RunEvent::LociOutOfOrder { region: 1 });
        observer.notify(&RunEvent::ArtifactsPurged {
            iteration: 0,
            files: 3,
        });
        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RunEvent::LociOutOfOrder { region: 1 });
    }

    #[test]
    fn test_log_observer_handles_every_outcome() {
        let observer = LogObserver;
        for outcome in [
            Outcome::Continue,
            Outcome::Stop(crate::evaluate::StopReason::Plateau),
            Outcome::Exclude(crate::evaluate::ExcludeReason::TooShort),
            Outcome::Fatal(crate::evaluate::FatalReason::NoOutput),
        ] {
            observer.notify(&RunEvent::RegionEvaluated {
                region: 0,
                iteration: 0,
                contig_len: Some(10),
                outcome,
            });
        }
    }
}
