
use log::{debug, warn};
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;

use crate::coverage_mask::CoverageMask;
use crate::data_types::regions::Region;
use crate::realign::Realigner;
use crate::reconciler::{ColumnOutcome, PositionReconciler};
use crate::variant_lookup::VariantLookup;

/// The finished alignment for one region: equal-length sequences in sample order,
/// labeled with the resolved (possibly clamped) 1-based coordinate span.
#[derive(Debug)]
pub struct RegionAlignment {
    /// The logical region name, used for the output filename
    region_name: String,
    /// The contig of the region
    contig: String,
    /// The resolved first position, 1-based inclusive
    start: u64,
    /// The resolved last position, 1-based inclusive
    end: u64,
    /// One (sample, sequence) entry per sample, in sample order
    records: Vec<(String, String)>
}

impl RegionAlignment {
    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn records(&self) -> &[(String, String)] {
        &self.records
    }

    /// The FASTA header label for one sample: `<contig>:<start>-<end>_<sample>`
    pub fn sample_label(&self, sample: &str) -> String {
        format!("{}:{}-{}_{}", self.contig, self.start, self.end, sample)
    }
}

/// Counters collected while assembling one region
#[derive(Clone, Debug, Default)]
pub struct RegionStats {
    /// The number of reference positions processed
    pub num_positions: u64,
    /// The final alignment width (sum of all column widths)
    pub alignment_width: u64,
    /// The number of columns that went through the external aligner
    pub realigned_columns: u64,
    /// The number of columns where the external aligner failed and the unaligned column was kept
    pub realignment_failures: u64,
    /// The number of sample calls replaced by the coverage mask
    pub masked_calls: u64
}

/// Drives the position loop for one region: clamps bounds, reconciles every position in
/// order, and accumulates per-sample output buffers. Buffers are owned per region and
/// discarded once the alignment is returned.
pub struct RegionAssembler<'a, V: VariantLookup, R: Realigner> {
    /// Builds one rectangular column per position
    reconciler: PositionReconciler<'a, V, R>,
    /// The fixed sample set, in output order
    sample_names: &'a [String],
    /// If true, an end-of-region invariant violation aborts instead of warning
    strict: bool
}

impl<'a, V: VariantLookup, R: Realigner> RegionAssembler<'a, V, R> {
    /// # Arguments
    /// * `variant_lookup` - source of variant records
    /// * `coverage_mask` - per-sample low-coverage positions
    /// * `realigner` - invoked for columns with length conflicts
    /// * `sample_names` - the fixed sample set, in output order
    /// * `indel_priority` - if true, indel calls beat competing single-base calls
    /// * `strict` - if true, rectangularity violations abort the region
    pub fn new(
        variant_lookup: &'a V, coverage_mask: &'a CoverageMask, realigner: &'a R,
        sample_names: &'a [String], indel_priority: bool, strict: bool
    ) -> RegionAssembler<'a, V, R> {
        let reconciler = PositionReconciler::new(
            variant_lookup, coverage_mask, realigner, sample_names, indel_priority, strict
        );
        RegionAssembler {
            reconciler,
            sample_names,
            strict
        }
    }

    /// Assembles the alignment for one region against its contig sequence.
    /// Region bounds beyond the sequence fall back to the full-sequence span with a warning.
    /// # Arguments
    /// * `region` - the region to process
    /// * `reference` - the full reference sequence of the region's contig
    /// # Errors
    /// * if any position fails to reconcile
    /// * in strict mode, if the final buffers violate the rectangularity invariant
    pub fn assemble(&self, region: &Region, reference: &[u8]) -> Result<(RegionAlignment, RegionStats), Box<dyn std::error::Error>> {
        let sequence_len: u64 = reference.len() as u64;
        let (zstart, zend): (u64, u64) = {
            let zstart: u64 = region.start() - 1;
            let zend: u64 = region.end();
            if zstart >= sequence_len || zend > sequence_len {
                warn!("Region {:?} is outside the bounds of contig {:?} ({} bp), using the full contig.",
                    region, region.contig(), sequence_len);
                (0, sequence_len)
            } else {
                (zstart, zend)
            }
        };
        debug!("Assembling {:?} over 0-based span [{}, {})...", region, zstart, zend);

        let mut buffers: HashMap<&str, String> = self.sample_names.iter()
            .map(|sample_name| (sample_name.as_str(), String::new()))
            .collect();
        let mut stats: RegionStats = Default::default();

        // positions must run in increasing order, buffer appends depend on it
        for position in zstart..zend {
            let outcome: ColumnOutcome = self.reconciler.reconcile(region.contig(), position, reference)?;
            for sample_name in self.sample_names.iter() {
                let value = outcome.column.get(sample_name)
                    .expect("reconciler yields a value for every sample");
                buffers.get_mut(sample_name.as_str()).unwrap().push_str(value);
            }

            stats.num_positions += 1;
            stats.alignment_width += outcome.width as u64;
            if outcome.realigned {
                stats.realigned_columns += 1;
            }
            if outcome.realign_failed {
                stats.realignment_failures += 1;
            }
            stats.masked_calls += outcome.masked_samples;
        }

        // every buffer must have the same final length, equal to the sum of column widths
        let consistent: bool = self.sample_names.iter()
            .all(|sample_name| buffers[sample_name.as_str()].len() as u64 == stats.alignment_width);
        if !consistent {
            let lengths: Vec<(&str, usize)> = self.sample_names.iter()
                .map(|sample_name| (sample_name.as_str(), buffers[sample_name.as_str()].len()))
                .collect();
            if self.strict {
                bail!("Output buffers for region {:?} are inconsistent (expected width {}): {:?}",
                    region, stats.alignment_width, lengths);
            }
            warn!("Output buffers for region {:?} are inconsistent (expected width {}): {:?}",
                region, stats.alignment_width, lengths);
        }

        let records: Vec<(String, String)> = self.sample_names.iter()
            .map(|sample_name| (sample_name.clone(), buffers.remove(sample_name.as_str()).unwrap()))
            .collect();

        Ok((
            RegionAlignment {
                region_name: region.name().to_string(),
                contig: region.contig().to_string(),
                start: zstart + 1,
                end: zend,
                records
            },
            stats
        ))
    }
}
