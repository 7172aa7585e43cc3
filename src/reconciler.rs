
use log::warn;
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;

use crate::consensus::{genotype_resolve, GAP_CHAR, MASK_CHAR};
use crate::coverage_mask::CoverageMask;
use crate::realign::Realigner;
use crate::variant_lookup::{VariantLookup, VariantRecord};

/// An ephemeral mapping from sample to resolved allele string for one nucleotide position
pub type PositionColumn = HashMap<String, String>;

/// The finalized column for one position, plus bookkeeping for region-level statistics
#[derive(Debug)]
pub struct ColumnOutcome {
    /// sample -> resolved allele string; rectangular unless a lenient-mode violation was logged
    pub column: PositionColumn,
    /// The width of the column (maximum value length)
    pub width: usize,
    /// True if the external aligner was invoked for this column
    pub realigned: bool,
    /// True if the external aligner was invoked but failed, leaving the column unaligned
    pub realign_failed: bool,
    /// The number of samples masked at this position
    pub masked_samples: u64
}

/// Produces one rectangular position column for all samples at one absolute position.
/// All collaborators are read-only; columns are created and discarded per position.
pub struct PositionReconciler<'a, V: VariantLookup, R: Realigner> {
    /// Source of variant records overlapping a position
    variant_lookup: &'a V,
    /// Per-sample low-coverage positions; mask takes precedence over calls and alignment gaps
    coverage_mask: &'a CoverageMask,
    /// Invoked only when resolved values disagree in length
    realigner: &'a R,
    /// The fixed sample set, in output order
    sample_names: &'a [String],
    /// If true, indel calls take precedence over competing single-base calls
    indel_priority: bool,
    /// If true, a rectangularity violation aborts instead of warning
    strict: bool
}

impl<'a, V: VariantLookup, R: Realigner> PositionReconciler<'a, V, R> {
    pub fn new(
        variant_lookup: &'a V, coverage_mask: &'a CoverageMask, realigner: &'a R,
        sample_names: &'a [String], indel_priority: bool, strict: bool
    ) -> PositionReconciler<'a, V, R> {
        PositionReconciler {
            variant_lookup,
            coverage_mask,
            realigner,
            sample_names,
            indel_priority,
            strict
        }
    }

    /// Builds the finalized column for one position.
    /// # Arguments
    /// * `contig` - the contig being processed
    /// * `position` - the 0-based position within the contig
    /// * `reference` - the full reference sequence of the contig
    /// # Errors
    /// * if the variant lookup fails
    /// * if genotype resolution hits an unknown ambiguity combination (fatal data fault)
    /// * in strict mode, if the finalized column is not rectangular
    pub fn reconcile(&self, contig: &str, position: u64, reference: &[u8]) -> Result<ColumnOutcome, Box<dyn std::error::Error>> {
        let records: Vec<VariantRecord> = self.variant_lookup.fetch(contig, position)?;

        // fold every overlapping record into one accumulated call set per sample;
        // the lookup may return records at adjacent positions, so cross-check POS
        let mut reference_allele: Option<String> = None;
        let mut raw_calls: HashMap<&str, Vec<String>> = Default::default();
        for record in records.iter() {
            if record.position != position + 1 {
                continue;
            }
            match reference_allele.as_ref() {
                Some(reference_seen) => {
                    if reference_seen != &record.reference_allele {
                        warn!("Reference alleles don't match at position {} (contig {}): {:?} vs. {:?}",
                            record.position, contig, reference_seen, record.reference_allele);
                    }
                },
                None => {
                    reference_allele = Some(record.reference_allele.clone());
                }
            };
            for sample_name in self.sample_names.iter() {
                if let Some(alleles) = record.sample_calls.get(sample_name) {
                    raw_calls.entry(sample_name).or_default().extend(alleles.iter().cloned());
                }
            }
        }

        let mut column: PositionColumn = Default::default();
        let mut masked_samples: u64 = 0;
        for sample_name in self.sample_names.iter() {
            if let Some(alleles) = raw_calls.get(sample_name.as_str()) {
                let resolved: String = genotype_resolve(alleles, self.indel_priority)?;
                column.insert(sample_name.clone(), resolved);
            }
        }

        // mask takes precedence over any call at this position
        for sample_name in self.sample_names.iter() {
            if self.coverage_mask.is_masked(sample_name, contig, position) {
                column.insert(sample_name.clone(), MASK_CHAR.to_string());
                masked_samples += 1;
            }
        }

        // anything still unset gets the reference allele, or the reference base if no record was seen
        for sample_name in self.sample_names.iter() {
            if !column.contains_key(sample_name) {
                let fallback: String = match reference_allele.as_ref() {
                    Some(reference_seen) => reference_seen.clone(),
                    None => {
                        match reference.get(position as usize) {
                            Some(&base) => (base as char).to_string(),
                            None => {
                                bail!("Position {} is beyond the reference sequence for contig {:?}", position, contig);
                            }
                        }
                    }
                };
                column.insert(sample_name.clone(), fallback);
            }
        }

        // indels leave the samples disagreeing in length, which is the only realignment trigger
        let needs_alignment: bool = {
            let mut lengths = column.values().map(|value| value.len());
            let first_length: usize = lengths.next().unwrap_or(0);
            lengths.any(|length| length != first_length)
        };

        let mut realign_failed: bool = false;
        if needs_alignment {
            let ordered_column: Vec<(String, String)> = self.sample_names.iter()
                .filter_map(|sample_name| {
                    column.get(sample_name).map(|value| (sample_name.clone(), value.clone()))
                })
                .collect();
            match self.realigner.realign(&ordered_column) {
                Ok(aligned) => {
                    // adopt the aligner's output wholesale; dropped samples are repaired below
                    column = aligned.into_iter().collect();
                },
                Err(e) => {
                    // non-fatal, retain the pre-alignment column
                    warn!("Realignment failed at {}:{}, keeping unaligned column: {}", contig, position + 1, e);
                    realign_failed = true;
                }
            };
        }

        // re-apply masking at the realigned width and repair samples the aligner dropped
        let width: usize = column.values().map(|value| value.len()).max().unwrap_or(1).max(1);
        for sample_name in self.sample_names.iter() {
            if self.coverage_mask.is_masked(sample_name, contig, position) {
                column.insert(sample_name.clone(), MASK_CHAR.to_string().repeat(width));
            } else if !column.contains_key(sample_name) {
                // the sample was a multiple-nucleotide deletion
                column.insert(sample_name.clone(), GAP_CHAR.to_string().repeat(width));
            }
        }

        let rectangular: bool = self.sample_names.iter()
            .all(|sample_name| {
                column.get(sample_name).map(|value| value.len()) == Some(width)
            });
        if !rectangular {
            if self.strict {
                bail!("Non-rectangular column at {}:{}: {:?}", contig, position + 1, column);
            }
            warn!("Non-rectangular column at {}:{}: {:?}", contig, position + 1, column);
        }

        Ok(ColumnOutcome {
            column,
            width,
            realigned: needs_alignment && !realign_failed,
            realign_failed,
            masked_samples
        })
    }
}

#[cfg(test)]
pub mod test_util {
    use super::*;

    /// Lookup over a fixed set of records, keyed by (contig, 0-based position)
    #[derive(Default)]
    pub struct MockLookup {
        pub records: HashMap<(String, u64), Vec<VariantRecord>>
    }

    impl MockLookup {
        pub fn insert(&mut self, contig: &str, position: u64, record: VariantRecord) {
            self.records.entry((contig.to_string(), position)).or_default().push(record);
        }
    }

    impl VariantLookup for MockLookup {
        fn fetch(&self, contig: &str, position: u64) -> Result<Vec<VariantRecord>, Box<dyn std::error::Error>> {
            Ok(self.records.get(&(contig.to_string(), position)).cloned().unwrap_or_default())
        }
    }

    /// Realigner that must never run; equal-length columns are not supposed to reach it
    pub struct PanicRealigner;

    impl Realigner for PanicRealigner {
        fn realign(&self, column: &[(String, String)]) -> Result<Vec<(String, String)>, crate::realign::RealignError> {
            panic!("realigner invoked for column {column:?}");
        }
    }

    /// Realigner returning a canned response
    pub struct FixedRealigner {
        pub response: Vec<(String, String)>
    }

    impl Realigner for FixedRealigner {
        fn realign(&self, _column: &[(String, String)]) -> Result<Vec<(String, String)>, crate::realign::RealignError> {
            Ok(self.response.clone())
        }
    }

    /// Realigner that always fails
    pub struct FailingRealigner;

    impl Realigner for FailingRealigner {
        fn realign(&self, _column: &[(String, String)]) -> Result<Vec<(String, String)>, crate::realign::RealignError> {
            Err(crate::realign::RealignError::OutputParse { message: "mock failure".to_string() })
        }
    }

    /// Shorthand for building a VariantRecord
    pub fn make_record(position: u64, reference_allele: &str, calls: &[(&str, &[&str])]) -> VariantRecord {
        let mut sample_calls: HashMap<String, Vec<String>> = Default::default();
        for &(sample, alleles) in calls.iter() {
            sample_calls.insert(
                sample.to_string(),
                alleles.iter().map(|a| a.to_string()).collect()
            );
        }
        VariantRecord {
            position,
            reference_allele: reference_allele.to_string(),
            sample_calls
        }
    }

    pub fn samples(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    const REFERENCE: &[u8] = b"ACGTACGT";

    fn column_value(outcome: &ColumnOutcome, sample: &str) -> String {
        outcome.column.get(sample).unwrap().clone()
    }

    #[test]
    fn test_heterozygous_and_reference_fallback() {
        let sample_names = samples(&["S1", "S2"]);
        let mut lookup = MockLookup::default();
        // chr1:3 (1-based), S1 is het G/T, S2 has no call
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["G", "T"])]));
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "K");
        assert_eq!(column_value(&outcome, "S2"), "G");
        assert_eq!(outcome.width, 1);
        assert!(!outcome.realigned);
    }

    #[test]
    fn test_no_records_uses_reference_base() {
        let sample_names = samples(&["S1", "S2"]);
        let lookup = MockLookup::default();
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 4, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "A");
        assert_eq!(column_value(&outcome, "S2"), "A");
    }

    #[test]
    fn test_mask_overrides_call() {
        let sample_names = samples(&["S1"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["G", "T"])]));
        let mut mask = CoverageMask::default();
        mask.add_pileup("S1", std::io::Cursor::new("chr1\t3\tG\t0\t*\t*\n"), 1, std::path::Path::new("S1.pileup")).unwrap();
        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "N");
        assert_eq!(outcome.masked_samples, 1);
    }

    #[test]
    fn test_pos_cross_check_skips_adjacent_records() {
        let sample_names = samples(&["S1"]);
        let mut lookup = MockLookup::default();
        // an overlapping deletion anchored one position earlier leaks into the fetch
        lookup.insert("chr1", 2, make_record(2, "CG", &[("S1", &["CG", "C"])]));
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        // the record is ignored, so the sample falls back to the reference base
        assert_eq!(column_value(&outcome, "S1"), "G");
    }

    #[test]
    fn test_multiple_records_fold_into_one_call() {
        let sample_names = samples(&["S1"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["G", "T"])]));
        // second representation at the same position adds another allele; ref allele disagrees (warn only)
        lookup.insert("chr1", 2, make_record(3, "GA", &[("S1", &["A"])]));
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        // accumulated alleles G, T, A resolve to the three-base ambiguity code D
        assert_eq!(column_value(&outcome, "S1"), "D");
    }

    #[test]
    fn test_indel_column_realigned() {
        let sample_names = samples(&["S1", "S2", "S3"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "GAT"])]));
        let mask = CoverageMask::default();
        let realigner = FixedRealigner {
            response: vec![
                ("S1".to_string(), "GAT".to_string()),
                ("S2".to_string(), "G--".to_string()),
                ("S3".to_string(), "G--".to_string())
            ]
        };
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "GAT");
        assert_eq!(column_value(&outcome, "S2"), "G--");
        assert_eq!(outcome.width, 3);
        assert!(outcome.realigned);
        assert!(!outcome.realign_failed);
    }

    #[test]
    fn test_mask_beats_alignment_gaps() {
        let sample_names = samples(&["S1", "S2"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "GAT"]), ("S2", &["G", "T"])]));
        let mut mask = CoverageMask::default();
        mask.add_pileup("S2", std::io::Cursor::new("chr1\t3\tG\t0\t*\t*\n"), 1, std::path::Path::new("S2.pileup")).unwrap();
        let realigner = FixedRealigner {
            response: vec![
                ("S1".to_string(), "GAT".to_string()),
                ("S2".to_string(), "N--".to_string())
            ]
        };
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        // the masked sample is forced to an N-run at the realigned width
        assert_eq!(column_value(&outcome, "S2"), "NNN");
        assert_eq!(column_value(&outcome, "S1"), "GAT");
    }

    #[test]
    fn test_dropped_sample_becomes_gap_run() {
        let sample_names = samples(&["S1", "S2"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "GAT"])]));
        let mask = CoverageMask::default();
        // the aligner loses S2 entirely
        let realigner = FixedRealigner {
            response: vec![("S1".to_string(), "GAT".to_string())]
        };
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S2"), "---");
    }

    #[test]
    fn test_realign_failure_keeps_column() {
        let sample_names = samples(&["S1", "S2"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "GAT"])]));
        let mask = CoverageMask::default();
        let realigner = FailingRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);

        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert!(outcome.realign_failed);
        assert!(!outcome.realigned);
        // pre-alignment values survive; the short sample is not padded because it still has a value
        assert_eq!(column_value(&outcome, "S1"), "GAT");
        assert_eq!(column_value(&outcome, "S2"), "G");
    }

    #[test]
    fn test_strict_mode_rejects_non_rectangular() {
        let sample_names = samples(&["S1", "S2"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "GAT"])]));
        let mask = CoverageMask::default();
        let realigner = FailingRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, true);

        assert!(reconciler.reconcile("chr1", 2, REFERENCE).is_err());
    }

    #[test]
    fn test_indel_priority_flows_through() {
        let sample_names = samples(&["S1"]);
        let mut lookup = MockLookup::default();
        lookup.insert("chr1", 2, make_record(3, "G", &[("S1", &["GAT", "G"])]));
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;

        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, false, false);
        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "G");

        let realigner = PanicRealigner;
        let reconciler = PositionReconciler::new(&lookup, &mask, &realigner, &sample_names, true, false);
        let outcome = reconciler.reconcile("chr1", 2, REFERENCE).unwrap();
        assert_eq!(column_value(&outcome, "S1"), "GAT");
    }
}
