
use log::{debug, info, warn};
use rust_htslib::bcf;
use rust_htslib::bcf::record::GenotypeAllele;
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;
use std::cell::RefCell;
use std::path::Path;

/// Normalizes a raw sample name by truncating at the first `.` separator.
/// This is the key used everywhere samples are identified: VCF columns, mask files, output headers.
pub fn normalize_sample_name(raw: &str) -> &str {
    raw.split('.').next().unwrap_or(raw)
}

/// One variant record surfaced by the lookup boundary.
/// Multiple records may exist at the same logical position (e.g. overlapping indel and SNP
/// representations); callers must cross-check `position` against the queried position.
#[derive(Clone, Debug)]
pub struct VariantRecord {
    /// The 1-based reference position (VCF POS)
    pub position: u64,
    /// The reference allele of this record
    pub reference_allele: String,
    /// Raw called allele strings per normalized sample; samples with no usable call are absent
    pub sample_calls: HashMap<String, Vec<String>>
}

/// Boundary for querying which variant records overlap a given position.
pub trait VariantLookup {
    /// Returns all records overlapping the given 0-based position.
    /// # Arguments
    /// * `contig` - the contig to query
    /// * `position` - the 0-based position; the query interval is `[position, position+1)`
    /// # Errors
    /// * if the underlying variant source fails to read or parse
    fn fetch(&self, contig: &str, position: u64) -> Result<Vec<VariantRecord>, Box<dyn std::error::Error>>;
}

/// Production lookup over an indexed, bgzipped VCF via rust-htslib.
pub struct VcfVariantLookup {
    /// The traversal reader; RefCell because fetching requires mutation
    vcf_reader: RefCell<bcf::IndexedReader>,
    /// A copy of the VCF header, cached here for rid lookups
    vcf_header: bcf::header::HeaderView,
    /// The normalized sample name for each VCF sample column, in column order
    column_samples: Vec<String>,
    /// Deduplicated normalized sample names, insertion order preserved
    sample_names: Vec<String>
}

impl VcfVariantLookup {
    /// Opens an indexed VCF and normalizes its sample names.
    /// Raw names that collapse to the same normalized key are merged into one logical sample.
    /// # Arguments
    /// * `vcf_fn` - the VCF file, must be bgzipped and indexed
    /// # Errors
    /// * if the file fails to load as an indexed VCF
    /// * if a sample name fails to parse from utf8
    /// * if the VCF carries no samples at all
    pub fn from_path(vcf_fn: &Path) -> Result<VcfVariantLookup, Box<dyn std::error::Error>> {
        use rust_htslib::bcf::Read;
        let vcf_reader: bcf::IndexedReader = bcf::IndexedReader::from_path(vcf_fn)?;
        let vcf_header: bcf::header::HeaderView = vcf_reader.header().clone();

        let mut column_samples: Vec<String> = vec![];
        let mut sample_names: Vec<String> = vec![];
        for sv in vcf_header.samples().iter() {
            let raw_sample: &str = std::str::from_utf8(sv)?;
            let normalized: String = normalize_sample_name(raw_sample).to_string();
            if !sample_names.contains(&normalized) {
                sample_names.push(normalized.clone());
            } else {
                warn!("Samples {:?} and an earlier column both normalize to {:?}, their calls will be merged.", raw_sample, normalized);
            }
            column_samples.push(normalized);
        }
        if sample_names.is_empty() {
            bail!("No samples found in VCF: {:?}", vcf_fn);
        }
        info!("Found samples: {:?}", sample_names);

        Ok(VcfVariantLookup {
            vcf_reader: RefCell::new(vcf_reader),
            vcf_header,
            column_samples,
            sample_names
        })
    }

    /// The normalized sample names, in VCF column order with duplicates collapsed.
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }
}

impl VariantLookup for VcfVariantLookup {
    fn fetch(&self, contig: &str, position: u64) -> Result<Vec<VariantRecord>, Box<dyn std::error::Error>> {
        use rust_htslib::bcf::Read;
        let rid: u32 = match self.vcf_header.name2rid(contig.as_bytes()) {
            Ok(rid) => rid,
            Err(_) => {
                // contig absent from the VCF header, nothing can overlap
                debug!("Contig {:?} not present in VCF header.", contig);
                return Ok(vec![]);
            }
        };

        let mut vcf_reader = self.vcf_reader.borrow_mut();
        match vcf_reader.fetch(rid, position, Some(position + 1)) {
            Ok(()) => {},
            Err(_) => {
                // this usually happens when there are no entries for the contig
                return Ok(vec![]);
            }
        };

        let mut records: Vec<VariantRecord> = vec![];
        for record_result in vcf_reader.records() {
            let record: bcf::Record = record_result?;
            let alleles: Vec<String> = record.alleles().iter()
                .map(|a| String::from_utf8_lossy(a).to_string())
                .collect();
            if alleles.is_empty() {
                bail!("Record with no alleles at {}:{}", contig, record.pos() + 1);
            }
            let reference_allele: String = alleles[0].clone();

            let all_genotypes = record.genotypes()?;
            let mut sample_calls: HashMap<String, Vec<String>> = Default::default();
            for (column_index, sample_name) in self.column_samples.iter().enumerate() {
                let genotype = all_genotypes.get(column_index);
                let mut allele_indices: Vec<usize> = vec![];
                for gt_index in 0..genotype.len() {
                    match genotype[gt_index] {
                        GenotypeAllele::Unphased(at) | GenotypeAllele::Phased(at) => {
                            allele_indices.push(at as usize);
                        },
                        // partially missing calls contribute only their called alleles
                        GenotypeAllele::UnphasedMissing | GenotypeAllele::PhasedMissing => {}
                    };
                }

                // fully missing and homozygous-reference calls both surface as "no call";
                // the reconciler's reference fallback yields the same base either way
                if allele_indices.is_empty() || allele_indices.iter().all(|&index| index == 0) {
                    continue;
                }

                let mut call_strings: Vec<String> = vec![];
                for &allele_index in allele_indices.iter() {
                    match alleles.get(allele_index) {
                        Some(allele) => call_strings.push(allele.clone()),
                        None => {
                            bail!("Genotype allele index {} out of range at {}:{}", allele_index, contig, record.pos() + 1);
                        }
                    };
                }
                // duplicate normalized columns merge their calls here
                sample_calls.entry(sample_name.clone()).or_default().extend(call_strings);
            }

            records.push(VariantRecord {
                position: record.pos() as u64 + 1,
                reference_allele,
                sample_calls
            });
        }

        Ok(records)
    }
}
