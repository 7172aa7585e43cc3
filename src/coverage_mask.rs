
use flate2::bufread::MultiGzDecoder;
use log::{debug, info, warn};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use simple_error::bail;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::variant_lookup::normalize_sample_name;

/// Per-sample, per-contig sets of zero-based positions considered too low-coverage to trust.
/// Loaded once per run; core processing only ever queries it.
#[derive(Default)]
pub struct CoverageMask {
    /// sample -> contig -> set of masked 0-based positions
    mask: HashMap<String, HashMap<String, HashSet<u64>>>
}

impl CoverageMask {
    /// Loads mask positions from a collection of per-sample mpileup files (`samtools mpileup -aa` style).
    /// The sample identifier is the file name truncated at the first `.`, matching VCF sample normalization.
    /// # Arguments
    /// * `pileup_fns` - one mpileup file per sample, gzip is allowed
    /// * `min_depth` - positions with depth below this are masked
    /// # Errors
    /// * if a file cannot be opened or read
    /// * if a file name has no parseable sample component
    pub fn from_pileup_files(pileup_fns: &[PathBuf], min_depth: u32) -> Result<CoverageMask, Box<dyn std::error::Error>> {
        let mut coverage_mask = CoverageMask::default();
        for pileup_fn in pileup_fns.iter() {
            let base_name = match pileup_fn.file_name().and_then(|f| f.to_str()) {
                Some(b) => b,
                None => {
                    bail!("Could not derive a sample name from pileup file: {:?}", pileup_fn);
                }
            };
            let sample: String = normalize_sample_name(base_name).to_string();

            let pileup_file: std::fs::File = std::fs::File::open(pileup_fn)?;
            let file_reader = BufReader::new(pileup_file);
            if pileup_fn.extension().unwrap_or_default() == "gz" {
                let gz_decoder = MultiGzDecoder::new(file_reader);
                coverage_mask.add_pileup(&sample, BufReader::new(gz_decoder), min_depth, pileup_fn)?;
            } else {
                coverage_mask.add_pileup(&sample, file_reader, min_depth, pileup_fn)?;
            };
        }
        info!("Loaded coverage masks for {} samples.", coverage_mask.mask.len());
        Ok(coverage_mask)
    }

    /// Adds mask positions for one sample from an mpileup reader.
    /// Expected columns: contig, 1-based position, reference base, depth; extra columns are ignored.
    /// Rows with fewer than four columns generate a warning and are skipped.
    /// # Arguments
    /// * `sample` - the normalized sample identifier
    /// * `reader` - the mpileup content
    /// * `min_depth` - positions with depth below this are masked
    /// * `source` - the originating path, only used for log messages
    /// # Errors
    /// * if a line cannot be read
    /// * if a position or depth column fails to parse as an integer
    pub fn add_pileup<R: BufRead>(&mut self, sample: &str, reader: R, min_depth: u32, source: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let sample_mask = self.mask.entry(sample.to_string()).or_default();
        let mut masked_count: u64 = 0;
        for line_result in reader.lines() {
            let line: String = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 4 {
                warn!("Bad line in pileup file {:?}: {:?}", source, line);
                continue;
            }
            let contig: &str = columns[0];
            let position: u64 = columns[1].parse()?;
            if position == 0 {
                bail!("Pileup file {:?} has a position of 0, coordinates are 1-based", source);
            }
            let depth: u32 = columns[3].parse()?;
            if depth < min_depth {
                sample_mask.entry(contig.to_string()).or_default().insert(position - 1);
                masked_count += 1;
            }
        }
        debug!("Sample {:?}: {} masked positions from {:?}.", sample, masked_count, source);
        Ok(())
    }

    /// Returns true if the given 0-based position is masked for this sample and contig.
    pub fn is_masked(&self, sample: &str, contig: &str, position: u64) -> bool {
        self.mask.get(sample)
            .and_then(|sample_mask| sample_mask.get(contig))
            .map(|positions| positions.contains(&position))
            .unwrap_or(false)
    }

    /// Returns true if no mask files were loaded at all.
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// The samples that have mask data, in arbitrary order.
    pub fn samples(&self) -> Vec<&str> {
        self.mask.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_add_pileup() {
        let pileup = "\
chr1\t1\tA\t10\t..........\tIIIIIIIIII
chr1\t2\tC\t0\t*\t*
chr1\t3\tG\t4\t....\tIIII

chr2\t1\tT\t2\t..\tII
";
        let mut mask = CoverageMask::default();
        mask.add_pileup("S1", Cursor::new(pileup), 5, Path::new("S1.pileup")).unwrap();

        assert!(!mask.is_masked("S1", "chr1", 0)); // depth 10
        assert!(mask.is_masked("S1", "chr1", 1));  // depth 0
        assert!(mask.is_masked("S1", "chr1", 2));  // depth 4
        assert!(mask.is_masked("S1", "chr2", 0));  // depth 2
        // unknown samples and contigs are simply unmasked
        assert!(!mask.is_masked("S2", "chr1", 1));
        assert!(!mask.is_masked("S1", "chr3", 1));
    }

    #[test]
    fn test_short_lines_skipped() {
        let pileup = "chr1\t1\tA\nchr1\t2\tC\t0\t*\t*\n";
        let mut mask = CoverageMask::default();
        mask.add_pileup("S1", Cursor::new(pileup), 1, Path::new("S1.pileup")).unwrap();
        assert!(!mask.is_masked("S1", "chr1", 0));
        assert!(mask.is_masked("S1", "chr1", 1));
    }

    #[test]
    fn test_min_depth_boundary() {
        let pileup = "chr1\t1\tA\t1\t.\tI\n";
        let mut mask = CoverageMask::default();
        // depth == min_depth is sufficient coverage
        mask.add_pileup("S1", Cursor::new(pileup), 1, Path::new("S1.pileup")).unwrap();
        assert!(!mask.is_masked("S1", "chr1", 0));
    }
}
