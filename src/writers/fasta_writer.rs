
use log::{debug, info};
use rustc_hash::FxHashSet as HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::region_assembler::RegionAlignment;

/// Writes one FASTA file per region logical name, one record per sample.
/// Destinations are opened in append mode so multiple regions resolving to the same name
/// share a file, and repeated runs extend existing files. With `force`, each destination
/// is truncated once per run at its first open.
pub struct RegionFastaWriter {
    /// The directory receiving the per-region files
    output_dir: PathBuf,
    /// If true, truncate each destination at its first open this run
    force: bool,
    /// Destinations already opened this run, so `force` truncates only once
    opened_this_run: HashSet<PathBuf>
}

impl RegionFastaWriter {
    /// # Arguments
    /// * `output_dir` - the directory receiving the per-region files
    /// * `force` - if true, existing destinations are overwritten instead of appended to
    pub fn new(output_dir: &Path, force: bool) -> RegionFastaWriter {
        RegionFastaWriter {
            output_dir: output_dir.to_path_buf(),
            force,
            opened_this_run: Default::default()
        }
    }

    /// The destination file for a region logical name
    pub fn output_path(&self, region_name: &str) -> PathBuf {
        self.output_dir.join(format!("{region_name}.fasta"))
    }

    /// Appends one record per sample to the region's destination file.
    /// # Arguments
    /// * `alignment` - the finished region alignment
    /// # Errors
    /// * if the destination cannot be opened or written
    pub fn write_alignment(&mut self, alignment: &RegionAlignment) -> Result<(), std::io::Error> {
        let path: PathBuf = self.output_path(alignment.region_name());
        let truncate: bool = self.force && !self.opened_this_run.contains(&path);
        if truncate {
            debug!("Overwriting {:?}...", path);
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&path)?;
        let mut writer = BufWriter::new(file);
        for (sample, sequence) in alignment.records().iter() {
            writeln!(writer, ">{}", alignment.sample_label(sample))?;
            writeln!(writer, "{sequence}")?;
        }
        writer.flush()?;
        self.opened_this_run.insert(path.clone());

        info!("Wrote {} records to {:?}.", alignment.records().len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage_mask::CoverageMask;
    use crate::data_types::regions::Region;
    use crate::reconciler::test_util::{samples, MockLookup, PanicRealigner};
    use crate::region_assembler::RegionAssembler;

    fn test_alignment(region_name: &str) -> RegionAlignment {
        let sample_names = samples(&["S1", "S2"]);
        let lookup = MockLookup::default();
        let mask = CoverageMask::default();
        let realigner = PanicRealigner;
        let assembler = RegionAssembler::new(&lookup, &mask, &realigner, &sample_names, false, false);
        let region = Region::parse(&format!("{region_name}:chr1:1-8"), region_name).unwrap();
        assembler.assemble(&region, b"ACGTACGT").unwrap().0
    }

    fn temp_output_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vcf2msa_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_append_mode() {
        let dir = temp_output_dir("append");
        let alignment = test_alignment("locus_1");

        let mut writer = RegionFastaWriter::new(&dir, false);
        writer.write_alignment(&alignment).unwrap();
        writer.write_alignment(&alignment).unwrap();

        let contents = std::fs::read_to_string(writer.output_path("locus_1")).unwrap();
        let expected_block = ">chr1:1-8_S1\nACGTACGT\n>chr1:1-8_S2\nACGTACGT\n";
        assert_eq!(contents, format!("{expected_block}{expected_block}"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_force_truncates_once_per_run() {
        let dir = temp_output_dir("force");
        let alignment = test_alignment("locus_1");

        // simulate an earlier run
        let mut writer = RegionFastaWriter::new(&dir, false);
        writer.write_alignment(&alignment).unwrap();

        // a forced run truncates at the first open, then appends within the run
        let mut writer = RegionFastaWriter::new(&dir, true);
        writer.write_alignment(&alignment).unwrap();
        writer.write_alignment(&alignment).unwrap();

        let contents = std::fs::read_to_string(writer.output_path("locus_1")).unwrap();
        let expected_block = ">chr1:1-8_S1\nACGTACGT\n>chr1:1-8_S2\nACGTACGT\n";
        assert_eq!(contents, format!("{expected_block}{expected_block}"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
