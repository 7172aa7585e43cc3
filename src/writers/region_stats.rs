
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::region_assembler::{RegionAlignment, RegionStats};

/// This is a wrapper for writing the per-region summary statistics to a file
pub struct SummaryWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of our summary file
#[derive(Serialize)]
struct SummaryRow {
    /// the logical name of the region
    region_name: String,
    /// the contig of the region
    contig: String,
    /// the resolved first position, 1-based inclusive
    start: u64,
    /// the resolved last position, 1-based inclusive
    end: u64,
    /// the number of samples in the alignment
    num_samples: usize,
    /// the number of reference positions processed
    num_positions: u64,
    /// the final alignment width
    alignment_width: u64,
    /// the number of columns sent through the external aligner
    realigned_columns: u64,
    /// the number of columns where the aligner failed and the unaligned column was kept
    realignment_failures: u64,
    /// the number of sample calls replaced by the coverage mask
    masked_calls: u64
}

impl SummaryWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all summary rows to
    pub fn new(filename: &Path) -> csv::Result<SummaryWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(SummaryWriter {
            csv_writer
        })
    }

    /// Writes the summary row for one finished region
    /// # Arguments
    /// * `alignment` - the finished region alignment
    /// * `stats` - the counters collected while assembling it
    pub fn write_region(&mut self, alignment: &RegionAlignment, stats: &RegionStats) -> csv::Result<()> {
        let row = SummaryRow {
            region_name: alignment.region_name().to_string(),
            contig: alignment.contig().to_string(),
            start: alignment.start(),
            end: alignment.end(),
            num_samples: alignment.records().len(),
            num_positions: stats.num_positions,
            alignment_width: stats.alignment_width,
            realigned_columns: stats.realigned_columns,
            realignment_failures: stats.realignment_failures,
            masked_calls: stats.masked_calls
        };
        self.csv_writer.serialize(&row)?;
        self.csv_writer.flush()?;
        Ok(())
    }
}
