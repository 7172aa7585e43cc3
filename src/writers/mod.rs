
/// Contains the per-region FASTA alignment writer
pub mod fasta_writer;
/// Contains the writer for the per-region summary statistics
pub mod region_stats;
