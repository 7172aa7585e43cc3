
/// Wrapper for an in-memory reference genome
pub mod reference_genome;
/// Contains the Region type and region-file parsing
pub mod regions;
