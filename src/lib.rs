
/// CLI functionality and checks
pub mod cli;
/// Genotype resolver that merges raw allele calls into one effective allele per sample
pub mod consensus;
/// Per-sample, per-contig sets of low-coverage positions parsed from mpileup files
pub mod coverage_mask;
/// Contains multiple wrappers for useful data types in vcf2msa
pub mod data_types;
/// External aligner boundary for columns with indel length conflicts
pub mod realign;
/// Position reconciler that builds one rectangular column per position across all samples
pub mod reconciler;
/// Organizes the primary workflow for one region, driving the reconciler across its position range
pub mod region_assembler;
/// Variant lookup boundary over an indexed VCF
pub mod variant_lookup;
/// Contains all the various output writer functionality
pub mod writers;
