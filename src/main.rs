
use vcf2msa::cli::{Settings, check_settings, get_raw_settings};
use vcf2msa::consensus::ConsensusError;
use vcf2msa::coverage_mask::CoverageMask;
use vcf2msa::data_types::reference_genome::ReferenceGenome;
use vcf2msa::data_types::regions::{Region, read_region_file};
use vcf2msa::realign::SubprocessRealigner;
use vcf2msa::region_assembler::RegionAssembler;
use vcf2msa::variant_lookup::VcfVariantLookup;
use vcf2msa::writers::fasta_writer::RegionFastaWriter;
use vcf2msa::writers::region_stats::SummaryWriter;

use log::{LevelFilter, debug, error, info, warn};
use std::time::{Duration, Instant};

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);

    // figure out which regions we are building alignments for
    let regions: Vec<Region> = if let Some(ref descriptor) = cli_settings.region {
        let region_name: String = cli_settings.region_name.clone()
            .unwrap_or_else(|| "locus_1".to_string());
        match Region::parse(descriptor, &region_name) {
            Ok(r) => vec![r],
            Err(e) => {
                error!("Error during region parsing: {}", e);
                std::process::exit(exitcode::USAGE);
            }
        }
    } else {
        // check_settings guarantees exactly one selection mode is set
        let regions_filename = cli_settings.regions_filename.as_ref().unwrap();
        match read_region_file(regions_filename) {
            Ok(r) => r,
            Err(e) => {
                error!("Error during region file parsing: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
    };
    if regions.is_empty() {
        error!("No regions found in the regions file.");
        std::process::exit(exitcode::USAGE);
    }

    // get our reference genome
    let reference_genome: ReferenceGenome = match ReferenceGenome::from_fasta(&cli_settings.reference_filename) {
        Ok(rg) => rg,
        Err(e) => {
            error!("Error during reference loading: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    // the variant lookup owns the sample set for the whole run
    let variant_lookup: VcfVariantLookup = match VcfVariantLookup::from_path(&cli_settings.vcf_filename) {
        Ok(vl) => vl,
        Err(e) => {
            error!("Error during VCF loading: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    let sample_names: Vec<String> = variant_lookup.sample_names().to_vec();

    // load the coverage masks, an empty mask just means nothing ever gets masked
    let coverage_mask: CoverageMask = if cli_settings.pileup_filenames.is_empty() {
        debug!("No pileup files provided, coverage masking is disabled.");
        CoverageMask::default()
    } else {
        match CoverageMask::from_pileup_files(&cli_settings.pileup_filenames, cli_settings.min_coverage) {
            Ok(cm) => cm,
            Err(e) => {
                error!("Error during pileup loading: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
    };
    for mask_sample in coverage_mask.samples() {
        if !sample_names.iter().any(|s| s == mask_sample) {
            warn!("Mask sample {:?} does not match any VCF sample, its mask will never apply.", mask_sample);
        }
    }

    let realigner: SubprocessRealigner = SubprocessRealigner::new(
        cli_settings.aligner_command.clone(),
        cli_settings.aligner_args.clone(),
        Duration::from_secs(cli_settings.aligner_timeout)
    );

    let mut fasta_writer: RegionFastaWriter = RegionFastaWriter::new(
        &cli_settings.output_directory,
        cli_settings.force_overwrite
    );

    // create our stats file also
    let mut summary_writer: Option<SummaryWriter> = match cli_settings.summary_filename {
        Some(ref filename) => {
            match SummaryWriter::new(filename) {
                Ok(sw) => Some(sw),
                Err(e) => {
                    error!("Error during summary writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    let assembler = RegionAssembler::new(
        &variant_lookup,
        &coverage_mask,
        &realigner,
        &sample_names,
        cli_settings.indel_priority,
        cli_settings.strict
    );

    //process the regions, one at a time and in order
    let start_time: Instant = Instant::now();
    let mut regions_written: u64 = 0;
    info!("Region processing starting...");

    for (i, region) in regions.iter().enumerate() {
        debug!("region {}: {:?}", i, region);
        if !reference_genome.has_contig(region.contig()) {
            warn!("Region {:?} references a contig not in the reference, skipping it.", region);
            continue;
        }

        let contig_sequence: &[u8] = reference_genome.get_full_chromosome(region.contig());
        let (alignment, stats) = match assembler.assemble(region, contig_sequence) {
            Ok(result) => result,
            Err(e) => {
                error!("Error while processing {:?}:", region);
                error!("  {}", e);
                // an ambiguity-table miss is corrupt input rather than a bug on our end
                if e.downcast_ref::<ConsensusError>().is_some() {
                    std::process::exit(exitcode::DATAERR);
                }
                std::process::exit(exitcode::SOFTWARE);
            }
        };

        if stats.realignment_failures > 0 {
            warn!("Region {:?}: {} columns kept unaligned after realignment failures.",
                region, stats.realignment_failures);
        }

        match fasta_writer.write_alignment(&alignment) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing alignment for {:?}: {}", region, e);
                std::process::exit(exitcode::IOERR);
            }
        };

        if let Some(summary_writer) = summary_writer.as_mut() {
            match summary_writer.write_region(&alignment, &stats) {
                Ok(()) => {},
                Err(e) => {
                    error!("Error while writing summary statistics file: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            };
        }

        regions_written += 1;
        info!("Finished region {:?}: {} samples x {} bp.",
            region, alignment.records().len(), stats.alignment_width);
    }

    info!("All {} regions finished successfully after {} seconds.", regions_written, start_time.elapsed().as_secs_f64());
}
