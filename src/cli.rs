
use clap::Parser;
use chrono::Datelike;
use flate2::bufread::MultiGzDecoder;
use lazy_static::lazy_static;
use log::{error, info, trace};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.2.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.2.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = format!("Copyright (C) {}     vcf2msa contributors
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()))]
pub struct Settings {
    /// Input variant file in VCF format, must be bgzipped and indexed
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "vcf")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub vcf_filename: PathBuf,

    /// Reference FASTA file
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_filename: PathBuf,

    /// Directory receiving the per-region alignment files
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(default_value = ".")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_directory: PathBuf,

    /// Overwrite existing alignment files instead of appending to them
    #[clap(long = "force")]
    #[clap(help_heading = Some("Input/Output"))]
    pub force_overwrite: bool,

    /// Output summary statistics file (optional, csv/tsv)
    #[clap(long = "summary-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub summary_filename: Option<PathBuf>,

    /// Region to sample, "[name:]contig:start-end"; cannot be combined with --regions-file
    #[clap(short = 'R')]
    #[clap(long = "region")]
    #[clap(value_name = "REGION")]
    #[clap(help_heading = Some("Region Selection"))]
    pub region: Option<String>,

    /// Name for the region given with --region (default: "locus_1")
    #[clap(long = "region-name")]
    #[clap(value_name = "NAME")]
    #[clap(help_heading = Some("Region Selection"))]
    pub region_name: Option<String>,

    /// Text file containing regions to sample, one "[name:]contig:start-end" per line
    #[clap(long = "regions-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Region Selection"))]
    pub regions_filename: Option<PathBuf>,

    /// Per-sample mpileup file for ALL sites (-aa in samtools), one per sample; may be repeated
    #[clap(short = 'm')]
    #[clap(long = "mpileup")]
    #[clap(value_name = "PILEUP")]
    #[clap(help_heading = Some("Masking"))]
    pub pileup_filenames: Vec<PathBuf>,

    /// Minimum coverage to trust a call; positions below this are masked with "N"
    #[clap(long = "min-coverage")]
    #[clap(value_name = "DEPTH")]
    #[clap(default_value = "1")]
    #[clap(help_heading = Some("Masking"))]
    pub min_coverage: u32,

    /// When an indel conflicts with a SNP call, give precedence to the indel
    #[clap(long = "indel-priority")]
    #[clap(help_heading = Some("Consensus"))]
    pub indel_priority: bool,

    /// Abort a region on rectangularity violations instead of warning and continuing
    #[clap(long = "strict")]
    #[clap(help_heading = Some("Consensus"))]
    pub strict: bool,

    /// External multi-sequence aligner; must read FASTA on stdin and write aligned FASTA on stdout
    #[clap(long = "aligner")]
    #[clap(value_name = "CMD")]
    #[clap(default_value = "clustalo")]
    #[clap(help_heading = Some("Realignment"))]
    pub aligner_command: String,

    /// Arguments passed to the external aligner
    #[clap(long = "aligner-arg")]
    #[clap(value_name = "ARG")]
    #[clap(default_values_t = ["-i".to_string(), "-".to_string()])]
    #[clap(help_heading = Some("Realignment"))]
    pub aligner_args: Vec<String>,

    /// Maximum seconds one aligner invocation may run before it is killed
    #[clap(long = "aligner-timeout")]
    #[clap(value_name = "SECONDS")]
    #[clap(default_value = "60")]
    #[clap(help_heading = Some("Realignment"))]
    pub aligner_timeout: u64,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

/// Checks if the VCF file exists, is bgzipped, and has an index. If it fails any of those, this will exit.
/// # Argument
/// * `filename` - the VCF file path to check
/// * `label` - the label to use for error messages
fn check_required_vcf(filename: &Path, label: &str) {
    // first check the filename normally
    check_required_filename(filename, label);

    // now we need to check that this is a bgzipped file by just trying to read a little bit of it
    // NOTE: if the user generates a gzip file (as opposed to bgzip), this will still pass :(
    //       in theory, indexing checks should fail
    let vcf_file: File = File::open(filename).unwrap();
    let file_reader = BufReader::new(vcf_file);
    let mut gz_decoder = MultiGzDecoder::new(file_reader);
    let mut small_buffer: [u8; 10] = [0; 10];
    match gz_decoder.read(&mut small_buffer) {
        Ok(bytes_read) => {
            trace!("Successfully read {bytes_read} bytes from VCF.")
        },
        Err(e) => {
            if e.to_string() == "invalid gzip header" {
                error!("Error while checking {filename:?}: {e}; is the VCF bgzipped?");
            } else {
                error!("Error while checking {filename:?}: {e}");
            }
            std::process::exit(exitcode::IOERR);
        }
    };

    // finally, verify that an index file exists, should just be tbi and csi
    let known_indices = ["tbi", "csi"];
    let mut index_found: bool = false;
    for &ki in known_indices.iter() {
        let mut extension_path = filename.to_owned()
            .into_os_string();
        extension_path.push(format!(".{ki}"));
        let extension_path: PathBuf = PathBuf::from(extension_path);
        index_found |= extension_path.exists();
    }
    if !index_found {
        error!("Error while checking {filename:?}: no tabix index found (.tbi or .csi)");
        std::process::exit(exitcode::NOINPUT);
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    //check for any of our required files
    check_required_vcf(&settings.vcf_filename, "Variant file");
    check_required_filename(&settings.reference_filename, "Reference file");
    for filename in settings.pileup_filenames.iter() {
        check_required_filename(filename, "Pileup file");
    }

    // region selection is mandatory and exclusive, these are configuration faults
    if settings.regions_filename.is_some() && settings.region.is_some() {
        error!("Cannot use both --region and --regions-file");
        std::process::exit(exitcode::USAGE);
    }
    if settings.regions_filename.is_none() && settings.region.is_none() {
        error!("No regions selected, use --region or --regions-file");
        std::process::exit(exitcode::USAGE);
    }
    if let Some(ref filename) = settings.regions_filename {
        check_required_filename(filename, "Regions file");
    }
    if settings.region_name.is_some() && settings.region.is_none() {
        error!("--region-name requires --region");
        std::process::exit(exitcode::USAGE);
    }

    if !settings.output_directory.is_dir() {
        error!("Output directory does not exist: \"{}\"", settings.output_directory.display());
        std::process::exit(exitcode::NOINPUT);
    }

    // 0 is just a sentinel for "no timeout worth having", error proof it up to 1
    if settings.aligner_timeout == 0 {
        settings.aligner_timeout = 1;
    }

    // dump stuff to the logger
    info!("Masking:");
    info!("\tPileup files: {}", settings.pileup_filenames.len());
    info!("\tMinimum coverage: {}", settings.min_coverage);

    info!("Consensus:");
    info!("\tIndel priority: {}", if settings.indel_priority { "ENABLED" } else { "DISABLED" });
    info!("\tRectangularity violations: {}", if settings.strict { "STRICT" } else { "LENIENT" });

    info!("Realignment:");
    info!("\tAligner: {:?} {:?}", settings.aligner_command, settings.aligner_args);
    info!("\tAligner timeout: {} s", settings.aligner_timeout);

    if settings.force_overwrite {
        info!("Overwriting existing alignment files: ENABLED");
    }

    //send the settings back
    settings
}
