
use flate2::bufread::MultiGzDecoder;
use log::info;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum RegionParseError {
    #[error("region {region:?} does not match \"[name:]contig:start-end\"")]
    MalformedRegion { region: String },
    #[error("region {region:?} has a non-integer coordinate")]
    InvalidCoordinate { region: String },
    #[error("region {region:?} has start > end")]
    InvertedCoordinates { region: String },
    #[error("region {region:?} has a start of 0, coordinates are 1-based")]
    ZeroCoordinate { region: String }
}

/// A named contiguous span on one contig selected for alignment output.
/// Coordinates are 1-based and inclusive on both ends; start <= end is enforced at parse time.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Region {
    /// The logical name of the region, used for the output filename
    name: String,
    /// The contig the region lives on
    contig: String,
    /// The first position of the region, 1-based inclusive
    start: u64,
    /// The last position of the region, 1-based inclusive
    end: u64
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("coordinates", &format!("{}:{}-{}", self.contig, self.start, self.end))
            .finish()
    }
}

impl Region {
    /// Parses a region from a `name:contig:start-end` or `contig:start-end` string.
    /// The unnamed form receives the provided fallback name.
    /// # Arguments
    /// * `region` - the region descriptor to parse
    /// * `fallback_name` - the name used when the descriptor carries none
    /// # Errors
    /// * if the descriptor does not have 2 or 3 colon-separated fields ending in `start-end`
    /// * if the coordinates are non-integer, inverted, or 0-based
    pub fn parse(region: &str, fallback_name: &str) -> Result<Region, RegionParseError> {
        let malformed = || RegionParseError::MalformedRegion { region: region.to_string() };

        let fields: Vec<&str> = region.split(':').collect();
        let (name, contig, span): (&str, &str, &str) = match fields.len() {
            2 => (fallback_name, fields[0], fields[1]),
            3 => (fields[0], fields[1], fields[2]),
            _ => return Err(malformed())
        };
        if name.is_empty() || contig.is_empty() {
            return Err(malformed());
        }

        let (start_str, end_str) = span.split_once('-').ok_or_else(malformed)?;
        let parse_coordinate = |s: &str| -> Result<u64, RegionParseError> {
            s.parse().map_err(|_| RegionParseError::InvalidCoordinate { region: region.to_string() })
        };
        let start: u64 = parse_coordinate(start_str)?;
        let end: u64 = parse_coordinate(end_str)?;

        if start == 0 {
            return Err(RegionParseError::ZeroCoordinate { region: region.to_string() });
        }
        if start > end {
            return Err(RegionParseError::InvertedCoordinates { region: region.to_string() });
        }

        Ok(Region {
            name: name.to_string(),
            contig: contig.to_string(),
            start,
            end
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    /// The first position, 1-based inclusive
    pub fn start(&self) -> u64 {
        self.start
    }

    /// The last position, 1-based inclusive
    pub fn end(&self) -> u64 {
        self.end
    }
}

/// Reads a region file with one `[name:]contig:start-end` descriptor per line.
/// Blank lines are skipped; unnamed regions are numbered `locus_1`, `locus_2`, ... in file order.
/// # Arguments
/// * `filename` - the region file, gzip is allowed
/// # Errors
/// * if the file cannot be opened or read
/// * if any line fails to parse as a region
pub fn read_region_file(filename: &Path) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
    let region_file: std::fs::File = std::fs::File::open(filename)?;
    let file_reader = BufReader::new(region_file);
    let line_reader: Box<dyn BufRead> = if filename.extension().unwrap_or_default() == "gz" {
        Box::new(BufReader::new(MultiGzDecoder::new(file_reader)))
    } else {
        Box::new(file_reader)
    };

    let mut regions: Vec<Region> = vec![];
    for line_result in line_reader.lines() {
        let line: String = line_result?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fallback_name = format!("locus_{}", regions.len() + 1);
        regions.push(Region::parse(trimmed, &fallback_name)?);
    }
    info!("Loaded {} regions from {:?}.", regions.len(), filename);
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unnamed() {
        let region = Region::parse("chr1:1-1000", "locus_1").unwrap();
        assert_eq!(region.name(), "locus_1");
        assert_eq!(region.contig(), "chr1");
        assert_eq!(region.start(), 1);
        assert_eq!(region.end(), 1000);
    }

    #[test]
    fn test_parse_named() {
        let region = Region::parse("mygene:chr2:500-600", "locus_1").unwrap();
        assert_eq!(region.name(), "mygene");
        assert_eq!(region.contig(), "chr2");
        assert_eq!(region.start(), 500);
        assert_eq!(region.end(), 600);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Region::parse("chr1", "x"), Err(RegionParseError::MalformedRegion { .. })));
        assert!(matches!(Region::parse("chr1:1000", "x"), Err(RegionParseError::MalformedRegion { .. })));
        assert!(matches!(Region::parse("chr1:ten-20", "x"), Err(RegionParseError::InvalidCoordinate { .. })));
        assert!(matches!(Region::parse("chr1:100-20", "x"), Err(RegionParseError::InvertedCoordinates { .. })));
        assert!(matches!(Region::parse("chr1:0-20", "x"), Err(RegionParseError::ZeroCoordinate { .. })));
    }

    #[test]
    fn test_single_position_region() {
        let region = Region::parse("chr1:5-5", "x").unwrap();
        assert_eq!(region.start(), region.end());
    }
}
