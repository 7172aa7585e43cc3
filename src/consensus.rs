
#[derive(thiserror::Error, Debug)]
pub enum ConsensusError {
    #[error("no ambiguity code exists for allele combination {key:?}")]
    UnknownAmbiguityCode { key: String },
    #[error("cannot resolve an empty allele set")]
    EmptyAlleleSet
}

/// The gap character used for deletions and alignment padding.
pub const GAP_CHAR: char = '-';
/// The character written for masked (low-coverage) calls.
pub const MASK_CHAR: char = 'N';

/// Translates a sorted string of bases into its IUPAC ambiguity code, retaining case.
/// Single bases map to themselves; `None` for anything outside the table.
/// # Arguments
/// * `key` - lexicographically sorted, deduplicated, uniform-case base string
pub fn ambiguity_code(key: &str) -> Option<char> {
    let code = match key {
        "A" => 'A',
        "C" => 'C',
        "G" => 'G',
        "T" => 'T',
        "N" => 'N',
        "-" => '-',
        "AG" => 'R',
        "CT" => 'Y',
        "AC" => 'M',
        "GT" => 'K',
        "AT" => 'W',
        "CG" => 'S',
        "CGT" => 'B',
        "AGT" => 'D',
        "ACT" => 'H',
        "ACG" => 'V',
        "ACGT" => 'N',
        "a" => 'a',
        "c" => 'c',
        "g" => 'g',
        "t" => 't',
        "n" => 'n',
        "ag" => 'r',
        "ct" => 'y',
        "ac" => 'm',
        "gt" => 'k',
        "at" => 'w',
        "cg" => 's',
        "cgt" => 'b',
        "agt" => 'd',
        "act" => 'h',
        "acg" => 'v',
        "acgt" => 'n',
        _ => return None
    };
    Some(code)
}

/// Picks one indel allele from a non-empty set: a single distinct indel wins outright;
/// otherwise the shortest wins, with ties broken lexicographically so the result does not
/// depend on input order.
/// # Arguments
/// * `indels` - distinct indel alleles, deletion markers already normalized to the gap character
fn resolve_indels(indels: &[String]) -> String {
    assert!(!indels.is_empty());
    let mut best: &String = &indels[0];
    for indel in indels[1..].iter() {
        if indel.len() < best.len() || (indel.len() == best.len() && indel < best) {
            best = indel;
        }
    }
    best.clone()
}

/// Merges the raw allele strings for one sample at one position into a single effective allele.
/// A lone allele is returned unchanged. Otherwise alleles are partitioned into single-base
/// variants and indels (the `*` spanning-deletion marker becomes a gap character). With
/// `indel_priority`, any indel beats the variants; without it, indels are only used when no
/// single-base variant exists. Heterozygous single-base combinations are mapped through the
/// IUPAC ambiguity table, case preserved.
///
/// Mixed-case heterozygous input is normalized to the case of the first allele encountered
/// before the table lookup; uniform-case input is unaffected.
/// # Arguments
/// * `alleles` - the raw allele strings, in call order; must be non-empty
/// * `indel_priority` - if true, indel alleles take precedence over single-base variants
/// # Errors
/// * `EmptyAlleleSet` if no alleles are provided
/// * `UnknownAmbiguityCode` if the variant combination is not in the ambiguity table; this
///   indicates corrupt input and callers should treat it as fatal
pub fn genotype_resolve(alleles: &[String], indel_priority: bool) -> Result<String, ConsensusError> {
    if alleles.is_empty() {
        return Err(ConsensusError::EmptyAlleleSet);
    }
    if alleles.len() == 1 {
        // fast path for homozygous/haploid calls
        return Ok(alleles[0].clone());
    }

    // partition into single-base variants and indels, preserving first-encounter order
    let mut variants: Vec<char> = vec![];
    let mut indels: Vec<String> = vec![];
    for allele in alleles.iter() {
        if allele.len() > 1 || allele == "*" {
            let normalized: String = if allele == "*" {
                GAP_CHAR.to_string()
            } else {
                allele.clone()
            };
            if !indels.contains(&normalized) {
                indels.push(normalized);
            }
        } else if let Some(base) = allele.chars().next() {
            if !variants.contains(&base) {
                variants.push(base);
            }
        }
        // zero-length alleles should not occur in well-formed input; nothing to add if they do
    }

    if indel_priority && !indels.is_empty() {
        return Ok(resolve_indels(&indels));
    }

    match variants.len() {
        0 => {
            // zero-length alleles contribute to neither partition, so both can end up empty
            if indels.is_empty() {
                return Err(ConsensusError::EmptyAlleleSet);
            }
            // no single-base variants at all, fall back to the indels regardless of priority
            Ok(resolve_indels(&indels))
        },
        1 => Ok(variants[0].to_string()),
        _ => {
            // normalize to the case of the first allele so the lookup key is uniform-case
            let to_lower: bool = variants[0].is_ascii_lowercase();
            let mut bases: Vec<char> = variants.iter()
                .map(|&b| if to_lower { b.to_ascii_lowercase() } else { b.to_ascii_uppercase() })
                .collect();
            bases.sort_unstable();
            bases.dedup();
            let key: String = bases.into_iter().collect();
            match ambiguity_code(&key) {
                Some(code) => Ok(code.to_string()),
                None => Err(ConsensusError::UnknownAmbiguityCode { key })
            }
        }
    }
}
