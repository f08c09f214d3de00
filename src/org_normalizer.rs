//! Company Name Normalization
//!
//! Standardizes company and firm names so that answers from independent
//! research calls can be matched exactly:
//! - Case variations: STRIPE vs Stripe vs stripe
//! - Punctuation: "Acme, Corp." vs "Acme Corp"
//! - Legal-entity suffixes: Inc, LLC, GmbH, Corporation, Holdings, ...
//!
//! Matching is exact on the normalized form. There is no edit-distance
//! fuzziness: a missed match is preferred over merging two distinct companies.

use tracing::debug;

/// Legal-entity suffix tokens dropped during normalization.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "llc",
    "lp",
    "ltd",
    "gmbh",
    "sa",
    "ag",
    "nv",
    "bv",
    "corporation",
    "corp",
    "company",
    "co",
    "limited",
    "holding",
    "holdings",
];

/// Punctuation characters removed before tokenizing.
const STRIPPED_PUNCTUATION: &[char] = &['.', ',', ';', '(', ')'];

/// Normalize a company name for exact matching.
///
/// Lower-cases, strips `. , ; ( )`, splits on whitespace, drops legal-entity
/// suffix tokens and rejoins with single spaces. The result is a fixed point:
/// `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let cleaned = strip_punctuation(&lower);
    let result = remove_legal_suffixes(&cleaned);

    if result != name {
        debug!("Normalized '{}' to '{}'", name, result);
    }
    result
}

/// Two names refer to the same entity iff their normalized forms are equal.
pub fn same_entity(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn strip_punctuation(name: &str) -> String {
    name.chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect()
}

/// Drop suffix tokens wherever they appear and collapse whitespace.
fn remove_legal_suffixes(name: &str) -> String {
    name.split_whitespace()
        .filter(|token| !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_variants_collapse() {
        let expected = normalize("Acme Corp.");
        assert_eq!(expected, "acme");
        assert_eq!(normalize("Acme Corporation"), expected);
        assert_eq!(normalize("ACME, CORP"), expected);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Garrett Motion Inc.",
            "  Oaktree   Capital Management, L.P. ",
            "Stripe",
            "Holdings Holdings Co.",
            "(Acme) Industrial; GmbH",
            "",
            "Société Générale S.A.",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not a fixed point for {:?}", sample);
        }
    }

    #[test]
    fn test_multiple_suffix_tokens_removed() {
        assert_eq!(normalize("Berkshire Hathaway Holding Company Inc"), "berkshire hathaway");
        assert_eq!(normalize("Siemens AG"), "siemens");
        assert_eq!(normalize("Philips N.V."), "philips");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize("  Blue   Owl\tCapital  "), "blue owl capital");
    }

    #[test]
    fn test_suffix_only_name_is_empty() {
        assert_eq!(normalize("Holdings Ltd."), "");
    }

    #[test]
    fn test_suffix_inside_word_kept() {
        // "co" only matches as a whole token
        assert_eq!(normalize("Costco Wholesale"), "costco wholesale");
        assert_eq!(normalize("Incyte"), "incyte");
    }

    #[test]
    fn test_distinct_companies_do_not_merge() {
        assert!(!same_entity("Acme Capital", "Acme Capital Partners"));
        assert!(!same_entity("Stripe", "Stripes"));
    }

    #[test]
    fn test_same_entity() {
        assert!(same_entity("Garrett Motion Inc.", "garrett motion"));
        assert!(same_entity("Bain Capital, LP", "Bain Capital"));
    }
}
