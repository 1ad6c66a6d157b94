//! Rewrite detection between two solution texts.

use std::collections::HashSet;

/// Maximum relative length difference for two texts to count as rewrites.
const MAX_LENGTH_DIFF_RATIO: f64 = 0.3;

/// Word-set Jaccard overlap above which two texts count as rewrites.
const MIN_WORD_OVERLAP: f64 = 0.7;

/// Whether `candidate` is a superficial rewrite of `reference`.
///
/// Both texts are lowercased and whitespace-normalized. They are rewrites
/// when their lengths differ by at most 30% of the longer one and their
/// word sets overlap by more than 70% (Jaccard). Empty text is never a
/// rewrite of anything.
pub fn is_rewrite(candidate: &str, reference: &str) -> bool {
    let candidate = normalize(candidate);
    let reference = normalize(reference);

    let len_a = candidate.chars().count();
    let len_b = reference.chars().count();
    if len_a == 0 || len_b == 0 {
        return false;
    }

    let len_diff_ratio = len_a.abs_diff(len_b) as f64 / len_a.max(len_b) as f64;
    if len_diff_ratio > MAX_LENGTH_DIFF_RATIO {
        return false;
    }

    word_overlap(&candidate, &reference) > MIN_WORD_OVERLAP
}

/// Jaccard overlap of the whitespace-separated word sets.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
