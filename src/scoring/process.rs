//! Step-level process quality heuristics.

/// Reasoning connectives and operators that mark a step as substantive.
const REASONING_MARKERS: &[&str] = &[
    "because", "since", "therefore", "=", "+", "-", "*", "/", "solve", "implies",
];

/// Explicit error admissions that invalidate a step.
const ERROR_ADMISSIONS: &[&str] = &["error", "wrong", "incorrect", "mistake"];

/// Back-references that mark a step as repeating earlier work.
const BACK_REFERENCES: &[&str] = &["as before", "same as", "repeat"];

/// Split a solution into non-empty, trimmed steps, one per line.
pub fn split_steps(solution: &str) -> Vec<&str> {
    solution
        .lines()
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .collect()
}

/// A step is valid if it reasons and does not admit an error.
pub fn is_step_valid(step: &str) -> bool {
    let lower = step.to_lowercase();
    REASONING_MARKERS.iter().any(|m| lower.contains(m))
        && !ERROR_ADMISSIONS.iter().any(|p| lower.contains(p))
}

/// A step is redundant if it is too short or refers back to earlier work.
pub fn is_step_redundant(step: &str, min_chars: usize) -> bool {
    let lower = step.to_lowercase();
    step.trim().chars().count() < min_chars || BACK_REFERENCES.iter().any(|p| lower.contains(p))
}

/// Fractions of valid and redundant steps, or `None` for an empty list.
pub fn step_ratios(steps: &[&str], min_chars: usize) -> Option<(f64, f64)> {
    if steps.is_empty() {
        return None;
    }
    let total = steps.len() as f64;
    let valid = steps.iter().filter(|s| is_step_valid(s)).count() as f64;
    let redundant = steps
        .iter()
        .filter(|s| is_step_redundant(s, min_chars))
        .count() as f64;
    Some((valid / total, redundant / total))
}
