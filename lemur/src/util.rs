//! Small helpers shared across compiler diagnostics

/// Edit distance (Levenshtein) between two identifiers.
/// Single-row dynamic programming, O(|b|) space.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let target: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (j, cb) in target.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(diagonal + 1).min(row[j] + 1);
        }
    }

    row[target.len()]
}

/// The closest candidate name to an unknown identifier, if any lies within
/// the edit budget: one edit for names up to four characters, two beyond.
pub fn closest_name<'a>(unknown: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let budget = if unknown.chars().count() <= 4 { 1 } else { 2 };

    candidates
        .iter()
        .map(|candidate| (edit_distance(unknown, candidate), *candidate))
        .filter(|(distance, _)| *distance <= budget)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Render the "did you mean" hint appended to unknown-identifier errors;
/// empty when no candidate is close enough.
pub fn suggestion_hint(unknown: &str, candidates: &[&str]) -> String {
    match closest_name(unknown, candidates) {
        Some(name) => format!("\n  hint: did you mean `{name}`?"),
        None => String::new(),
    }
}
