//! Near-match suggestions for mistyped command names

/// Largest edit distance still considered a typo
const MAX_DISTANCE: usize = 3;

/// Up to two candidates close to `name`: prefix matches first, then the
/// closest ones by edit distance.
pub fn suggest<'a, I>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lower = name.to_lowercase();
    let mut scored: Vec<(usize, usize, &str)> = Vec::new();

    for (order, candidate) in candidates.into_iter().enumerate() {
        if candidate == lower {
            continue;
        }
        if !lower.is_empty() && candidate.starts_with(&lower) {
            scored.push((0, order, candidate));
            continue;
        }
        let dist = levenshtein(&lower, candidate);
        if dist <= MAX_DISTANCE && dist < candidate.chars().count().max(1) {
            scored.push((dist, order, candidate));
        }
    }

    scored.sort();
    scored.into_iter().take(2).map(|(_, _, c)| c.to_string()).collect()
}

/// `Did you mean `a` or `b`?`, or `None` without candidates
pub fn did_you_mean(suggestions: &[String]) -> Option<String> {
    if suggestions.is_empty() {
        return None;
    }
    let quoted: Vec<String> = suggestions.iter().map(|s| format!("`{}`", s)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    let mut prev_row: Vec<usize> = (0..=n).collect();
    let mut curr_row = vec![0usize; n + 1];

    for (i, a_ch) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != b_ch);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[n]
}
