//! Name normalisation and the two comparison tiers.
//!
//! Spreadsheet client names are free text ("ACME Corp (Legacy Server)",
//! "acme  inc"), so device disambiguation uses a fuzzy similarity ratio over
//! normalised names. Tag names, tag values and ids must match exactly once
//! cosmetic differences (case, punctuation, spacing) are removed; that is
//! [`clean`] plus [`clean_compare`].

/// Minimum similarity for two client names to count as the same client.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Normalises a human-entered client name.
///
/// Drops everything up to and including the first `(` when no parenthesis
/// precedes it, removes the remaining parentheses, collapses whitespace and
/// lower-cases.
pub fn normalize_name(name: &str) -> String {
    let rest = match name.find(['(', ')']) {
        Some(pos) if name[pos..].starts_with('(') => &name[pos + 1..],
        _ => name,
    };
    rest.replace(['(', ')'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Strips every non-alphanumeric character and lower-cases.
pub fn clean(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Exact comparison modes applied after [`clean`] on both sides.
#[derive(Debug, Clone, Copy)]
pub enum Comparator<'a> {
    /// Cleaned values are equal.
    Equals(&'a str),
    /// The cleaned left side is a substring of the cleaned right side.
    ContainedIn(&'a str),
    /// The cleaned left side equals one of the cleaned candidates.
    OneOf(&'a [String]),
}

/// Compares `value` against the comparator's operand after cleaning both.
pub fn clean_compare(value: &str, comparator: Comparator<'_>) -> bool {
    let value = clean(value);
    match comparator {
        Comparator::Equals(other) => value == clean(other),
        Comparator::ContainedIn(other) => clean(other).contains(&value),
        Comparator::OneOf(candidates) => candidates.iter().any(|c| clean(c) == value),
    }
}

/// Ratcliff/Obershelp similarity: `2 * M / (len(a) + len(b))` where `M` is
/// the total size of the recursively found longest matching blocks. Two
/// empty strings are identical (`1.0`).
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_of(&a, &b)
}

fn ratio_of(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(a, b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

// Earliest longest common block of a[alo..ahi] and b[blo..bhi].
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    let mut cur = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let k = if a[i] == b[j] { prev[j - blo] + 1 } else { 0 };
            cur[j - blo + 1] = k;
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
        cur.fill(0);
    }

    best
}

/// Similarity tuned for client names (a partial ratio).
///
/// Equal-length names use [`similarity_ratio`]. Otherwise the shorter name
/// is scored against every equally long window of the longer one and the best
/// window wins, so "acme" scores `1.0` against "acme inc" but only `0.75`
/// against "ac me".
pub fn client_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if short.is_empty() || short.len() == long.len() {
        return ratio_of(&a, &b);
    }

    long.windows(short.len())
        .map(|window| ratio_of(short, window))
        .fold(0.0, f64::max)
}

/// Whether two already-normalised names clear [`SIMILARITY_THRESHOLD`].
pub fn is_similar(a: &str, b: &str) -> bool {
    client_similarity(a, b) >= SIMILARITY_THRESHOLD
}

/// Normalises both client names and checks similarity.
pub fn client_names_match(query: &str, candidate: &str) -> bool {
    is_similar(&normalize_name(query), &normalize_name(candidate))
}
