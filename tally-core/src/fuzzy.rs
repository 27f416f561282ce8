//! Partial-ratio fuzzy string matching.
//!
//! `ratio` is the classic `2*M / T` similarity where `M` counts the characters
//! covered by the matching blocks of a longest-common-substring decomposition
//! and `T` is the combined length of both strings. `partial_ratio` slides the
//! shorter string over every equally long window of the longer one and keeps
//! the best `ratio`. Scores are integers in 0..=100. Lengths are measured in
//! Unicode scalar values. Matching is case-sensitive; lower-case first.

use std::cmp::Ordering;
use std::collections::HashMap;

/// A run of `size` equal characters starting at `a[a_start]` and `b[b_start]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchingBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

/// Similarity of two whole strings, 0..=100. Empty input scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best `ratio` of the shorter string against any window of the longer one.
///
/// Returns 100 exactly when the shorter string occurs verbatim in the longer.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if longer.contains(shorter) {
        return 100;
    }

    let shorter: Vec<char> = shorter.chars().collect();
    let longer: Vec<char> = longer.chars().collect();
    let width = shorter.len();

    let mut best = 0u8;
    for window in longer.windows(width) {
        let score = ratio_chars(&shorter, window);
        if score > best {
            best = score;
            if best == 100 {
                break;
            }
        }
    }
    best
}

/// Matching blocks of `a` against `b`, sorted and with adjacent blocks merged.
pub fn matching_blocks(a: &str, b: &str) -> Vec<MatchingBlock> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    blocks(&a, &b)
}

fn ratio_chars(a: &[char], b: &[char]) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let matched: usize = blocks(a, b).iter().map(|m| m.size).sum();
    let total = a.len() + b.len();
    // round(100 * 2M / T), exact halves to even
    let (q, r) = (200 * matched / total, 200 * matched % total);
    let rounded = match (2 * r).cmp(&total) {
        Ordering::Less => q,
        Ordering::Greater => q + 1,
        Ordering::Equal => q + q % 2,
    };
    rounded as u8
}

fn blocks(a: &[char], b: &[char]) -> Vec<MatchingBlock> {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut found = Vec::new();
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let m = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if m.size == 0 {
            continue;
        }
        if alo < m.a_start && blo < m.b_start {
            queue.push((alo, m.a_start, blo, m.b_start));
        }
        if m.a_start + m.size < ahi && m.b_start + m.size < bhi {
            queue.push((m.a_start + m.size, ahi, m.b_start + m.size, bhi));
        }
        found.push(m);
    }
    found.sort();

    let mut merged: Vec<MatchingBlock> = Vec::with_capacity(found.len());
    for m in found {
        match merged.last_mut() {
            Some(last)
                if last.a_start + last.size == m.a_start && last.b_start + last.size == m.b_start =>
            {
                last.size += m.size;
            }
            _ => merged.push(m),
        }
    }
    merged
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`; earliest in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> MatchingBlock {
    let mut best = MatchingBlock {
        a_start: alo,
        b_start: blo,
        size: 0,
    };
    // j2len[j] = length of the run ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next.insert(j, k);
                if k > best.size {
                    best = MatchingBlock {
                        a_start: i + 1 - k,
                        b_start: j + 1 - k,
                        size: k,
                    };
                }
            }
        }
        j2len = next;
    }
    best
}
