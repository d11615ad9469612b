//! Deterministic similarity scoring and window search for anchor
//! reconciliation: Levenshtein + Jaccard combined score, sliding-window
//! search over a candidate source, and context-region localization.
//!
//! All line numbers in this module's public API are 1-indexed, matching
//! [`crate::core::model::Anchor`]'s wire representation.

use crate::core::hash::{context_hash, normalize_text};

/// Default similarity threshold below which two spans are not a match.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Default half-width, in lines, of the sliding-window search around the
/// anchor's last-known position.
pub const DEFAULT_FALLBACK_WINDOW: usize = 500;

/// Default half-width, in lines, of the localized search around a
/// context-region match.
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;

/// Combined similarity score between two text spans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    /// Normalized Levenshtein similarity in `[0, 1]`.
    pub levenshtein: f64,
    /// Word-bigram Jaccard similarity in `[0, 1]`.
    pub jaccard: f64,
    /// Mean of `levenshtein` and `jaccard`.
    pub combined: f64,
}

/// Normalized Levenshtein similarity: `1 - edit_distance / max_len`.
///
/// - Two identical strings (including both empty) score `1.0`.
/// - Either string empty (and not both) scores `0.0`.
pub fn levenshtein_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = levenshtein_distance(&a, &b);
    let max_len = a.len().max(b.len()) as f64;
    1.0 - (distance as f64 / max_len)
}

/// Wagner-Fischer edit distance, single-row DP.
fn levenshtein_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn extract_bigrams(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return Vec::new();
    }
    words
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect()
}

/// Word-bigram Jaccard similarity.
///
/// - Both texts empty scores `1.0`.
/// - Exactly one empty scores `0.0`.
/// - Either text has fewer than two words: falls back to a word-set
///   Jaccard comparison.
pub fn jaccard_similarity(s1: &str, s2: &str) -> f64 {
    let w1: Vec<&str> = s1.split_whitespace().collect();
    let w2: Vec<&str> = s2.split_whitespace().collect();

    if w1.is_empty() && w2.is_empty() {
        return 1.0;
    }
    if w1.is_empty() || w2.is_empty() {
        return 0.0;
    }

    if w1.len() < 2 || w2.len() < 2 {
        let set1: std::collections::HashSet<&str> = w1.into_iter().collect();
        let set2: std::collections::HashSet<&str> = w2.into_iter().collect();
        return jaccard_of_sets(&set1, &set2);
    }

    let b1 = extract_bigrams(s1);
    let b2 = extract_bigrams(s2);
    let set1: std::collections::HashSet<&str> = b1.iter().map(String::as_str).collect();
    let set2: std::collections::HashSet<&str> = b2.iter().map(String::as_str).collect();
    jaccard_of_sets(&set1, &set2)
}

fn jaccard_of_sets(set1: &std::collections::HashSet<&str>, set2: &std::collections::HashSet<&str>) -> f64 {
    let intersection = set1.intersection(set2).count();
    let union = set1.union(set2).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Compute the combined similarity score between two spans, after NFC
/// normalization of both.
pub fn compute_similarity(s1: &str, s2: &str) -> SimilarityScore {
    let n1 = normalize_text(s1);
    let n2 = normalize_text(s2);
    let levenshtein = levenshtein_similarity(&n1, &n2);
    let jaccard = jaccard_similarity(&n1, &n2);
    SimilarityScore {
        levenshtein,
        jaccard,
        combined: (levenshtein + jaccard) / 2.0,
    }
}

/// Whether a similarity score clears the match threshold.
pub fn is_match(score: &SimilarityScore, threshold: f64) -> bool {
    score.combined >= threshold
}

/// A candidate match produced by [`find_best_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// 1-indexed line at which the candidate window starts.
    pub line_start: usize,
    /// 1-indexed line at which the candidate window ends (inclusive).
    pub line_end: usize,
    /// Similarity of the candidate window's text against the needle.
    pub score: SimilarityScore,
}

/// Search `haystack` lines for the best match to `needle_lines`, within
/// `max_window` lines of `origin_line` (1-indexed), trying window lengths
/// from `0.8 * needle_lines.len()` to `1.2 * needle_lines.len()` (clamped
/// to at least 1 line). Returns `None` if no candidate clears
/// `threshold`.
pub fn find_best_match(
    haystack: &[String],
    needle_lines: &[String],
    origin_line: usize,
    max_window: usize,
    threshold: f64,
) -> Option<MatchCandidate> {
    if needle_lines.is_empty() || haystack.is_empty() || origin_line == 0 {
        return None;
    }
    let needle_text = needle_lines.join("\n");
    let needle_len = needle_lines.len();

    let min_window = ((needle_len as f64 * 0.8) as usize).max(1);
    let max_window_len = (needle_len as f64 * 1.2) as usize + 1;

    let origin0 = origin_line - 1;
    let search_start = origin0.saturating_sub(max_window);
    let search_end = (origin0 + max_window).min(haystack.len().saturating_sub(1));

    let mut candidates: Vec<MatchCandidate> = Vec::new();

    for window_len in min_window..=max_window_len.max(min_window) {
        if window_len == 0 || window_len > haystack.len() {
            continue;
        }
        for start in search_start..=search_end {
            let end = start + window_len;
            if end > haystack.len() {
                break;
            }
            let window_text = haystack[start..end].join("\n");
            let score = compute_similarity(&needle_text, &window_text);
            if is_match(&score, threshold) {
                candidates.push(MatchCandidate {
                    line_start: start + 1,
                    line_end: end,
                    score,
                });
            }
        }
    }

    disambiguate_candidates(candidates, origin_line)
}

/// Tie-break: pick the highest-scoring candidate; among candidates whose
/// combined score is within `0.05` of the best, prefer the one closest to
/// `origin_line`.
fn disambiguate_candidates(
    mut candidates: Vec<MatchCandidate>,
    origin_line: usize,
) -> Option<MatchCandidate> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| {
        b.score
            .combined
            .partial_cmp(&a.score.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let best_score = candidates[0].score.combined;
    let mut near_best: Vec<MatchCandidate> = candidates
        .into_iter()
        .take_while(|c| best_score - c.score.combined < 0.05)
        .collect();

    near_best.sort_by(|a, b| {
        a.line_start
            .abs_diff(origin_line)
            .cmp(&b.line_start.abs_diff(origin_line))
            .then(a.line_start.cmp(&b.line_start))
    });
    near_best.into_iter().next()
}

/// A 1-indexed, inclusive line range located between a context-before and
/// context-after hash match: `line_start` is the first line after the
/// before-context, `line_end` is the last line before the after-context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextRegion {
    /// 1-indexed first line of the candidate zone.
    pub line_start: usize,
    /// 1-indexed last line of the candidate zone.
    pub line_end: usize,
}

impl ContextRegion {
    /// Midpoint of the located region, as a 1-indexed line number.
    pub fn midpoint(&self) -> usize {
        (self.line_start + self.line_end) / 2
    }
}

/// Locate the zone between a run of `context_lines` lines hashing to
/// `context_hash_before` and the following run hashing to
/// `context_hash_after`. Returns `None` unless both are found, matching
/// the all-or-nothing localization the original reconciler performs (a
/// one-sided context match is not trusted to narrow the search).
pub fn find_context_region(
    haystack: &[String],
    context_hash_before: &str,
    context_hash_after: &str,
    context_lines: usize,
) -> Option<ContextRegion> {
    if context_lines == 0 || context_lines > haystack.len() {
        return None;
    }
    let haystack_len = haystack.len();

    let mut before_end0 = None;
    for start in 0..=(haystack_len - context_lines) {
        if context_hash(&haystack[start..start + context_lines]) == context_hash_before {
            before_end0 = Some(start + context_lines);
            break;
        }
    }
    let before_end0 = before_end0?;

    if before_end0 > haystack_len.saturating_sub(context_lines) {
        return None;
    }
    let mut after_start0 = None;
    for start in before_end0..=(haystack_len - context_lines) {
        if context_hash(&haystack[start..start + context_lines]) == context_hash_after {
            after_start0 = Some(start);
            break;
        }
    }
    let after_start0 = after_start0?;

    Some(ContextRegion {
        line_start: before_end0 + 1,
        line_end: after_start0,
    })
}

/// Localize the anchor body using the context-hash region first,
/// searching a narrow `context_window` around its midpoint; if the
/// region can't be found, or nothing scores above `threshold` within it,
/// fall back to a full sliding-window search centered on `origin_line`
/// with the wider `fallback_window`.
#[allow(clippy::too_many_arguments)]
pub fn find_best_match_with_context(
    haystack: &[String],
    needle_lines: &[String],
    context_hash_before: &str,
    context_hash_after: &str,
    context_lines: usize,
    origin_line: usize,
    context_window: usize,
    fallback_window: usize,
    threshold: f64,
) -> Option<MatchCandidate> {
    if let Some(region) = find_context_region(haystack, context_hash_before, context_hash_after, context_lines) {
        if let Some(candidate) =
            find_best_match(haystack, needle_lines, region.midpoint(), context_window, threshold)
        {
            return Some(candidate);
        }
    }
    find_best_match(haystack, needle_lines, origin_line, fallback_window, threshold)
}
