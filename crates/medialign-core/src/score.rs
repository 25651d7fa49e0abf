use crate::normalize::Normalizer;
use crate::vocab::Vocabulary;

/// Longest matching block between `a[alo..ahi]` and `b[blo..bhi]`:
/// returns (start in a, start in b, length).
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);
    // j2len[j] = length of the longest match ending at a[i], b[j]
    let mut j2len = vec![0usize; bhi.saturating_sub(blo)];
    for i in alo..ahi {
        let mut new_j2len = vec![0usize; bhi - blo];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = if j > blo { j2len[j - blo - 1] + 1 } else { 1 };
                new_j2len[j - blo] = k;
                if k > bestsize {
                    besti = i + 1 - k;
                    bestj = j + 1 - k;
                    bestsize = k;
                }
            }
        }
        j2len = new_j2len;
    }
    (besti, bestj, bestsize)
}

/// Total matched characters per the Ratcliff/Obershelp block decomposition:
/// take the longest common block, then recurse on the pieces to its left and
/// right.
fn matching_chars(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> usize {
    let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
    if k == 0 {
        return 0;
    }
    k + matching_chars(a, b, alo, i, blo, j) + matching_chars(a, b, i + k, ahi, j + k, bhi)
}

/// Matching-blocks similarity ratio in [0, 1]: `2·M / (len(a) + len(b))`
/// where M is the matched character total. Tolerant of limited reordering,
/// unlike an edit distance. Two empty strings compare as 1.0.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b, 0, a.len(), 0, b.len());
    2.0 * matched as f64 / total as f64
}

/// Match-confidence scorer between a sidecar stem and a candidate primary
/// stem. The result strictly orders candidates but is not bounded to [0, 1]:
/// bonuses can push it past 1.0, and callers rely only on ordering plus the
/// documented low-confidence threshold.
#[derive(Debug)]
pub struct Scorer {
    normalizer: Normalizer,
    release_tags: Vec<String>,
}

/// Scores below this mark a non-`ok` disposition as low confidence.
pub const LOW_CONFIDENCE: f64 = 0.60;

impl Scorer {
    pub fn new(vocab: &Vocabulary) -> Self {
        Self {
            normalizer: Normalizer::new(vocab),
            release_tags: vocab
                .release_tags
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Score a (sidecar stem, primary stem) pair.
    ///
    /// Base: sequence ratio over the score-normalized stems. Each release tag
    /// present in both raw stems adds +0.2; shared release markers are strong
    /// evidence even though they are stripped from the base comparison. A mild
    /// length bias (`min(len/200, 0.4)`) prefers fully-qualified primary
    /// names over trailers and samples.
    pub fn score(&self, sidecar_stem: &str, primary_stem: &str) -> f64 {
        let s_norm = self.normalizer.score_key(sidecar_stem);
        let p_norm = self.normalizer.score_key(primary_stem);
        let mut score = sequence_ratio(&s_norm, &p_norm);

        let s_low = sidecar_stem.to_lowercase();
        let p_low = primary_stem.to_lowercase();
        for tag in &self.release_tags {
            if s_low.contains(tag.as_str()) && p_low.contains(tag.as_str()) {
                score += 0.2;
            }
        }

        score += (primary_stem.chars().count() as f64 / 200.0).min(0.4);
        score
    }
}
