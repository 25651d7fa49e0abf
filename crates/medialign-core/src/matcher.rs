use std::path::PathBuf;

use crate::library::{PrimaryFile, SidecarFile};
use crate::score::{Scorer, LOW_CONFIDENCE};

/// Sentinel score emitted when a container has zero primary candidates.
pub const NO_CANDIDATE_SCORE: f64 = -1.0;

/// Classification of a sidecar relative to its matched primary's location
/// and naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Co-located and identity-equivalent.
    Ok,
    /// Identity-equivalent but in a different directory.
    NeedsMove,
    /// Co-located but not identity-equivalent.
    NeedsRename,
    /// Neither co-located nor identity-equivalent.
    NeedsMoveAndRename,
    /// The container directory has no primary files at all.
    NoPrimaryInContainer,
}

impl Disposition {
    fn base_label(&self) -> &'static str {
        match self {
            Disposition::Ok => "ok",
            Disposition::NeedsMove => "needs_move",
            Disposition::NeedsRename => "needs_rename",
            Disposition::NeedsMoveAndRename => "needs_move_and_rename",
            Disposition::NoPrimaryInContainer => "no_primary_in_container",
        }
    }

    /// Whether this disposition requires moving the sidecar.
    pub fn needs_move(&self) -> bool {
        matches!(self, Disposition::NeedsMove | Disposition::NeedsMoveAndRename)
    }

    /// Whether this disposition requires renaming the sidecar.
    pub fn needs_rename(&self) -> bool {
        matches!(self, Disposition::NeedsRename | Disposition::NeedsMoveAndRename)
    }
}

/// The disposition of one sidecar against one matched primary.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub sidecar: SidecarFile,
    pub primary: Option<PrimaryFile>,
    /// Match confidence; [`NO_CANDIDATE_SCORE`] when no candidates existed.
    /// Not bounded to [0, 1]; bonuses can push it past 1.0.
    pub score: f64,
    pub disposition: Disposition,
    /// True when `score < 0.60` and the disposition is not `ok`.
    pub low_confidence: bool,
    /// `dirname(primary)/stem(primary).<sidecar ext>`, empty when unmatched.
    pub suggested_path: Option<PathBuf>,
}

impl MatchResult {
    /// The disposition string of the reporting contract, with the optional
    /// `_lowconf` suffix.
    pub fn disposition_label(&self) -> String {
        if self.low_confidence {
            format!("{}_lowconf", self.disposition.base_label())
        } else {
            self.disposition.base_label().to_string()
        }
    }
}

/// Select the best-scoring candidate for a sidecar. Ties keep the first
/// candidate encountered. Returns `(None, -1.0)` when `candidates` is empty.
pub fn best_match<'a>(
    scorer: &Scorer,
    sidecar: &SidecarFile,
    candidates: &'a [PrimaryFile],
) -> (Option<&'a PrimaryFile>, f64) {
    let mut best: Option<&PrimaryFile> = None;
    let mut best_score = NO_CANDIDATE_SCORE;
    for candidate in candidates {
        let score = scorer.score(&sidecar.entry.stem, &candidate.entry.stem);
        if score > best_score {
            best = Some(candidate);
            best_score = score;
        }
    }
    (best, best_score)
}

/// Map the (same directory?, same identity?) combination to a disposition.
///
/// Identity-equivalence compares the identity-normalized stems: language and
/// flag tokens stripped, resolution/codec tokens kept, so `Movie.en` matches
/// `Movie.1080p` only if the resolution token agrees (it does not, so that pair
/// is a rename candidate, not equivalent).
pub fn classify(
    scorer: &Scorer,
    sidecar: &SidecarFile,
    primary: &PrimaryFile,
    score: f64,
) -> (Disposition, bool) {
    let same_dir = primary.entry.dir() == sidecar.entry.dir();
    let same_identity = scorer.normalizer().identity_key(&sidecar.entry.stem)
        == scorer.normalizer().identity_key(&primary.entry.stem);

    let disposition = match (same_dir, same_identity) {
        (true, true) => Disposition::Ok,
        (false, true) => Disposition::NeedsMove,
        (true, false) => Disposition::NeedsRename,
        (false, false) => Disposition::NeedsMoveAndRename,
    };
    let low_confidence = score < LOW_CONFIDENCE && disposition != Disposition::Ok;
    (disposition, low_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::PathEntry;
    use crate::vocab::Vocabulary;
    use std::path::Path;

    fn sidecar(path: &str) -> SidecarFile {
        let container = Path::new(path).parent().unwrap().to_path_buf();
        SidecarFile {
            entry: PathEntry::new(path.into()),
            container,
        }
    }

    fn primary(path: &str) -> PrimaryFile {
        PrimaryFile {
            entry: PathEntry::new(path.into()),
        }
    }

    #[test]
    fn test_no_candidates_yields_sentinel() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/Movie/Movie.en.srt");
        let (best, score) = best_match(&scorer, &s, &[]);
        assert!(best.is_none());
        assert_eq!(score, NO_CANDIDATE_SCORE);
    }

    #[test]
    fn test_best_match_and_needs_rename() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/Movie/Movie.Title.2020.en.srt");
        let candidates = vec![
            primary("/lib/Movie/Movie.Title.2020.1080p.mkv"),
            primary("/lib/Movie/OtherFilm.mkv"),
        ];
        let (best, score) = best_match(&scorer, &s, &candidates);
        let best = best.unwrap();
        assert_eq!(best.entry.stem, "Movie.Title.2020.1080p");

        // identity drops the language token from the sidecar but keeps the
        // resolution tag on the primary: same dir, different identity
        let (disposition, low) = classify(&scorer, &s, best, score);
        assert_eq!(disposition, Disposition::NeedsRename);
        assert!(!low, "score: {score}");
    }

    #[test]
    fn test_colocated_equivalent_is_ok() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/Movie/Movie.Title.2020.1080p.en.srt");
        let p = primary("/lib/Movie/Movie.Title.2020.1080p.mkv");
        let score = scorer.score(&s.entry.stem, &p.entry.stem);
        let (disposition, low) = classify(&scorer, &s, &p, score);
        assert_eq!(disposition, Disposition::Ok);
        assert!(!low);
    }

    #[test]
    fn test_subdirectory_sidecar_needs_move() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/Movie/Subs/Movie.Title.2020.1080p.en.srt");
        let p = primary("/lib/Movie/Movie.Title.2020.1080p.mkv");
        let score = scorer.score(&s.entry.stem, &p.entry.stem);
        let (disposition, _) = classify(&scorer, &s, &p, score);
        assert!(disposition.needs_move());
        assert_eq!(disposition, Disposition::NeedsMove);
    }

    #[test]
    fn test_low_confidence_suffix() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/Movie/Subs/2_English.srt");
        let p = primary("/lib/Movie/Something.Entirely.Different.mkv");
        let score = scorer.score(&s.entry.stem, &p.entry.stem);
        assert!(score < LOW_CONFIDENCE, "score: {score}");
        let (disposition, low) = classify(&scorer, &s, &p, score);
        assert!(low);
        let r = MatchResult {
            sidecar: s,
            primary: Some(p),
            score,
            disposition,
            low_confidence: low,
            suggested_path: None,
        };
        assert!(r.disposition_label().ends_with("_lowconf"));
    }

    #[test]
    fn test_ok_never_gets_lowconf() {
        let scorer = Scorer::new(&Vocabulary::default());
        // same identity but tiny stems keep the ratio low; `ok` must still
        // not carry the suffix
        let s = sidecar("/lib/M/a.en.srt");
        let p = primary("/lib/M/a.mkv");
        let (disposition, low) = classify(&scorer, &s, &p, 0.1);
        assert_eq!(disposition, Disposition::Ok);
        assert!(!low);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let scorer = Scorer::new(&Vocabulary::default());
        let s = sidecar("/lib/M/Movie.en.srt");
        let candidates = vec![
            primary("/lib/M/Movie.mkv"),
            primary("/lib/M/eivoM.mkv"), // same length, lower score either way
            primary("/lib/M/Movie.mp4"), // identical stem -> identical score
        ];
        let (best, _) = best_match(&scorer, &s, &candidates);
        assert_eq!(best.unwrap().entry.path, Path::new("/lib/M/Movie.mkv"));
    }
}
