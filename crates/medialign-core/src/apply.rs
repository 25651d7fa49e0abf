use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};

use crate::matcher::MatchResult;
use crate::vocab::Vocabulary;
use crate::{RunMode, RunOutcome};

/// Language and subtitle-flag markers detected on a sidecar filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangFlags {
    /// Canonical ISO code, if any token was recognized.
    pub lang: Option<String>,
    pub forced: bool,
    pub hearing_impaired: bool,
}

fn boundary(token: &str) -> Regex {
    let pat = format!(
        r"(?i)(?:^|[^A-Za-z0-9]){}(?:[^A-Za-z0-9]|$)",
        regex::escape(token)
    );
    Regex::new(&pat).expect("token pattern")
}

/// Language/flag detector for sidecar names. Patterns compile once per
/// vocabulary, the same way [`crate::normalize::Normalizer`] builds its
/// strip patterns, rather than per name.
pub struct LangDetector {
    lang: Vec<(Regex, String)>,
    forced: Vec<Regex>,
    hearing: Vec<Regex>,
}

impl LangDetector {
    pub fn new(vocab: &Vocabulary) -> Self {
        Self {
            lang: vocab
                .lang_map
                .iter()
                .map(|(token, code)| (boundary(token), code.clone()))
                .collect(),
            forced: ["forced", "forcedsub"].iter().map(|t| boundary(t)).collect(),
            hearing: ["sdh", "hi", "hearing"].iter().map(|t| boundary(t)).collect(),
        }
    }

    /// Detect language/forced/hearing-impaired markers in a sidecar name.
    ///
    /// A language token only counts as the trailing language marker when no
    /// letters follow it (`Movie.2020.en` yes, `Movie.english.version` no);
    /// failing that, the first vocabulary token found anywhere on a
    /// non-alphanumeric boundary wins.
    pub fn detect(&self, name: &str) -> LangFlags {
        let lower = name.to_lowercase();

        // trailing-token pass: earliest qualifying occurrence, vocabulary order
        let mut trailing: Option<(usize, &str)> = None;
        for (re, code) in &self.lang {
            for m in re.find_iter(&lower) {
                // the boundary pattern consumes one trailing delimiter when
                // present; letters after that disqualify the occurrence
                let rest = &lower[m.end()..];
                if rest.chars().any(|c| c.is_ascii_alphabetic()) {
                    continue;
                }
                if trailing.map_or(true, |(start, _)| m.start() < start) {
                    trailing = Some((m.start(), code));
                }
            }
        }

        let lang = match trailing {
            Some((_, code)) => Some(code.to_string()),
            None => self
                .lang
                .iter()
                .find(|(re, _)| re.is_match(&lower))
                .map(|(_, code)| code.clone()),
        };

        let forced = self.forced.iter().any(|re| re.is_match(&lower));
        let hearing_impaired = self.hearing.iter().any(|re| re.is_match(&lower));

        LangFlags {
            lang,
            forced,
            hearing_impaired,
        }
    }
}

/// The canonical name a sidecar should carry next to its primary:
/// `<primary stem>.<lang>[.forced][.hi].<ext>`.
fn canonical_sidecar_path(
    primary_dir: &Path,
    primary_stem: &str,
    ext: &str,
    lang: &str,
    flags: &LangFlags,
) -> PathBuf {
    let mut name = format!("{primary_stem}.{lang}");
    if flags.forced {
        name.push_str(".forced");
    }
    if flags.hearing_impaired {
        name.push_str(".hi");
    }
    name.push('.');
    name.push_str(ext);
    primary_dir.join(name)
}

/// Pick a non-colliding variant of `path` by inserting `.altN` before the
/// extension.
fn collision_free(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}.alt{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// The fix pass: move matched sidecars next to their primary and rename them
/// to the canonical `<primary stem>.<lang>[.forced][.hi].<ext>` form.
///
/// With `apply` false this is a dry run: every intended move/rename is
/// logged and counted, nothing touches the disk. Per-file failures skip that
/// sidecar and keep going; only the counters record them.
pub fn apply_plan(
    results: &[MatchResult],
    vocab: &Vocabulary,
    default_lang: &str,
    apply: bool,
) -> RunOutcome {
    let mut outcome = RunOutcome {
        mode: if apply { RunMode::Applied } else { RunMode::DryRun },
        ..RunOutcome::default()
    };
    let detector = LangDetector::new(vocab);

    for result in results {
        let Some(primary) = &result.primary else {
            warn!(sidecar = %result.sidecar.entry.path.display(), "no primary match, skipping");
            outcome.skipped += 1;
            continue;
        };

        let flags = detector.detect(&result.sidecar.entry.stem);
        let lang = flags.lang.clone().unwrap_or_else(|| default_lang.to_string());
        let target = canonical_sidecar_path(
            primary.entry.dir(),
            &primary.entry.stem,
            &result.sidecar.entry.ext,
            &lang,
            &flags,
        );

        // move up next to the primary first, keeping the original basename
        let mut current = result.sidecar.entry.path.clone();
        if result.sidecar.entry.dir() != primary.entry.dir() {
            let moved_to = primary.entry.dir().join(result.sidecar.entry.file_name());
            if apply {
                if current != moved_to {
                    if let Err(e) = std::fs::rename(&current, &moved_to) {
                        warn!(from = %current.display(), error = %e, "move failed, skipping");
                        outcome.skipped += 1;
                        continue;
                    }
                    info!(from = %current.display(), to = %moved_to.display(), "moved");
                    outcome.moved += 1;
                    current = moved_to;
                }
            } else {
                info!(from = %current.display(), to = %moved_to.display(), "would move");
                outcome.moved += 1;
                current = moved_to;
            }
        }

        // then rename into the canonical form
        if current != target {
            if apply {
                let target = collision_free(&target);
                if let Err(e) = std::fs::rename(&current, &target) {
                    warn!(from = %current.display(), error = %e, "rename failed, skipping");
                    outcome.skipped += 1;
                    continue;
                }
                info!(from = %current.display(), to = %target.display(), "renamed");
                outcome.changed += 1;
            } else {
                info!(from = %current.display(), to = %target.display(), "would rename");
                outcome.changed += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::ThrottledProgress;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn vocab() -> Vocabulary {
        Vocabulary::default()
    }

    #[test]
    fn test_detect_lang_flags() {
        let d = LangDetector::new(&vocab());
        let f = d.detect("Movie.Title.2020.en");
        assert_eq!(f.lang.as_deref(), Some("en"));
        assert!(!f.forced && !f.hearing_impaired);

        let f = d.detect("Movie.spa.forced");
        assert_eq!(f.lang.as_deref(), Some("es"));
        assert!(f.forced);

        let f = d.detect("Movie.eng.sdh");
        assert_eq!(f.lang.as_deref(), Some("en"));
        assert!(f.hearing_impaired);

        let f = d.detect("Movie.Title.2020");
        assert_eq!(f.lang, None);
    }

    #[test]
    fn test_lang_tokens_inside_words_do_not_fire() {
        let d = LangDetector::new(&vocab());
        // "en" inside "Tension", "hi" inside "Hitchhiker"
        let f = d.detect("Tension.2013");
        assert_eq!(f.lang, None);
        let f = d.detect("Hitchhiker");
        assert!(!f.hearing_impaired);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie/Movie.2020.mkv"));
        touch(&root.join("Movie/Subs/Movie.2020.english.srt"));

        let v = vocab();
        let results = plan(root, &v, &ThrottledProgress::new(&|_, _, _, _| {})).unwrap();
        let outcome = apply_plan(&results, &v, "en", false);

        assert_eq!(outcome.mode, RunMode::DryRun);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.changed, 1);
        assert!(root.join("Movie/Subs/Movie.2020.english.srt").exists());
        assert!(!root.join("Movie/Movie.2020.en.srt").exists());
    }

    #[test]
    fn test_already_canonical_name_counts_no_rename() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie/Movie.2020.mkv"));
        // after the move this name is already the canonical one
        touch(&root.join("Movie/Subs/Movie.2020.en.srt"));

        let v = vocab();
        let results = plan(root, &v, &ThrottledProgress::new(&|_, _, _, _| {})).unwrap();
        let outcome = apply_plan(&results, &v, "en", false);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.changed, 0);
    }

    #[test]
    fn test_apply_moves_and_renames() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie/Movie.2020.1080p.mkv"));
        touch(&root.join("Movie/Subs/Movie.2020.1080p.spa.srt"));

        let v = vocab();
        let results = plan(root, &v, &ThrottledProgress::new(&|_, _, _, _| {})).unwrap();
        let outcome = apply_plan(&results, &v, "en", true);

        assert_eq!(outcome.mode, RunMode::Applied);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.changed, 1);
        assert_eq!(outcome.skipped, 0);
        assert!(root.join("Movie/Movie.2020.1080p.es.srt").exists());
        assert!(!root.join("Movie/Subs/Movie.2020.1080p.spa.srt").exists());
    }

    #[test]
    fn test_apply_defaults_language_and_avoids_collisions() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie/Movie.2020.mkv"));
        // no language token at all
        touch(&root.join("Movie/Movie.2020.srt"));
        // occupy the canonical target
        touch(&root.join("Movie/Movie.2020.en.srt"));

        let v = vocab();
        let results = plan(root, &v, &ThrottledProgress::new(&|_, _, _, _| {})).unwrap();
        let outcome = apply_plan(&results, &v, "en", true);

        // the no-token sidecar defaults to "en" and lands on the .alt1 name
        assert!(root.join("Movie/Movie.2020.en.srt").exists());
        assert!(root.join("Movie/Movie.2020.en.alt1.srt").exists());
        assert!(outcome.changed >= 1);
    }

    #[test]
    fn test_unmatched_sidecars_are_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Orphans/Lonely.en.srt"));

        let v = vocab();
        let results = plan(root, &v, &ThrottledProgress::new(&|_, _, _, _| {})).unwrap();
        let outcome = apply_plan(&results, &v, "en", true);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.changed + outcome.moved, 0);
        assert!(root.join("Orphans/Lonely.en.srt").exists());
    }
}
