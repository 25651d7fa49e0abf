use regex::Regex;

use crate::vocab::Vocabulary;

/// The two pure stem normalizers used by identity checks and similarity
/// scoring. Patterns are compiled once from a [`Vocabulary`]; both functions
/// are plain `&str -> String` with no I/O.
#[derive(Debug)]
pub struct Normalizer {
    /// Boundary-delimited language/flag token patterns (identity mode).
    identity_strip: Vec<Regex>,
    /// Boundary-delimited release tag patterns (score mode).
    release_strip: Vec<Regex>,
    bracketed: Regex,
    identity_collapse: Regex,
    score_collapse: Regex,
}

/// A token only matches when delimited by a non-alphanumeric boundary or a
/// string edge, so `en` never fires inside `tension`.
fn boundary_pattern(token: &str) -> Regex {
    let pat = format!(
        r"(?i)(?:^|[^A-Za-z0-9]){}(?:[^A-Za-z0-9]|$)",
        regex::escape(token)
    );
    Regex::new(&pat).expect("token pattern")
}

impl Normalizer {
    pub fn new(vocab: &Vocabulary) -> Self {
        let identity_strip = vocab
            .lang_tokens
            .iter()
            .chain(vocab.flag_tokens.iter())
            .map(|t| boundary_pattern(t))
            .collect();
        let release_strip = vocab
            .release_tags
            .iter()
            .map(|t| boundary_pattern(t))
            .collect();
        Self {
            identity_strip,
            release_strip,
            bracketed: Regex::new(r"[\[\(][^\]\)]*[\]\)]").expect("bracket pattern"),
            identity_collapse: Regex::new(r"[^A-Za-z0-9()]+").expect("collapse pattern"),
            score_collapse: Regex::new(r"[^a-z0-9]+").expect("collapse pattern"),
        }
    }

    /// Identity form of a stem: language and subtitle-flag tokens removed,
    /// separators collapsed, lower-cased. Resolution/codec tags are kept on
    /// purpose; a 720p rip and a 1080p rip are different identities.
    ///
    /// Token stripping runs to a fixpoint so the result is idempotent even
    /// when tokens sit back to back (`Movie.en.eng.srt`).
    pub fn identity_key(&self, stem: &str) -> String {
        let mut cur = stem.to_string();
        loop {
            let mut next = cur.clone();
            for re in &self.identity_strip {
                next = re.replace_all(&next, " ").into_owned();
            }
            if next == cur {
                break;
            }
            cur = next;
        }
        self.identity_collapse
            .replace_all(&cur, " ")
            .trim()
            .to_lowercase()
    }

    /// Scoring form of a stem: lower-cased, bracketed spans dropped, release
    /// tags dropped, separators collapsed. Release tags would otherwise
    /// dominate the similarity ratio between two near-identical titles.
    pub fn score_key(&self, stem: &str) -> String {
        let mut s = stem.to_lowercase();
        s = self.bracketed.replace_all(&s, " ").into_owned();
        for re in &self.release_strip {
            s = re.replace_all(&s, " ").into_owned();
        }
        self.score_collapse
            .replace_all(&s, " ")
            .trim()
            .to_string()
    }
}
