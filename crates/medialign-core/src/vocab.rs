/// Language tokens that show up in subtitle filenames: ISO-639-ish codes and
/// their English names.
const LANG_TOKENS: &[&str] = &[
    "en", "eng", "english",
    "es", "spa", "spanish",
    "fr", "fra", "french",
    "pt", "por", "pt-br", "ptbr",
    "it", "ita",
    "de", "deu", "ger",
    "ru", "rus",
    "zh", "chi", "chs", "cht",
    "ja", "jpn",
    "ko", "kor",
];

/// Subtitle flag markers (forced track, hearing-impaired).
const FLAG_TOKENS: &[&str] = &["forced", "forcedsub", "sdh", "hi", "hearing"];

/// Release markers: resolution, codec, source, HDR/audio tags.
const RELEASE_TAGS: &[&str] = &[
    "2160p", "1080p", "720p", "480p",
    "x265", "hevc", "x264", "h264",
    "remux", "bluray", "web", "webrip", "web-dl", "dvdrip",
    "hdr", "hdr10", "dv", "atmos", "dts", "aac",
];

/// (token, canonical ISO code) pairs for language canonicalization.
const LANG_MAP: &[(&str, &str)] = &[
    ("en", "en"), ("eng", "en"), ("english", "en"),
    ("es", "es"), ("spa", "es"), ("spanish", "es"), ("es-419", "es"), ("es-es", "es"),
    ("pt", "pt"), ("por", "pt"), ("pt-br", "pt"), ("ptbr", "pt"),
    ("fr", "fr"), ("fra", "fr"), ("french", "fr"),
    ("it", "it"), ("ita", "it"),
    ("de", "de"), ("deu", "de"), ("ger", "de"),
    ("ru", "ru"), ("rus", "ru"),
    ("zh", "zh"), ("chi", "zh"), ("chs", "zh"), ("cht", "zh"),
    ("ja", "ja"), ("jpn", "ja"),
    ("ko", "ko"), ("kor", "ko"),
];

const PRIMARY_EXTS: &[&str] = &["mkv", "mp4", "m4v", "avi", "mov"];
const SIDECAR_EXTS: &[&str] = &["srt"];

/// Token vocabularies for normalization, scoring and language detection.
///
/// All the inline string tables the matching logic depends on live here as
/// one explicit configuration value; `Default` carries the fixed sets the
/// library ships with. None of the lists needs to be exhaustive: unknown
/// tokens simply stay in a normalized stem and lower similarity naturally.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Language tokens stripped by identity-normalize.
    pub lang_tokens: Vec<String>,
    /// Subtitle flag tokens stripped by identity-normalize.
    pub flag_tokens: Vec<String>,
    /// Release tags stripped by score-normalize and used for the shared-tag
    /// scoring bonus.
    pub release_tags: Vec<String>,
    /// (language token, canonical ISO code) pairs, in detection priority
    /// order; the fallback scan tries them front to back.
    pub lang_map: Vec<(String, String)>,
    /// Primary (video) file extensions, lower-case, without the dot.
    pub primary_exts: Vec<String>,
    /// Sidecar (subtitle) file extensions, lower-case, without the dot.
    pub sidecar_exts: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            lang_tokens: LANG_TOKENS.iter().map(|s| s.to_string()).collect(),
            flag_tokens: FLAG_TOKENS.iter().map(|s| s.to_string()).collect(),
            release_tags: RELEASE_TAGS.iter().map(|s| s.to_string()).collect(),
            lang_map: LANG_MAP
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            primary_exts: PRIMARY_EXTS.iter().map(|s| s.to_string()).collect(),
            sidecar_exts: SIDECAR_EXTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Vocabulary {
    /// Check whether `ext` (without the dot, any case) is a primary extension.
    pub fn is_primary_ext(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.primary_exts.iter().any(|e| *e == ext)
    }

    /// Check whether `ext` (without the dot, any case) is a sidecar extension.
    pub fn is_sidecar_ext(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.sidecar_exts.iter().any(|e| *e == ext)
    }

    /// Canonical ISO code for a language token, if known.
    pub fn canonical_lang(&self, token: &str) -> Option<&str> {
        let token = token.to_ascii_lowercase();
        self.lang_map
            .iter()
            .find(|(k, _)| *k == token)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lists() {
        let v = Vocabulary::default();
        assert!(v.is_primary_ext("mkv"));
        assert!(v.is_primary_ext("MKV"));
        assert!(!v.is_primary_ext("srt"));
        assert!(v.is_sidecar_ext("srt"));
        assert!(!v.is_sidecar_ext("mkv"));
    }

    #[test]
    fn test_canonical_lang() {
        let v = Vocabulary::default();
        assert_eq!(v.canonical_lang("eng"), Some("en"));
        assert_eq!(v.canonical_lang("English"), Some("en"));
        assert_eq!(v.canonical_lang("spa"), Some("es"));
        assert_eq!(v.canonical_lang("xx"), None);
    }
}
