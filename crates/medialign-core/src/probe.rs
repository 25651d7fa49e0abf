use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::tag::TagError;
use crate::tools::require_tool;

/// One audio track as reported by the probe. `stream_index` is the ordinal in
/// the container's stream table (the index external tools address), not a
/// 1-based audio-only position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub stream_index: u32,
    pub codec: String,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    /// Language tag, `und` when the container carries none.
    pub language: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

/// Probe a file's audio tracks with ffprobe. Read fresh per file, never
/// cached.
pub fn probe_audio_tracks(path: &Path) -> Result<Vec<AudioTrack>, TagError> {
    let ffprobe = require_tool("ffprobe")?;
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name,channels,channel_layout:stream_tags=language,title",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| TagError::ProbeFailed {
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(TagError::ProbeFailed {
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_audio_tracks(&String::from_utf8_lossy(&output.stdout))
}

fn parse_audio_tracks(json: &str) -> Result<Vec<AudioTrack>, TagError> {
    let parsed: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| TagError::ProbeFailed {
            message: format!("unparseable ffprobe output: {e}"),
        })?;

    Ok(parsed
        .streams
        .into_iter()
        .filter(|s| s.codec_type == "audio")
        .map(|s| AudioTrack {
            stream_index: s.index,
            codec: s.codec_name.unwrap_or_default(),
            channels: s.channels,
            channel_layout: s.channel_layout,
            language: s
                .tags
                .language
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| "und".to_string()),
            title: s.tags.title,
        })
        .collect())
}

/// Probe a file's duration in seconds; None when ffprobe cannot tell.
/// Used to derive remux progress from elapsed output timestamps.
pub fn probe_duration_seconds(path: &Path) -> Option<f64> {
    let ffprobe = require_tool("ffprobe").ok()?;
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=nw=1:nk=1",
        ])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "streams": [
        {"index": 0, "codec_type": "video", "codec_name": "h264"},
        {"index": 1, "codec_type": "audio", "codec_name": "dts",
         "channels": 6, "channel_layout": "5.1",
         "tags": {"language": "eng", "title": "Surround"}},
        {"index": 2, "codec_type": "audio", "codec_name": "aac",
         "channels": 2, "channel_layout": "stereo"},
        {"index": 3, "codec_type": "subtitle", "codec_name": "subrip",
         "tags": {"language": "eng"}}
      ]
    }"#;

    #[test]
    fn test_parse_audio_tracks() {
        let tracks = parse_audio_tracks(SAMPLE).unwrap();
        assert_eq!(tracks.len(), 2);

        assert_eq!(tracks[0].stream_index, 1);
        assert_eq!(tracks[0].codec, "dts");
        assert_eq!(tracks[0].channels, Some(6));
        assert_eq!(tracks[0].language, "eng");
        assert_eq!(tracks[0].title.as_deref(), Some("Surround"));

        // untagged track falls back to "und"
        assert_eq!(tracks[1].stream_index, 2);
        assert_eq!(tracks[1].language, "und");
        assert_eq!(tracks[1].title, None);
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_audio_tracks("{}").unwrap().is_empty());
        assert!(parse_audio_tracks("not json").is_err());
    }
}
