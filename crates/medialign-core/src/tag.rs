use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::{CancellationToken, CancelledError};
use crate::probe::{probe_duration_seconds, AudioTrack};
use crate::tools::require_tool;
use crate::tracker::ChangeTracker;

/// Copy chunk for backups. Progress is reported per chunk, not per byte.
const BACKUP_CHUNK: usize = 16 * 1024 * 1024;

/// Extensions the tagging engine can mutate.
const TAG_EXTS: &[&str] = &["mkv", "mp4", "m4v"];

/// Errors from the tagging engine.
///
/// Backup failure is fatal to the whole run, since no safe mutation can proceed
/// without a recovery point. Everything else is scoped to the current file.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// Could not read the target's stream layout.
    #[error("probe failed: {message}")]
    ProbeFailed { message: String },

    /// The target has no audio tracks to tag.
    #[error("no audio tracks found")]
    NoAudioTracks,

    /// The chosen stream index is not one of the probed audio tracks.
    #[error("selected stream index {index} is not an audio track")]
    SelectionInvalid { index: u32 },

    /// A required external tool is not on PATH.
    #[error("tool not found: {tool}")]
    ToolNotAvailable { tool: String },

    /// An external tool exited non-zero or could not be executed.
    #[error("{tool} failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    /// The container format cannot be edited by any known tool.
    #[error("unsupported container: .{ext}")]
    UnsupportedContainer { ext: String },

    /// Creating the pre-edit backup failed. Run-fatal.
    #[error("backup failed: {0}")]
    BackupFailed(std::io::Error),

    /// The run was cancelled.
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}

impl TagError {
    /// Whether this error must abort the whole run rather than one file.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, TagError::BackupFailed(_) | TagError::Cancelled(_))
    }
}

/// Container formats the engine knows how to edit, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Edited in place with mkvpropedit.
    Matroska,
    /// No in-place editing; requires a stream-copy remux through ffmpeg.
    Mp4,
}

impl MediaFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("mkv") => Some(MediaFormat::Matroska),
            Some("mp4") | Some("m4v") => Some(MediaFormat::Mp4),
            _ => None,
        }
    }
}

/// Whether `path` has an extension the tagging engine accepts.
pub fn is_tag_target(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map_or(false, |ext| TAG_EXTS.contains(&ext.as_str()))
}

/// Collect tagging targets from a file or directory argument. Directories
/// are walked recursively, files visited in sorted order.
pub fn collect_targets(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_tag_target(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_tag_target(p))
        .collect()
}

/// The change to apply to one target: which track becomes the default, and
/// the language/title to stamp on it.
#[derive(Debug, Clone)]
pub struct TagRequest {
    /// Stream-table index of the chosen audio track (as probed).
    pub stream_index: u32,
    /// Language code to set, e.g. `eng`.
    pub language: String,
    /// Track title to set, e.g. `English`.
    pub title: String,
}

/// Progress of one engine stage as a fraction in [0, 1] plus a short label.
/// Rendering is entirely a caller concern.
#[derive(Debug, Clone)]
pub struct TagProgress {
    pub stage: &'static str,
    pub fraction: f64,
    pub detail: String,
}

pub type TagProgressFn<'a> = &'a mut dyn FnMut(TagProgress);

/// Suggest a track to make default: the first English-tagged one, otherwise
/// the one with the most channels (ties toward the lower stream index).
pub fn suggest_track(tracks: &[AudioTrack]) -> Option<u32> {
    if let Some(t) = tracks.iter().find(|t| {
        t.language.to_lowercase().starts_with("en")
            || t.title
                .as_deref()
                .map_or(false, |title| title.to_lowercase().contains("english"))
    }) {
        return Some(t.stream_index);
    }
    tracks
        .iter()
        .max_by_key(|t| (t.channels.unwrap_or(0), std::cmp::Reverse(t.stream_index)))
        .map(|t| t.stream_index)
}

fn human_bytes(n: u64) -> String {
    let mut v = n as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if v < 1024.0 {
            return format!("{v:.1}{unit}");
        }
        v /= 1024.0;
    }
    format!("{v:.1}PB")
}

/// Copy `src` byte-for-byte to a timestamped `.bak` path beside it,
/// preserving permissions and mtime, reporting chunked progress with a
/// throughput estimate.
fn backup_with_progress(src: &Path, progress: TagProgressFn) -> Result<PathBuf, TagError> {
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = src.with_file_name(format!("{name}.bak.{ts}"));

    let mut copy = || -> std::io::Result<()> {
        let meta = src.metadata()?;
        let total = meta.len();
        let mut reader = File::open(src)?;
        let mut writer = File::create(&backup)?;
        let mut buf = vec![0u8; BACKUP_CHUNK];
        let mut copied: u64 = 0;
        let start = Instant::now();
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            copied += n as u64;
            let elapsed = start.elapsed().as_secs_f64().max(0.001);
            let rate = human_bytes((copied as f64 / elapsed) as u64);
            progress(TagProgress {
                stage: "backup",
                fraction: if total > 0 { copied as f64 / total as f64 } else { 1.0 },
                detail: format!("{}/{} {rate}/s", human_bytes(copied), human_bytes(total)),
            });
        }
        writer.flush()?;
        fs::set_permissions(&backup, meta.permissions())?;
        if let Ok(mtime) = meta.modified() {
            let _ = filetime::set_file_mtime(&backup, filetime::FileTime::from_system_time(mtime));
        }
        Ok(())
    };

    if let Err(e) = copy() {
        // don't leave a partial backup around
        let _ = fs::remove_file(&backup);
        return Err(TagError::BackupFailed(e));
    }
    Ok(backup)
}

/// Restore one file from its tracked backup, if it has one. Failures are
/// logged, never raised: a failed restore means a corrupted recovery state
/// needing manual attention, and the original error still has to propagate.
fn restore_from_backup(tracker: &ChangeTracker, path: &Path) {
    let Some(backup) = tracker.backup_for(path) else {
        return;
    };
    if !backup.exists() {
        return;
    }
    match fs::rename(backup, path) {
        Ok(()) => info!(path = %path.display(), "restored from backup"),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "restore failed; backup left in place");
        }
    }
}

/// Tag one target file: validate the selection, back it up, delegate the
/// edit to the right external tool, and restore this file from its backup
/// before returning any apply-stage error.
///
/// `tracks` must be the fresh probe result for `path`; the backup is
/// registered with `tracker` before the edit so a caller-level rollback also
/// covers a mid-edit cancellation.
pub fn tag_file(
    path: &Path,
    tracks: &[AudioTrack],
    request: &TagRequest,
    tracker: &mut ChangeTracker,
    cancel: Option<&CancellationToken>,
    progress: TagProgressFn,
) -> Result<(), TagError> {
    if tracks.is_empty() {
        return Err(TagError::NoAudioTracks);
    }
    if !tracks.iter().any(|t| t.stream_index == request.stream_index) {
        return Err(TagError::SelectionInvalid {
            index: request.stream_index,
        });
    }
    let format = MediaFormat::from_path(path).ok_or_else(|| TagError::UnsupportedContainer {
        ext: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })?;

    // tool availability is checked before any disk activity
    let tool = match format {
        MediaFormat::Matroska => require_tool("mkvpropedit")?,
        MediaFormat::Mp4 => require_tool("ffmpeg")?,
    };

    if let Some(token) = cancel {
        token.check()?;
    }

    let backup = backup_with_progress(path, progress)?;
    tracker.record_backup(path, &backup);

    let applied = match format {
        MediaFormat::Matroska => apply_mkv(&tool, path, tracks, request),
        MediaFormat::Mp4 => apply_mp4(&tool, path, tracks, request, cancel, progress),
    };

    if let Err(e) = applied {
        restore_from_backup(tracker, path);
        return Err(e);
    }
    Ok(())
}

/// Matroska: one batched mkvpropedit invocation. The tool addresses audio
/// tracks as `a1`, `a2`, ... in audio-only order, so the stream index is
/// translated to that 1-based ordinal. The chosen track gets language, title
/// and default flag; every other audio track gets its default flag cleared.
fn apply_mkv(
    tool: &Path,
    path: &Path,
    tracks: &[AudioTrack],
    request: &TagRequest,
) -> Result<(), TagError> {
    let mut cmd = Command::new(tool);
    cmd.arg(path);
    for (pos, track) in tracks.iter().enumerate() {
        let ordinal = pos + 1;
        if track.stream_index == request.stream_index {
            cmd.args(["--edit", &format!("track:a{ordinal}")]);
            cmd.args(["--set", &format!("language={}", request.language)]);
            cmd.args(["--set", "flag-default=1"]);
            cmd.args(["--set", &format!("name={}", request.title)]);
        } else {
            cmd.args(["--edit", &format!("track:a{ordinal}")]);
            cmd.args(["--set", "flag-default=0"]);
        }
    }

    debug!(file = %path.display(), "running mkvpropedit");
    let output = cmd.output().map_err(|e| TagError::ToolExecutionFailed {
        tool: "mkvpropedit".to_string(),
        message: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(TagError::ToolExecutionFailed {
            tool: "mkvpropedit".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Parsed `-progress` key from ffmpeg's machine-readable output.
enum ProgressLine {
    /// Elapsed output time in microseconds.
    OutTimeUs(i64),
    /// `progress=end`: the remux reached end of stream.
    End,
    Other,
}

fn parse_progress_line(line: &str) -> ProgressLine {
    // out_time_ms is microseconds despite the name; newer builds also emit
    // out_time_us with the same value
    if let Some(v) = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))
    {
        return match v.trim().parse::<i64>() {
            Ok(us) => ProgressLine::OutTimeUs(us),
            Err(_) => ProgressLine::Other,
        };
    }
    if line.trim() == "progress=end" {
        return ProgressLine::End;
    }
    ProgressLine::Other
}

/// MP4/M4V: stream-copy remux into a temporary file with the chosen audio
/// stream's disposition/metadata overridden, then atomically replace the
/// original. Progress comes from the tool's elapsed output timestamps over
/// the probed source duration, clamped to [0, 1], and is forced to 1.0 on
/// the end-of-stream signal.
fn apply_mp4(
    tool: &Path,
    path: &Path,
    tracks: &[AudioTrack],
    request: &TagRequest,
    cancel: Option<&CancellationToken>,
    progress: TagProgressFn,
) -> Result<(), TagError> {
    // ffmpeg addresses audio streams 0-based within the audio-only list
    let a_pos = tracks
        .iter()
        .position(|t| t.stream_index == request.stream_index)
        .expect("selection validated by caller");

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_extension(format!("tmp.{ext}"));
    let duration_s = probe_duration_seconds(path);

    let mut cmd = Command::new(tool);
    cmd.args(["-y", "-nostats", "-loglevel", "error", "-progress", "pipe:1", "-i"])
        .arg(path)
        .args(["-map", "0", "-c", "copy"])
        .args(["-disposition:a", "0"])
        .args([&format!("-disposition:a:{a_pos}"), "default"])
        .args([
            &format!("-metadata:s:a:{a_pos}"),
            &format!("language={}", request.language),
        ])
        .args([
            &format!("-metadata:s:a:{a_pos}"),
            &format!("title={}", request.title),
        ])
        .args(["-movflags", "use_metadata_tags"])
        .arg(&tmp);

    debug!(file = %path.display(), "running ffmpeg remux");
    let result = run_remux(cmd, duration_s, cancel, progress);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).map_err(|e| TagError::ToolExecutionFailed {
        tool: "ffmpeg".to_string(),
        message: format!("replacing original with remux output: {e}"),
    })
}

/// Spawn the remux and consume its progress stream incrementally, updating
/// the reported fraction as lines arrive. This is the run's single
/// suspension point: waiting on subordinate process I/O and exit. No timeout
/// is imposed; responsiveness is the streamed progress itself.
fn run_remux(
    mut cmd: Command,
    duration_s: Option<f64>,
    cancel: Option<&CancellationToken>,
    progress: TagProgressFn,
) -> Result<(), TagError> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TagError::ToolExecutionFailed {
            tool: "ffmpeg".to_string(),
            message: format!("failed to spawn: {e}"),
        })?;

    // stderr is drained on its own thread; a decode-error-heavy source could
    // otherwise fill the pipe while this thread blocks on stdout
    let stderr_reader = child.stderr.take().map(|mut err| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = err.read_to_string(&mut buf);
            buf
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TagError::Cancelled(CancelledError));
                }
            }
            match parse_progress_line(&line) {
                ProgressLine::OutTimeUs(us) => {
                    if let Some(dur) = duration_s.filter(|d| *d > 0.0) {
                        let fraction = (us as f64 / (dur * 1_000_000.0)).clamp(0.0, 1.0);
                        progress(TagProgress {
                            stage: "remux",
                            fraction,
                            detail: String::new(),
                        });
                    }
                }
                ProgressLine::End => {
                    // the last timestamp can stop fractionally short
                    progress(TagProgress {
                        stage: "remux",
                        fraction: 1.0,
                        detail: String::new(),
                    });
                }
                ProgressLine::Other => {}
            }
        }
    }

    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let status = child.wait().map_err(|e| TagError::ToolExecutionFailed {
        tool: "ffmpeg".to_string(),
        message: e.to_string(),
    })?;
    if !status.success() {
        return Err(TagError::ToolExecutionFailed {
            tool: "ffmpeg".to_string(),
            message: format!("exit {status}: {}", stderr.trim()),
        });
    }
    Ok(())
}

/// Scoped rollback guard around a tagging run.
///
/// Dropping the run without calling [`TagRun::finish`] reverts every change
/// recorded so far; cancellation, a run-fatal error, or a panic all take
/// that path. `finish` is the all-success exit: it deletes the backups
/// (unless asked to keep them) and disarms the rollback.
#[derive(Debug)]
pub struct TagRun {
    tracker: ChangeTracker,
    keep_backups: bool,
    finished: bool,
}

impl TagRun {
    pub fn new(keep_backups: bool) -> Self {
        Self {
            tracker: ChangeTracker::new(),
            keep_backups,
            finished: false,
        }
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Complete the run successfully: clean up backups and disarm rollback.
    pub fn finish(mut self) {
        self.tracker.cleanup_backups(self.keep_backups);
        self.finished = true;
    }
}

impl Drop for TagRun {
    fn drop(&mut self) {
        if !self.finished && !self.tracker.is_empty() {
            self.tracker.revert_all();
        }
    }
}
