use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use medialign_core::apply::apply_plan;
use medialign_core::planner::plan;
use medialign_core::probe::probe_audio_tracks;
use medialign_core::tag::{collect_targets, suggest_track, tag_file, TagProgress};
use medialign_core::{
    CancellationToken, MatchResult, RunMode, RunOutcome, TagError, TagRequest, TagRun,
    ThrottledProgress, Vocabulary,
};

#[derive(Parser)]
#[command(name = "medialign", version, about = "Reconcile subtitle sidecars and tag audio tracks in a media library")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score and classify every subtitle sidecar under a library root, as CSV
    Audit {
        /// Library root containing one directory per title
        root: PathBuf,

        /// Write the CSV report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move and rename sidecars to their canonical place next to the video
    Fix {
        /// Library root containing one directory per title
        root: PathBuf,

        /// Actually modify the filesystem (default is a dry run)
        #[arg(long)]
        apply: bool,

        /// Language code used when none can be read from the filename
        #[arg(long, default_value = "en")]
        default_lang: String,
    },

    /// Set the default audio track and its language/title tags
    Tag {
        /// A media file, or a directory to walk recursively
        path: PathBuf,

        /// Leave the .bak files in place after a successful run
        #[arg(long)]
        keep_backups: bool,

        /// Stream index of the track to make default (skips the prompt)
        #[arg(long)]
        track: Option<u32>,

        /// Language code to stamp on the chosen track, e.g. eng
        #[arg(long)]
        language: Option<String>,

        /// Track title to stamp on the chosen track
        #[arg(long)]
        title: Option<String>,

        /// Accept the suggested track and default language without prompting
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "medialign_core=info,medialign_cli=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Audit { root, output } => cmd_audit(&root, output.as_deref()),
        Command::Fix {
            root,
            apply,
            default_lang,
        } => cmd_fix(&root, apply, &default_lang),
        Command::Tag {
            path,
            keep_backups,
            track,
            language,
            title,
            yes,
        } => cmd_tag(TagArgs {
            path,
            keep_backups,
            track,
            language,
            title,
            yes,
        }),
    }
}

fn scan_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );
    pb
}

fn run_plan(root: &Path, vocab: &Vocabulary) -> anyhow::Result<Vec<MatchResult>> {
    let pb = scan_progress_bar();
    // the callback trait object needs an owning closure; ProgressBar is
    // Arc-backed, so a clone shares the same bar
    let bar = pb.clone();
    let cb = move |_stage: &str, current: u64, total: u64, message: &str| {
        bar.set_length(total);
        bar.set_position(current);
        bar.set_message(message.to_string());
    };
    let progress = ThrottledProgress::new(&cb);
    let results = plan(root, vocab, &progress);
    pb.finish_and_clear();
    results
}

fn cmd_audit(root: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let vocab = Vocabulary::default();
    let results = run_plan(root, &vocab)?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "sidecar_path",
        "primary_path",
        "sidecar_name",
        "primary_stem",
        "score",
        "suggested_path",
        "disposition",
    ])?;

    let mut by_disposition: BTreeMap<String, usize> = BTreeMap::new();
    for result in &results {
        let label = result.disposition_label();
        *by_disposition.entry(label.clone()).or_default() += 1;
        csv.write_record([
            result.sidecar.entry.path.display().to_string(),
            result
                .primary
                .as_ref()
                .map(|p| p.entry.path.display().to_string())
                .unwrap_or_default(),
            result.sidecar.entry.file_name(),
            result
                .primary
                .as_ref()
                .map(|p| p.entry.stem.clone())
                .unwrap_or_default(),
            format!("{:.3}", result.score),
            result
                .suggested_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            label,
        ])?;
    }
    csv.flush()?;

    eprintln!("{} sidecar(s) audited", results.len());
    for (label, count) in &by_disposition {
        eprintln!("  {label}: {count}");
    }
    Ok(())
}

fn cmd_fix(root: &Path, apply: bool, default_lang: &str) -> anyhow::Result<()> {
    let vocab = Vocabulary::default();
    let results = run_plan(root, &vocab)?;
    let outcome = apply_plan(&results, &vocab, default_lang, apply);

    eprintln!(
        "{} renamed, {} moved, {} skipped",
        outcome.changed, outcome.moved, outcome.skipped
    );
    if outcome.mode == RunMode::DryRun {
        eprintln!("dry run: pass --apply to modify the filesystem");
    }
    Ok(())
}

struct TagArgs {
    path: PathBuf,
    keep_backups: bool,
    track: Option<u32>,
    language: Option<String>,
    title: Option<String>,
    yes: bool,
}

fn cmd_tag(args: TagArgs) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, rolling back...");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let targets = collect_targets(&args.path);
    if targets.is_empty() {
        bail!("no taggable media files under {}", args.path.display());
    }
    eprintln!("{} file(s) to process", targets.len());

    let mut run = TagRun::new(args.keep_backups);
    let mut outcome = RunOutcome {
        mode: RunMode::Applied,
        ..RunOutcome::default()
    };
    let mut failed = 0usize;

    for target in &targets {
        // dropping `run` without finish() reverts everything recorded so far
        if let Err(cancelled) = cancel.check() {
            drop(run);
            outcome.mode = RunMode::RolledBack;
            print_tag_summary(&outcome, failed);
            return Err(cancelled.into());
        }

        eprintln!("\n{}", target.display());
        match tag_one(target, &args, &mut run, &cancel) {
            Ok(true) => outcome.changed += 1,
            Ok(false) => outcome.skipped += 1,
            Err(err) => {
                let run_fatal = err
                    .downcast_ref::<TagError>()
                    .map_or(true, |e| e.is_run_fatal());
                if run_fatal {
                    drop(run);
                    outcome.mode = RunMode::RolledBack;
                    print_tag_summary(&outcome, failed);
                    return Err(err);
                }
                warn!(file = %target.display(), error = %err, "failed, continuing with next file");
                failed += 1;
            }
        }
    }

    run.finish();
    print_tag_summary(&outcome, failed);
    Ok(())
}

fn print_tag_summary(outcome: &RunOutcome, failed: usize) {
    match outcome.mode {
        RunMode::RolledBack => eprintln!(
            "\n{} tagged before the run aborted; all changes rolled back",
            outcome.changed
        ),
        _ => eprintln!(
            "\n{} tagged, {} skipped, {failed} failed",
            outcome.changed, outcome.skipped
        ),
    }
}

/// Tag a single file. `Ok(false)` means the file was skipped without being
/// touched; engine errors bubble up for the caller to classify.
fn tag_one(
    target: &Path,
    args: &TagArgs,
    run: &mut TagRun,
    cancel: &CancellationToken,
) -> anyhow::Result<bool> {
    let tracks = probe_audio_tracks(target)?;
    if tracks.is_empty() {
        warn!(file = %target.display(), "no audio tracks, skipping");
        return Ok(false);
    }

    for track in &tracks {
        let channels = track
            .channels
            .map(|c| format!("{c}ch"))
            .unwrap_or_else(|| "?ch".to_string());
        eprintln!(
            "  [{}] {} {} lang={} {}",
            track.stream_index,
            track.codec,
            channels,
            track.language,
            track.title.as_deref().unwrap_or("")
        );
    }

    let stream_index = match args.track {
        Some(index) => index,
        None => {
            let suggested = suggest_track(&tracks);
            if args.yes {
                suggested.context("no track suggestion available")?
            } else {
                prompt_track(suggested)?
            }
        }
    };

    let (language, title) = resolve_language(args)?;
    let request = TagRequest {
        stream_index,
        language,
        title,
    };

    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {percent}% {msg}")
            .unwrap(),
    );
    let mut report = |p: TagProgress| {
        pb.set_position((p.fraction * 1000.0) as u64);
        pb.set_message(format!("{} {}", p.stage, p.detail));
    };
    let result = tag_file(
        target,
        &tracks,
        &request,
        run.tracker_mut(),
        Some(cancel),
        &mut report,
    );
    pb.finish_and_clear();
    result?;

    eprintln!(
        "  default -> stream {} ({} / {})",
        request.stream_index, request.language, request.title
    );
    Ok(true)
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading selection")?;
    Ok(line.trim().to_string())
}

fn prompt_track(suggested: Option<u32>) -> anyhow::Result<u32> {
    loop {
        let hint = suggested
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        let answer = prompt_line(&format!("  stream index to make default{hint}: "))?;
        if answer.is_empty() {
            if let Some(s) = suggested {
                return Ok(s);
            }
            continue;
        }
        match answer.parse::<u32>() {
            Ok(index) => return Ok(index),
            Err(_) => eprintln!("  not a stream index: {answer}"),
        }
    }
}

fn title_for(code: &str) -> String {
    match code {
        "eng" | "en" => "English".to_string(),
        "spa" | "es" => "Spanish".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

fn resolve_language(args: &TagArgs) -> anyhow::Result<(String, String)> {
    if let Some(lang) = &args.language {
        let title = args.title.clone().unwrap_or_else(|| title_for(lang));
        return Ok((lang.clone(), title));
    }
    if args.yes {
        return Ok(("eng".to_string(), "English".to_string()));
    }
    loop {
        let answer = prompt_line("  language: 1) English  2) Spanish  3) other [1]: ")?;
        match answer.as_str() {
            "" | "1" => return Ok(("eng".to_string(), "English".to_string())),
            "2" => return Ok(("spa".to_string(), "Spanish".to_string())),
            "3" => {
                let code = prompt_line("  language code (e.g. jpn): ")?;
                if code.is_empty() {
                    continue;
                }
                let default_title = title_for(&code);
                let title = prompt_line(&format!("  track title [{default_title}]: "))?;
                let title = if title.is_empty() { default_title } else { title };
                return Ok((code, title));
            }
            other => eprintln!("  unknown choice: {other}"),
        }
    }
}
