use std::path::Path;

use anyhow::Context;

use crate::library::{find_primaries, find_sidecars, list_containers, Container};
use crate::matcher::{best_match, classify, Disposition, MatchResult, NO_CANDIDATE_SCORE};
use crate::score::Scorer;
use crate::vocab::Vocabulary;
use crate::ThrottledProgress;

/// Walk a library root and emit one disposition record per sidecar.
///
/// Containers are visited in directory sort order, sidecars in traversal
/// order within each container; containers with no sidecars are skipped.
/// This performs no filesystem mutation. Planning errors (unreadable root or
/// container) are fatal; there is no partial plan.
pub fn plan(
    root: &Path,
    vocab: &Vocabulary,
    progress: &ThrottledProgress,
) -> anyhow::Result<Vec<MatchResult>> {
    let scorer = Scorer::new(vocab);
    let containers =
        list_containers(root).with_context(|| format!("reading library root {}", root.display()))?;

    let mut results = Vec::new();
    let total = containers.len() as u64;
    for (i, dir) in containers.iter().enumerate() {
        progress.report("plan", i as u64, total, &dir.display().to_string());

        let container = Container {
            primaries: find_primaries(dir, vocab)
                .with_context(|| format!("reading container {}", dir.display()))?,
            sidecars: find_sidecars(dir, vocab),
            dir: dir.clone(),
        };
        if container.sidecars.is_empty() {
            continue;
        }
        for sidecar in container.sidecars {
            results.push(match_one(&scorer, sidecar, &container.primaries));
        }
    }
    Ok(results)
}

fn match_one(
    scorer: &Scorer,
    sidecar: crate::library::SidecarFile,
    primaries: &[crate::library::PrimaryFile],
) -> MatchResult {
    let (best, score) = best_match(scorer, &sidecar, primaries);
    match best {
        None => MatchResult {
            sidecar,
            primary: None,
            score: NO_CANDIDATE_SCORE,
            disposition: Disposition::NoPrimaryInContainer,
            low_confidence: false,
            suggested_path: None,
        },
        Some(primary) => {
            let (disposition, low_confidence) = classify(scorer, &sidecar, primary, score);
            let suggested = primary
                .entry
                .dir()
                .join(format!("{}.{}", primary.entry.stem, sidecar.entry.ext));
            MatchResult {
                sidecar,
                primary: Some(primary.clone()),
                score,
                disposition,
                low_confidence,
                suggested_path: Some(suggested),
            }
        }
    }
}
