use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::vocab::Vocabulary;

/// How deep below a container directory sidecars are searched
/// (`Subs/`, `Subs/eng/`, ...). Primaries are never searched recursively.
const SIDECAR_MAX_DEPTH: usize = 2;

/// An absolute path with its parsed stem and extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: PathBuf,
    /// Filename without the extension.
    pub stem: String,
    /// Extension without the dot, lower-cased. Empty if none.
    pub ext: String,
}

impl PathEntry {
    pub fn new(path: PathBuf) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self { path, stem, ext }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// A main media file, owned by the container directory it sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryFile {
    pub entry: PathEntry,
}

/// An auxiliary file (subtitle) discovered within a container directory or a
/// bounded-depth subtree beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarFile {
    pub entry: PathEntry,
    /// The container (per-title) directory this sidecar was discovered under,
    /// regardless of its own subdirectory depth.
    pub container: PathBuf,
}

/// One per-title directory with its grouped primaries and sidecars.
#[derive(Debug, Clone)]
pub struct Container {
    pub dir: PathBuf,
    pub primaries: Vec<PrimaryFile>,
    pub sidecars: Vec<SidecarFile>,
}

/// Enumerate primary files: direct children of the container only.
pub fn find_primaries(dir: &Path, vocab: &Vocabulary) -> std::io::Result<Vec<PrimaryFile>> {
    let mut out = Vec::new();
    let mut names: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    names.sort();
    for path in names {
        let entry = PathEntry::new(path);
        if vocab.is_primary_ext(&entry.ext) {
            out.push(PrimaryFile { entry });
        }
    }
    Ok(out)
}

/// Enumerate sidecar files within `dir` and up to two directory levels below
/// it, in traversal order.
pub fn find_sidecars(dir: &Path, vocab: &Vocabulary) -> Vec<SidecarFile> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .max_depth(SIDECAR_MAX_DEPTH + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let pe = PathEntry::new(entry.path().to_path_buf());
        if vocab.is_sidecar_ext(&pe.ext) {
            out.push(SidecarFile {
                entry: pe,
                container: dir.to_path_buf(),
            });
        }
    }
    out
}

/// Enumerate the container directories under a library root, sorted by name.
pub fn list_containers(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    #[test]
    fn test_path_entry_parsing() {
        let e = PathEntry::new(PathBuf::from("/lib/Movie (2020)/Movie.Title.MKV"));
        assert_eq!(e.stem, "Movie.Title");
        assert_eq!(e.ext, "mkv");
        assert_eq!(e.dir(), Path::new("/lib/Movie (2020)"));
    }

    #[test]
    fn test_primaries_are_direct_children_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie.mkv"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested/Other.mkv"));

        let vocab = Vocabulary::default();
        let primaries = find_primaries(root, &vocab).unwrap();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].entry.stem, "Movie");
    }

    #[test]
    fn test_sidecar_depth_bound() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Movie.en.srt"));
        touch(&root.join("Subs/Movie.es.srt"));
        touch(&root.join("Subs/eng/Movie.srt"));
        touch(&root.join("a/b/c/TooDeep.srt"));

        let vocab = Vocabulary::default();
        let sidecars = find_sidecars(root, &vocab);
        let names: Vec<String> = sidecars.iter().map(|s| s.entry.file_name()).collect();
        assert_eq!(sidecars.len(), 3, "{names:?}");
        assert!(sidecars.iter().all(|s| s.container == root));
    }
}
