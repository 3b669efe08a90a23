//! On-disk corpus layout
//!
//! ```text
//! <root>/<category>/long/<category>_<id>_long.<ext>
//! <root>/<category>/short/<category>_<id>_short.<ext>
//! ```
//!
//! Both names are pure functions of category and remote id, which is what makes
//! re-runs idempotent: an existing file at the derived path means the work is done.

use crate::error::{CorpusError, Result};
use std::path::{Path, PathBuf};

pub const LONG_DIR: &str = "long";
pub const SHORT_DIR: &str = "short";

const LONG_SUFFIX: &str = "_long";
const SHORT_SUFFIX: &str = "_short";
const PARTIAL_EXTENSION: &str = "part";

/// Directory layout rooted at the data folder
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl CorpusLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    pub fn long_dir(&self, category: &str) -> PathBuf {
        self.category_dir(category).join(LONG_DIR)
    }

    pub fn short_dir(&self, category: &str) -> PathBuf {
        self.category_dir(category).join(SHORT_DIR)
    }

    /// Create `long/` and `short/` for `category` if they are missing
    pub fn ensure(&self, category: &str) -> Result<()> {
        for dir in [self.long_dir(category), self.short_dir(category)] {
            std::fs::create_dir_all(&dir).map_err(|e| CorpusError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Path of the downloaded recording `remote_id` in `category`
    pub fn long_path(&self, category: &str, remote_id: &str, extension: &str) -> PathBuf {
        let file_name = format!(
            "{category}_{}{LONG_SUFFIX}.{extension}",
            sanitize_id(remote_id)
        );
        self.long_dir(category).join(file_name)
    }

    /// Completed long recordings of `category`, sorted by file name.
    ///
    /// In-flight `.part` files and subdirectories are not listed.
    pub fn list_long_files(&self, category: &str) -> Result<Vec<PathBuf>> {
        let dir = self.long_dir(category);
        let entries = std::fs::read_dir(&dir).map_err(|e| CorpusError::io(&dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && !is_partial(path))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Short-recording path derived from a long recording's path.
///
/// `<cat>/long/<cat>_<id>_long.mp3` maps to `<cat>/short/<cat>_<id>_short.<extension>`.
/// Only the file-name suffix is rewritten, so a category whose name contains
/// "long" still maps correctly.
pub fn short_path_for(long_path: &Path, extension: &str) -> PathBuf {
    let stem = long_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = stem.strip_suffix(LONG_SUFFIX).unwrap_or(&stem);
    let file_name = format!("{base}{SHORT_SUFFIX}.{extension}");

    let category_dir = long_path
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    category_dir.join(SHORT_DIR).join(file_name)
}

/// `<path>.part`, the temporary name a file is written under before it is renamed
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    path.with_file_name(name)
}

fn is_partial(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_EXTENSION)
}

/// Keep remote ids from escaping the target directory
fn sanitize_id(remote_id: &str) -> String {
    remote_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_and_short_paths() {
        let layout = CorpusLayout::new("data");
        let long = layout.long_path("great_tit", "123456", "mp3");

        assert_eq!(long, PathBuf::from("data/great_tit/long/great_tit_123456_long.mp3"));
        assert_eq!(
            short_path_for(&long, "wav"),
            PathBuf::from("data/great_tit/short/great_tit_123456_short.wav")
        );
    }

    #[test]
    fn test_category_containing_long_maps_correctly() {
        let layout = CorpusLayout::new("data");
        let long = layout.long_path("long_tailed_tit", "7", "mp3");

        assert_eq!(
            short_path_for(&long, "wav"),
            PathBuf::from("data/long_tailed_tit/short/long_tailed_tit_7_short.wav")
        );
    }

    #[test]
    fn test_unconventional_name_still_gets_short_suffix() {
        let short = short_path_for(Path::new("data/wren/long/field.mp3"), "wav");
        assert_eq!(short, PathBuf::from("data/wren/short/field_short.wav"));
    }

    #[test]
    fn test_remote_id_is_sanitized() {
        let layout = CorpusLayout::new("data");
        let long = layout.long_path("wren", "../../etc", "mp3");
        assert_eq!(long, PathBuf::from("data/wren/long/wren_______etc_long.mp3"));
    }

    #[test]
    fn test_ensure_and_list_skip_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CorpusLayout::new(dir.path());
        layout.ensure("wren").unwrap();
        layout.ensure("wren").unwrap();

        assert!(layout.short_dir("wren").is_dir());

        let done = layout.long_path("wren", "2", "mp3");
        let earlier = layout.long_path("wren", "1", "mp3");
        std::fs::write(&done, b"x").unwrap();
        std::fs::write(&earlier, b"x").unwrap();
        std::fs::write(partial_path(&layout.long_path("wren", "3", "mp3")), b"x").unwrap();

        assert_eq!(layout.list_long_files("wren").unwrap(), vec![earlier, done]);
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("data/a/long/a_1_long.mp3")),
            PathBuf::from("data/a/long/a_1_long.mp3.part")
        );
    }
}
