//! Directory listing filtered by file extension.

use crate::types::{DatasetResult, ScannedFile, SegDatasetError, IMAGE_EXTENSIONS};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Drop entries whose file name starts with `.`.
    pub skip_hidden: bool,
}

/// List the regular files directly inside `dir` whose extension is in `extensions`.
///
/// Extensions are matched case-sensitively against the literal suffix (including
/// the dot). Subdirectories are not descended into. Entries keep the order the
/// filesystem returns them in. Names that are not valid UTF-8 are skipped.
pub fn scan_dir(
    dir: &Path,
    extensions: &[&str],
    opts: ScanOptions,
) -> DatasetResult<Vec<ScannedFile>> {
    let entries = fs::read_dir(dir).map_err(|e| SegDatasetError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SegDatasetError::io(dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if opts.skip_hidden && name.starts_with('.') {
            continue;
        }
        let Some((stem, extension)) = split_extension(name) else {
            continue;
        };
        if !extensions.contains(&extension) || !path.is_file() {
            continue;
        }
        files.push(ScannedFile {
            stem: stem.to_string(),
            extension: extension.to_string(),
            full_path: path,
        });
    }
    tracing::debug!(dir = %dir.display(), count = files.len(), "scanned directory");
    Ok(files)
}

/// Image paths in `dir` for label-free generation. Hidden files are not excluded.
pub fn list_images(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    Ok(scan_dir(dir, IMAGE_EXTENSIONS, ScanOptions::default())?
        .into_iter()
        .map(|f| f.full_path)
        .collect())
}

/// Split `name` into stem and `.ext`. Leading dots belong to the stem, so
/// `.hidden` has no extension while `.hidden.png` has stem `.hidden`.
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let body_start = name.len() - name.trim_start_matches('.').len();
    let idx = name[body_start..].rfind('.')? + body_start;
    Some((&name[..idx], &name[idx..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FLOW_EXTENSIONS;

    #[test]
    fn split_follows_last_dot() {
        assert_eq!(split_extension("a.png"), Some(("a", ".png")));
        assert_eq!(split_extension("a.tar.png"), Some(("a.tar", ".png")));
        assert_eq!(split_extension(".hidden.png"), Some((".hidden", ".png")));
        assert_eq!(split_extension(".png"), None);
        assert_eq!(split_extension("README"), None);
    }

    #[test]
    fn scan_filters_extension_case_sensitively() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        for name in ["a.png", "b.PNG", "c.txt", ".d.png"] {
            fs::write(tmp.path().join(name), b"x")?;
        }
        fs::create_dir(tmp.path().join("sub.png"))?;

        let mut all: Vec<_> = scan_dir(tmp.path(), &[".png"], ScanOptions::default())
            .unwrap()
            .into_iter()
            .map(|f| f.stem)
            .collect();
        all.sort();
        assert_eq!(all, vec![".d".to_string(), "a".to_string()]);

        let visible = scan_dir(tmp.path(), &[".png"], ScanOptions { skip_hidden: true }).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].extension, ".png");
        assert_eq!(visible[0].full_path, tmp.path().join("a.png"));
        Ok(())
    }

    #[test]
    fn flow_extensions_skip_bitmaps() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        for name in ["a.jpg", "b.jpeg", "c.png", "d.bmp"] {
            fs::write(tmp.path().join(name), b"x")?;
        }
        let mut stems: Vec<_> = scan_dir(tmp.path(), FLOW_EXTENSIONS, ScanOptions::default())
            .unwrap()
            .into_iter()
            .map(|f| f.stem)
            .collect();
        stems.sort();
        assert_eq!(stems, vec!["a", "b", "c"]);
        assert!(FLOW_EXTENSIONS.iter().all(|e| IMAGE_EXTENSIONS.contains(e)));
        Ok(())
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = scan_dir(
            Path::new("/definitely/not/here"),
            IMAGE_EXTENSIONS,
            ScanOptions::default(),
        )
        .unwrap_err();
        match err {
            SegDatasetError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
