//! Join images, labels, and auxiliary inputs by filename stem.

use crate::scan::{scan_dir, ScanOptions};
use crate::types::{
    Dataset, DatasetResult, MatchedSample, ScannedFile, SegDatasetError, IMAGE_EXTENSIONS,
    LABEL_EXTENSIONS,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Drop images with no label instead of failing.
    pub ignore_non_matching: bool,
    /// Skip dot-files in every scanned directory.
    pub skip_hidden: bool,
    /// Extension set used for the labels directory.
    pub label_extensions: &'static [&'static str],
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            ignore_non_matching: false,
            skip_hidden: true,
            label_extensions: LABEL_EXTENSIONS,
        }
    }
}

impl MatchOptions {
    /// Trio-style matching: hidden files are kept and labels are scanned with the
    /// image extension set.
    pub fn legacy() -> Self {
        Self {
            ignore_non_matching: false,
            skip_hidden: false,
            label_extensions: IMAGE_EXTENSIONS,
        }
    }

    pub fn ignore_non_matching(mut self, ignore: bool) -> Self {
        self.ignore_non_matching = ignore;
        self
    }
}

/// Label files keyed by stem. Each stem appears at most once.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    entries: HashMap<String, (String, PathBuf)>,
}

impl LabelIndex {
    /// Build the index, failing on the second file that reuses a stem.
    pub fn from_scanned(files: Vec<ScannedFile>) -> DatasetResult<Self> {
        let mut entries = HashMap::with_capacity(files.len());
        for file in files {
            if entries.contains_key(&file.stem) {
                return Err(SegDatasetError::AmbiguousLabel {
                    stem: file.stem,
                    path: file.full_path,
                });
            }
            entries.insert(file.stem, (file.extension, file.full_path));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, stem: &str) -> Option<&Path> {
        self.entries.get(stem).map(|(_, path)| path.as_path())
    }

    pub fn extension(&self, stem: &str) -> Option<&str> {
        self.entries.get(stem).map(|(ext, _)| ext.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Match every image in `images_dir` with its label in `labels_dir` and, when
/// `aux_dirs` is non-empty, with one file per auxiliary directory.
///
/// Output follows the image directory's enumeration order. A missing label is an
/// error unless `ignore_non_matching` is set; a missing auxiliary file is an error
/// regardless. Duplicate label stems always fail before any image is matched.
pub fn match_pairs(
    images_dir: &Path,
    labels_dir: &Path,
    aux_dirs: &[PathBuf],
    opts: MatchOptions,
) -> DatasetResult<Dataset> {
    let scan_opts = ScanOptions {
        skip_hidden: opts.skip_hidden,
    };
    let images = scan_dir(images_dir, IMAGE_EXTENSIONS, scan_opts)?;
    let aux_files = aux_dirs
        .iter()
        .map(|dir| scan_dir(dir, IMAGE_EXTENSIONS, scan_opts))
        .collect::<DatasetResult<Vec<_>>>()?;
    let labels = LabelIndex::from_scanned(scan_dir(labels_dir, opts.label_extensions, scan_opts)?)?;

    let mut dataset = Vec::with_capacity(images.len());
    let mut skipped = 0usize;
    for image in images {
        let Some(label_path) = labels.get(&image.stem) else {
            if opts.ignore_non_matching {
                skipped += 1;
                continue;
            }
            return Err(SegDatasetError::MissingPair {
                image: image.full_path,
            });
        };
        let mut aux_paths = Vec::with_capacity(aux_files.len());
        for (dir, files) in aux_dirs.iter().zip(&aux_files) {
            // Linear scan, first match wins.
            let Some(found) = files.iter().find(|f| f.stem == image.stem) else {
                return Err(SegDatasetError::MissingAuxiliary {
                    stem: image.stem,
                    dir: dir.clone(),
                });
            };
            aux_paths.push(found.full_path.clone());
        }
        dataset.push(MatchedSample {
            image_path: image.full_path,
            label_path: label_path.to_path_buf(),
            aux_paths,
        });
    }
    tracing::debug!(
        images_dir = %images_dir.display(),
        labels_dir = %labels_dir.display(),
        matched = dataset.len(),
        skipped,
        "matched dataset"
    );
    Ok(dataset)
}
