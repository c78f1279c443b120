//! Dataset integrity checks: pairing, raster dimension agreement, and label range.

use crate::pairing::{match_pairs, MatchOptions};
use crate::raster::decode;
use crate::types::{DatasetResult, ReadMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Matching succeeded but produced no pairs.
    NoData {
        images_dir: PathBuf,
        labels_dir: PathBuf,
    },
    /// Matching failed with an ambiguous or missing label.
    LoaderError { message: String },
    DimensionMismatch {
        image: PathBuf,
        label: PathBuf,
        /// `[height, width, channels]`
        image_shape: [usize; 3],
        label_shape: [usize; 3],
    },
    LabelOutOfRange {
        label: PathBuf,
        max_value: u8,
        n_classes: usize,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::NoData {
                images_dir,
                labels_dir,
            } => write!(
                f,
                "Couldn't load any data from images_path: {} and segmentations path: {}",
                images_dir.display(),
                labels_dir.display()
            ),
            Finding::LoaderError { message } => {
                write!(f, "Found error during data loading: {message}")
            }
            Finding::DimensionMismatch {
                image,
                label,
                image_shape,
                label_shape,
            } => write!(
                f,
                "The size of image {} {:?} and its segmentation {} {:?} doesn't match (possibly the files are corrupt).",
                image.display(),
                image_shape,
                label.display(),
                label_shape
            ),
            Finding::LabelOutOfRange {
                label,
                max_value,
                n_classes,
            } => write!(
                f,
                "The pixel values of the segmentation image {} violating range [0, {}]. Found maximum pixel value {}",
                label.display(),
                n_classes.saturating_sub(1),
                max_value
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Pairs whose rasters were decoded and inspected.
    pub checked: usize,
    /// Pairs produced by matching.
    pub total: usize,
    pub findings: Vec<Finding>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Check that every image in `images_dir` pairs with a label in `labels_dir`, that
/// each pair decodes to the same `[height, width, channels]`, and that no label's
/// first channel reaches `n_classes`.
///
/// Ambiguous and missing labels become a [`Finding::LoaderError`]; every other
/// error (unreadable directory, undecodable file) is returned. Without
/// `show_all_errors` the scan stops at the first finding.
pub fn verify_dataset(
    images_dir: &Path,
    labels_dir: &Path,
    n_classes: usize,
    show_all_errors: bool,
) -> DatasetResult<VerificationReport> {
    let mut report = VerificationReport::default();
    let pairs = match match_pairs(images_dir, labels_dir, &[], MatchOptions::default()) {
        Ok(pairs) => pairs,
        Err(e) if e.is_loader_error() => {
            report.findings.push(Finding::LoaderError {
                message: e.to_string(),
            });
            return Ok(report);
        }
        Err(e) => return Err(e),
    };
    report.total = pairs.len();
    if pairs.is_empty() {
        report.findings.push(Finding::NoData {
            images_dir: images_dir.to_path_buf(),
            labels_dir: labels_dir.to_path_buf(),
        });
        return Ok(report);
    }

    for pair in &pairs {
        let img = decode(&pair.image_path, ReadMode::Color)?;
        let seg = decode(&pair.label_path, ReadMode::Color)?;
        report.checked += 1;
        tracing::debug!(
            checked = report.checked,
            total = report.total,
            image = %pair.image_path.display(),
            "verifying pair"
        );
        let finding = if img.shape() != seg.shape() {
            let (ih, iw, ic) = img.shape();
            let (lh, lw, lc) = seg.shape();
            Some(Finding::DimensionMismatch {
                image: pair.image_path.clone(),
                label: pair.label_path.clone(),
                image_shape: [ih, iw, ic],
                label_shape: [lh, lw, lc],
            })
        } else {
            seg.max_in_channel(0)
                .filter(|max| *max as usize >= n_classes)
                .map(|max_value| Finding::LabelOutOfRange {
                    label: pair.label_path.clone(),
                    max_value,
                    n_classes,
                })
        };
        if let Some(finding) = finding {
            report.findings.push(finding);
            if !show_all_errors {
                break;
            }
        }
    }
    Ok(report)
}

/// [`verify_dataset`] reduced to a pass/fail flag, logging each finding.
pub fn verify_segmentation_dataset(
    images_dir: &Path,
    labels_dir: &Path,
    n_classes: usize,
    show_all_errors: bool,
) -> DatasetResult<bool> {
    let report = verify_dataset(images_dir, labels_dir, n_classes, show_all_errors)?;
    log_report(&report);
    Ok(report.passed())
}

/// Emit each finding as a warning, then the overall verdict.
pub fn log_report(report: &VerificationReport) {
    for finding in &report.findings {
        tracing::warn!("{finding}");
    }
    if report.passed() {
        tracing::info!(pairs = report.checked, "Dataset verified!");
    } else {
        tracing::warn!(
            checked = report.checked,
            total = report.total,
            findings = report.findings.len(),
            "Dataset not verified!"
        );
    }
}
