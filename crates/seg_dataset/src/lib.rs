//! Segmentation dataset pairing, verification, and batch generation.
//!
//! This crate provides utilities for:
//! - Scanning image/label/auxiliary directories and joining them by filename stem
//! - Verifying that paired rasters agree in size and that labels fit the class count
//! - Converting rasters into normalized feature tensors and one-hot label tensors
//! - Paired image/label augmentation
//! - An infinite, shuffled-once batch generator (labeled or label-free)

// Module declarations
pub mod aug;
pub mod codec;
pub mod generator;
pub mod pairing;
pub mod palette;
pub mod raster;
pub mod scan;
pub mod types;
pub mod verify;

#[cfg(feature = "burn-runtime")]
pub mod burn_batch;

// Re-export public API
pub use aug::{AugmentPolicy, Augmentation, Augmenter};
pub use codec::{denormalize, image_to_tensor, label_to_tensor, RasterInput, BGR_MEANS};
pub use generator::{
    Batch, BatchGenerator, BatchGeneratorBuilder, Cycle, GeneratorConfig, GeneratorMode,
    Preprocess, AUX_SCALE, DEFAULT_SEED,
};
pub use pairing::{match_pairs, LabelIndex, MatchOptions};
pub use palette::{class_color, colorize_label};
pub use raster::{decode, Raster};
pub use scan::{list_images, scan_dir, ScanOptions};
pub use types::*;
pub use verify::{
    log_report, verify_dataset, verify_segmentation_dataset, Finding, VerificationReport,
};

#[cfg(feature = "burn-runtime")]
pub use burn_batch::BurnSegBatch;
