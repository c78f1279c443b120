//! Command implementations behind the `verify_dataset` and `preview_batches` binaries.

use anyhow::{Context, Result};
use clap::Parser;
use cli_support::{
    init_tracing, AugmentArg, DatasetDirsArgs, ImageSizeArgs, NormalizationArg, ReadModeArg,
};
use seg_dataset::{
    colorize_label, log_report, verify_dataset, Batch, BatchGenerator, BatchGeneratorBuilder,
    GeneratorConfig, Raster, VerificationReport,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "verify_dataset",
    about = "Check image/label pairing, sizes, and label value range"
)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub dirs: DatasetDirsArgs,
    /// Number of classes; label values must lie in [0, n_classes).
    #[arg(long)]
    pub n_classes: usize,
    /// Report every failing pair instead of stopping at the first.
    #[arg(long, default_value_t = false)]
    pub show_all_errors: bool,
    /// Print the report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Run the verifier. The returned report tells the caller whether to fail.
pub fn run_verify(args: VerifyArgs) -> Result<VerificationReport> {
    init_tracing();
    let report = verify_dataset(
        &args.dirs.images,
        &args.dirs.labels,
        args.n_classes,
        args.show_all_errors,
    )
    .with_context(|| format!("verifying {}", args.dirs.images.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log_report(&report);
    }
    Ok(report)
}

#[derive(Parser, Debug)]
#[command(
    name = "preview_batches",
    about = "Draw batches from a segmentation dataset and report their shapes"
)]
pub struct PreviewArgs {
    /// JSON generator config; when set, the dataset flags below are ignored.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory of input images.
    #[arg(long, required_unless_present = "config")]
    pub images: Option<PathBuf>,
    /// Labels directory; omit for label-free batches.
    #[arg(long)]
    pub labels: Option<PathBuf>,
    /// Auxiliary input directory (repeatable).
    #[arg(long = "aux")]
    pub aux_dirs: Vec<PathBuf>,
    #[arg(long, default_value_t = 2)]
    pub n_classes: usize,
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
    #[command(flatten)]
    pub size: ImageSizeArgs,
    #[arg(long, value_enum, default_value_t = NormalizationArg::SubMean)]
    pub norm: NormalizationArg,
    #[arg(long, value_enum, default_value_t = ReadModeArg::Color)]
    pub read_mode: ReadModeArg,
    #[arg(long, value_enum)]
    pub augment: Option<AugmentArg>,
    #[arg(long, default_value_t = seg_dataset::DEFAULT_SEED)]
    pub seed: u64,
    /// Drop images without a label instead of failing.
    #[arg(long, default_value_t = false)]
    pub ignore_non_matching: bool,
    /// Number of batches to draw.
    #[arg(long, default_value_t = 1)]
    pub batches: usize,
    /// Write colourised label planes of each drawn batch here.
    #[arg(long)]
    pub dump_dir: Option<PathBuf>,
}

impl PreviewArgs {
    pub fn builder(&self) -> Result<BatchGeneratorBuilder> {
        if let Some(path) = &self.config {
            let cfg = GeneratorConfig::from_json_path(path)?.with_env_overrides();
            return Ok(cfg.into_builder()?);
        }
        let images = self
            .images
            .clone()
            .context("--images is required without --config")?;
        let mut builder = BatchGenerator::builder(images)
            .n_classes(self.n_classes)
            .batch_size(self.batch_size)
            .input_size(self.size.input_width, self.size.input_height)
            .output_size(self.size.output_width, self.size.output_height)
            .normalization(self.norm.into())
            .read_mode(self.read_mode.into())
            .seed(self.seed)
            .ignore_non_matching(self.ignore_non_matching);
        if let Some(labels) = &self.labels {
            builder = builder.labels_dir(labels);
        }
        for dir in &self.aux_dirs {
            builder = builder.aux_dir(dir);
        }
        if let Some(policy) = self.augment {
            builder = builder.builtin_augmentation(policy.into());
        }
        Ok(builder)
    }
}

/// Summary of one drawn batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub image_shape: Vec<usize>,
    pub label_shape: Option<Vec<usize>>,
    pub cursor: usize,
}

pub fn run_preview(args: PreviewArgs) -> Result<Vec<BatchSummary>> {
    init_tracing();
    let mut generator = args.builder()?.build()?;
    if let Some(dir) = &args.dump_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut summaries = Vec::with_capacity(args.batches);
    for index in 0..args.batches {
        let batch = generator.next_batch()?;
        let summary = BatchSummary {
            image_shape: batch.images.shape().to_vec(),
            label_shape: batch.labels.as_ref().map(|l| l.shape().to_vec()),
            cursor: generator.cursor_position(),
        };
        tracing::info!(
            batch = index,
            images = ?summary.image_shape,
            labels = ?summary.label_shape,
            cursor = summary.cursor,
            dataset = generator.dataset_len(),
            "drew batch"
        );
        if let Some(dir) = &args.dump_dir {
            dump_labels(&batch, index, dir)?;
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Save each sample's one-hot labels as a colourised PNG.
fn dump_labels(batch: &Batch, index: usize, dir: &Path) -> Result<()> {
    let Some(labels) = &batch.labels else {
        return Ok(());
    };
    for (sample, plane) in class_planes(labels.shape(), labels.data())?
        .into_iter()
        .enumerate()
    {
        let path = dir.join(format!("batch{index:04}_{sample:02}_label.png"));
        colorize_label(&plane)?
            .to_dynamic()?
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Collapse `[batch, h, w, n_classes]` one-hot data into one class-index raster per sample.
/// Pixels with no active class map to 0.
pub fn class_planes(shape: &[usize], data: &[f32]) -> Result<Vec<Raster>> {
    let &[batch, h, w, n] = shape else {
        anyhow::bail!("expected a 4-d label tensor, got shape {shape:?}");
    };
    if n == 0 {
        anyhow::bail!("label tensor has no classes");
    }
    let per_sample = h * w * n;
    let mut planes = Vec::with_capacity(batch);
    for sample in data.chunks_exact(per_sample).take(batch) {
        let classes = sample
            .chunks_exact(n)
            .map(|px| {
                px.iter()
                    .position(|v| *v > 0.5)
                    .map_or(0, |c| c.min(u8::MAX as usize) as u8)
            })
            .collect();
        planes.push(Raster::new(w as u32, h as u32, 1, classes)?);
    }
    Ok(planes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_planes_takes_active_index() {
        // Two pixels, three classes: class 2 then no class.
        let data = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let planes = class_planes(&[1, 1, 2, 3], &data).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].data(), &[2, 0]);
        assert!(class_planes(&[2, 3], &data).is_err());
    }
}
