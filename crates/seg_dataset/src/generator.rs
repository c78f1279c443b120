//! Infinite batch generation over a shuffled-once, cycled dataset.

use crate::aug::{AugmentPolicy, Augmentation, Augmenter};
use crate::codec::{image_to_tensor, label_to_tensor};
use crate::pairing::{match_pairs, MatchOptions};
use crate::raster::{decode, Raster};
use crate::scan::list_images;
use crate::types::{
    ChannelOrder, DatasetResult, FeatureTensor, Interpolation, LabelTensor, MatchedSample,
    Normalization, ReadMode, SegDatasetError, Tensor,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seed used when none is configured, so matching order is reproducible.
pub const DEFAULT_SEED: u64 = 0;
pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;
/// Downscale applied to the auxiliary raster before it is stacked onto the image.
/// Odd dimensions round half to even, so a 5-wide input stacks onto a 2-wide image.
pub const AUX_SCALE: f64 = 0.5;

/// Hook run on each decoded image after augmentation and before normalization.
pub type Preprocess = Arc<dyn Fn(Raster) -> DatasetResult<Raster> + Send + Sync>;

/// Serializable generator settings. Hooks that cannot be serialized (custom
/// augmenters, preprocessing) are added through [`BatchGeneratorBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub images_dir: PathBuf,
    /// Labels directory; `None` selects label-free generation.
    pub labels_dir: Option<PathBuf>,
    /// Auxiliary directories, matched by stem. Only the first is stacked onto the image.
    pub aux_dirs: Vec<PathBuf>,
    pub batch_size: usize,
    pub n_classes: usize,
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub normalization: Normalization,
    pub read_mode: ReadMode,
    pub seed: u64,
    pub ignore_non_matching: bool,
    /// Built-in augmentation policy name, e.g. `aug_all`.
    pub augmentation: Option<String>,
    /// Progress log interval in samples; `None` disables progress logging.
    pub log_every_samples: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::new(),
            labels_dir: None,
            aux_dirs: Vec::new(),
            batch_size: 8,
            n_classes: 2,
            input_width: 224,
            input_height: 224,
            output_width: 224,
            output_height: 224,
            normalization: Normalization::SubMean,
            read_mode: ReadMode::Color,
            seed: DEFAULT_SEED,
            ignore_non_matching: false,
            augmentation: None,
            log_every_samples: Some(DEFAULT_LOG_EVERY_SAMPLES),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_path(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| SegDatasetError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| SegDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply `SEG_DATASET_SEED` and `SEG_DATASET_LOG_EVERY` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(seed) = std::env::var("SEG_DATASET_SEED")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.seed = seed;
        }
        if let Ok(val) = std::env::var("SEG_DATASET_LOG_EVERY") {
            self.log_every_samples = parse_log_every(&val);
        }
        self
    }

    pub fn into_builder(self) -> DatasetResult<BatchGeneratorBuilder> {
        let augmentation = match self.augmentation.as_deref() {
            None => Augmentation::None,
            Some(name) => Augmentation::Builtin(name.parse::<AugmentPolicy>()?),
        };
        Ok(BatchGeneratorBuilder {
            cfg: self,
            augmentation,
            preprocess: None,
        })
    }
}

/// Generation mode implied by a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode<'a> {
    Labeled {
        labels_dir: &'a Path,
        aux_dirs: &'a [PathBuf],
    },
    LabelFree,
}

impl GeneratorConfig {
    pub fn mode(&self) -> GeneratorMode<'_> {
        match &self.labels_dir {
            Some(labels_dir) => GeneratorMode::Labeled {
                labels_dir,
                aux_dirs: &self.aux_dirs,
            },
            None => GeneratorMode::LabelFree,
        }
    }
}

fn parse_log_every(val: &str) -> Option<usize> {
    if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
        None
    } else {
        val.trim().parse::<usize>().ok().filter(|v| *v > 0)
    }
}

#[derive(Clone)]
pub struct BatchGeneratorBuilder {
    cfg: GeneratorConfig,
    augmentation: Augmentation,
    preprocess: Option<Preprocess>,
}

impl BatchGeneratorBuilder {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            cfg: GeneratorConfig {
                images_dir: images_dir.into(),
                ..GeneratorConfig::default()
            },
            augmentation: Augmentation::None,
            preprocess: None,
        }
    }
    pub fn labels_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.labels_dir = Some(dir.into());
        self
    }
    pub fn aux_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.aux_dirs.push(dir.into());
        self
    }
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.cfg.batch_size = batch_size;
        self
    }
    pub fn n_classes(mut self, n_classes: usize) -> Self {
        self.cfg.n_classes = n_classes;
        self
    }
    pub fn input_size(mut self, width: u32, height: u32) -> Self {
        self.cfg.input_width = width;
        self.cfg.input_height = height;
        self
    }
    pub fn output_size(mut self, width: u32, height: u32) -> Self {
        self.cfg.output_width = width;
        self.cfg.output_height = height;
        self
    }
    pub fn normalization(mut self, norm: Normalization) -> Self {
        self.cfg.normalization = norm;
        self
    }
    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.cfg.read_mode = mode;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.cfg.seed = seed;
        self
    }
    pub fn ignore_non_matching(mut self, ignore: bool) -> Self {
        self.cfg.ignore_non_matching = ignore;
        self
    }
    pub fn augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = augmentation;
        self
    }
    pub fn builtin_augmentation(self, policy: AugmentPolicy) -> Self {
        self.augmentation(Augmentation::Builtin(policy))
    }
    pub fn custom_augmentation(self, augmenter: Arc<dyn Augmenter>) -> Self {
        self.augmentation(Augmentation::Custom(augmenter))
    }
    pub fn preprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(Raster) -> DatasetResult<Raster> + Send + Sync + 'static,
    {
        self.preprocess = Some(Arc::new(f));
        self
    }
    pub fn log_every(mut self, samples: Option<usize>) -> Self {
        self.cfg.log_every_samples = samples;
        self
    }

    /// Validate the configuration, build and shuffle the dataset.
    pub fn build(self) -> DatasetResult<BatchGenerator> {
        BatchGenerator::new(self.cfg, self.augmentation, self.preprocess)
    }
}

/// Wraparound cursor over an owned sequence.
#[derive(Debug, Clone)]
pub struct Cycle<T> {
    items: Vec<T>,
    position: usize,
}

impl<T> Cycle<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, position: 0 }
    }

    /// Current element, advancing the cursor. `None` only when empty.
    pub fn next_item(&mut self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let idx = self.position;
        self.position = (self.position + 1) % self.items.len();
        self.items.get(idx)
    }

    /// Index of the element the next call will yield.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

enum SampleSet {
    Labeled(Cycle<MatchedSample>),
    LabelFree(Cycle<PathBuf>),
}

/// Per-sample processing, fixed at construction.
enum SamplePipeline {
    Standard {
        augmentation: Augmentation,
        preprocess: Option<Preprocess>,
    },
    /// First auxiliary raster stacked onto the image; no augmentation or preprocessing.
    AuxConcat,
}

/// Stacked features, plus stacked one-hot labels in labeled mode.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, input_height, input_width, channels]`
    pub images: FeatureTensor,
    /// `[batch, output_height, output_width, n_classes]`
    pub labels: Option<LabelTensor>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded, single-consumer batch source.
///
/// The dataset is shuffled once with the configured seed and then traversed in
/// the same order forever. Run one generator per thread for parallel loading.
pub struct BatchGenerator {
    samples: SampleSet,
    pipeline: SamplePipeline,
    cfg: GeneratorConfig,
    rng: StdRng,
    processed_samples: usize,
    processed_batches: usize,
    started: Instant,
    last_log: Instant,
    last_logged_samples: usize,
}

impl BatchGenerator {
    pub fn builder(images_dir: impl Into<PathBuf>) -> BatchGeneratorBuilder {
        BatchGeneratorBuilder::new(images_dir)
    }

    fn new(
        cfg: GeneratorConfig,
        augmentation: Augmentation,
        preprocess: Option<Preprocess>,
    ) -> DatasetResult<Self> {
        validate(&cfg, &augmentation, preprocess.is_some())?;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let samples = match cfg.mode() {
            GeneratorMode::Labeled {
                labels_dir,
                aux_dirs,
            } => {
                let opts = MatchOptions::default().ignore_non_matching(cfg.ignore_non_matching);
                let mut pairs = match_pairs(&cfg.images_dir, labels_dir, aux_dirs, opts)?;
                pairs.shuffle(&mut rng);
                SampleSet::Labeled(Cycle::new(pairs))
            }
            GeneratorMode::LabelFree => {
                let mut images = list_images(&cfg.images_dir)?;
                images.shuffle(&mut rng);
                SampleSet::LabelFree(Cycle::new(images))
            }
        };
        let len = match &samples {
            SampleSet::Labeled(c) => c.len(),
            SampleSet::LabelFree(c) => c.len(),
        };
        if len == 0 {
            return Err(SegDatasetError::EmptyDataset {
                images_dir: cfg.images_dir.clone(),
            });
        }

        let pipeline = if cfg.aux_dirs.is_empty() {
            SamplePipeline::Standard {
                augmentation,
                preprocess,
            }
        } else {
            if cfg.aux_dirs.len() > 1 {
                tracing::warn!(
                    aux_dirs = cfg.aux_dirs.len(),
                    used = %cfg.aux_dirs[0].display(),
                    "only the first auxiliary input is stacked onto images; \
                     the others are matched but not loaded"
                );
            }
            SamplePipeline::AuxConcat
        };

        tracing::info!(
            images_dir = %cfg.images_dir.display(),
            samples = len,
            labeled = cfg.labels_dir.is_some(),
            aux_dirs = cfg.aux_dirs.len(),
            batch_size = cfg.batch_size,
            seed = cfg.seed,
            "batch generator ready"
        );
        let now = Instant::now();
        Ok(Self {
            samples,
            pipeline,
            cfg,
            rng,
            processed_samples: 0,
            processed_batches: 0,
            started: now,
            last_log: now,
            last_logged_samples: 0,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.cfg
    }

    /// Number of distinct samples in the cycle.
    pub fn dataset_len(&self) -> usize {
        match &self.samples {
            SampleSet::Labeled(c) => c.len(),
            SampleSet::LabelFree(c) => c.len(),
        }
    }

    /// Cycle index of the next sample to be drawn.
    pub fn cursor_position(&self) -> usize {
        match &self.samples {
            SampleSet::Labeled(c) => c.position(),
            SampleSet::LabelFree(c) => c.position(),
        }
    }

    /// Matched samples in shuffled order; `None` in label-free mode.
    pub fn matched_samples(&self) -> Option<&[MatchedSample]> {
        match &self.samples {
            SampleSet::Labeled(c) => Some(c.items()),
            SampleSet::LabelFree(_) => None,
        }
    }

    /// Image paths in shuffled order; `None` in labeled mode.
    pub fn image_paths(&self) -> Option<&[PathBuf]> {
        match &self.samples {
            SampleSet::Labeled(_) => None,
            SampleSet::LabelFree(c) => Some(c.items()),
        }
    }

    pub fn processed_batches(&self) -> usize {
        self.processed_batches
    }

    /// Draw `batch_size` samples from the cycle and assemble them.
    ///
    /// Decode errors are returned as-is; the cursor has already moved past the
    /// samples drawn before the failure.
    pub fn next_batch(&mut self) -> DatasetResult<Batch> {
        let batch_size = self.cfg.batch_size;
        let mut features = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            match &mut self.samples {
                SampleSet::Labeled(cycle) => {
                    let sample = cycle
                        .next_item()
                        .cloned()
                        .ok_or_else(|| SegDatasetError::EmptyDataset {
                            images_dir: self.cfg.images_dir.clone(),
                        })?;
                    let (x, y) = self.load_labeled(&sample)?;
                    features.push(x);
                    labels.push(y);
                }
                SampleSet::LabelFree(cycle) => {
                    let path = cycle.next_item().cloned().ok_or_else(|| {
                        SegDatasetError::EmptyDataset {
                            images_dir: self.cfg.images_dir.clone(),
                        }
                    })?;
                    features.push(self.load_unlabeled(&path)?);
                }
            }
        }

        let images = Tensor::stack(&features)?;
        let labels = if labels.is_empty() {
            None
        } else {
            Some(Tensor::stack(&labels)?)
        };
        self.processed_batches += 1;
        self.processed_samples += batch_size;
        tracing::debug!(
            batch = self.processed_batches,
            cursor = self.cursor_position(),
            shape = ?images.shape(),
            "assembled batch"
        );
        self.maybe_log_progress();
        Ok(Batch { images, labels })
    }

    fn load_unlabeled(&self, path: &Path) -> DatasetResult<FeatureTensor> {
        let mut image = decode(path, self.cfg.read_mode)?;
        if let SamplePipeline::Standard {
            preprocess: Some(f),
            ..
        } = &self.pipeline
        {
            image = f(image)?;
        }
        self.to_features(image)
    }

    fn load_labeled(
        &mut self,
        sample: &MatchedSample,
    ) -> DatasetResult<(FeatureTensor, LabelTensor)> {
        let mut image = decode(&sample.image_path, self.cfg.read_mode)?;
        let mut label = decode(&sample.label_path, ReadMode::Color)?;
        match &self.pipeline {
            SamplePipeline::AuxConcat => {
                let aux_path = sample.aux_paths.first().ok_or_else(|| {
                    SegDatasetError::MissingAuxiliary {
                        stem: stem_of(&sample.image_path),
                        dir: self.cfg.aux_dirs.first().cloned().unwrap_or_default(),
                    }
                })?;
                let aux = decode(aux_path, ReadMode::Color)?
                    .scale(AUX_SCALE, Interpolation::Bilinear)?;
                image = image.concat_channels(&aux)?;
            }
            SamplePipeline::Standard {
                augmentation,
                preprocess,
            } => {
                if augmentation.is_enabled() {
                    let plane = label.channel(0)?;
                    let (augmented, plane) = augmentation.apply(image, plane, &mut self.rng)?;
                    image = augmented;
                    label = plane;
                }
                if let Some(f) = preprocess {
                    image = f(image)?;
                }
            }
        }
        let features = self.to_features(image)?;
        let labels = label_to_tensor(
            label,
            self.cfg.n_classes,
            self.cfg.output_width,
            self.cfg.output_height,
            false,
        )?;
        Ok((features, labels))
    }

    fn to_features(&self, image: Raster) -> DatasetResult<FeatureTensor> {
        image_to_tensor(
            image,
            self.cfg.input_width,
            self.cfg.input_height,
            self.cfg.normalization,
            ChannelOrder::ChannelsLast,
            self.cfg.read_mode,
        )
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.cfg.log_every_samples else {
            return;
        };
        let processed_since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        if processed_since < threshold && self.last_log.elapsed() < Duration::from_secs(30) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f64().max(0.001);
        tracing::info!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            cursor = self.cursor_position(),
            dataset = self.dataset_len(),
            elapsed_s = secs,
            img_per_s = self.processed_samples as f64 / secs,
            "[dataset] progress"
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }
}

impl Iterator for BatchGenerator {
    type Item = DatasetResult<Batch>;

    /// Never returns `None`.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn validate(
    cfg: &GeneratorConfig,
    augmentation: &Augmentation,
    has_preprocess: bool,
) -> DatasetResult<()> {
    if cfg.batch_size == 0 {
        return Err(SegDatasetError::config("batch_size must be at least 1"));
    }
    if [cfg.input_width, cfg.input_height, cfg.output_width, cfg.output_height].contains(&0) {
        return Err(SegDatasetError::config("input and output dimensions must be non-zero"));
    }
    match cfg.mode() {
        GeneratorMode::LabelFree => {
            if !cfg.aux_dirs.is_empty() {
                return Err(SegDatasetError::config(
                    "auxiliary inputs are not supported in label-free mode",
                ));
            }
            if augmentation.is_enabled() {
                return Err(SegDatasetError::config(
                    "augmentation is not supported in label-free mode",
                ));
            }
        }
        GeneratorMode::Labeled { aux_dirs, .. } => {
            if cfg.n_classes == 0 {
                return Err(SegDatasetError::config("n_classes must be at least 1"));
            }
            if !aux_dirs.is_empty() && augmentation.is_enabled() {
                return Err(SegDatasetError::config(
                    "augmentation is not supported together with auxiliary inputs",
                ));
            }
            if !aux_dirs.is_empty() && has_preprocess {
                return Err(SegDatasetError::config(
                    "preprocessing is not applied to auxiliary-stacked images",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wraps_around() {
        let mut c = Cycle::new(vec!['a', 'b', 'c']);
        let drawn: String = (0..7).filter_map(|_| c.next_item().copied()).collect();
        assert_eq!(drawn, "abcabca");
        assert_eq!(c.position(), 7 % 3);
        assert!(Cycle::<u8>::new(Vec::new()).next_item().is_none());
    }

    #[test]
    fn log_every_parsing() {
        assert_eq!(parse_log_every("off"), None);
        assert_eq!(parse_log_every("0"), None);
        assert_eq!(parse_log_every(" 250 "), Some(250));
        assert_eq!(parse_log_every("junk"), None);
    }

    #[test]
    fn config_rejects_exclusive_options() {
        let labeled = GeneratorConfig {
            labels_dir: Some(PathBuf::from("labels")),
            aux_dirs: vec![PathBuf::from("flow")],
            ..GeneratorConfig::default()
        };
        let aug = Augmentation::Builtin(AugmentPolicy::All);
        assert!(matches!(
            validate(&labeled, &aug, false),
            Err(SegDatasetError::Config { .. })
        ));
        assert!(validate(&labeled, &Augmentation::None, true).is_err());
        assert!(validate(&labeled, &Augmentation::None, false).is_ok());

        let label_free = GeneratorConfig::default();
        assert_eq!(label_free.mode(), GeneratorMode::LabelFree);
        assert!(validate(&label_free, &aug, false).is_err());
        assert!(validate(&label_free, &Augmentation::None, true).is_ok());

        let zero_batch = GeneratorConfig {
            batch_size: 0,
            ..GeneratorConfig::default()
        };
        assert!(validate(&zero_batch, &Augmentation::None, false).is_err());
    }

    #[test]
    fn config_parses_from_json_with_defaults() {
        let raw = r#"{
            "images_dir": "imgs",
            "labels_dir": "segs",
            "normalization": "divide",
            "augmentation": "aug_flip"
        }"#;
        let cfg: GeneratorConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.normalization, Normalization::Divide);
        assert_eq!(cfg.seed, DEFAULT_SEED);
        let builder = cfg.into_builder().unwrap();
        assert!(matches!(
            builder.augmentation,
            Augmentation::Builtin(AugmentPolicy::Flip)
        ));
    }
}
