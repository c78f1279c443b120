//! Paired image/label augmentation.
//!
//! Geometric operations are applied to the image and the label plane together so
//! they stay aligned; photometric operations touch the image only. Label planes
//! are only ever permuted, never interpolated.

use crate::raster::Raster;
use crate::types::{DatasetResult, SegDatasetError};
use image::{imageops, GrayImage};
use rand::{Rng, RngCore};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// An augmentation applied to one image and its single-channel label plane.
pub trait Augmenter: Send + Sync {
    fn augment(
        &self,
        image: Raster,
        label_plane: Raster,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Raster, Raster)>;
}

impl<F> Augmenter for F
where
    F: Fn(Raster, Raster, &mut dyn RngCore) -> DatasetResult<(Raster, Raster)> + Send + Sync,
{
    fn augment(
        &self,
        image: Raster,
        label_plane: Raster,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Raster, Raster)> {
        self(image, label_plane, rng)
    }
}

/// Built-in augmentation policies, selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentPolicy {
    /// Geometric and photometric operations.
    All,
    /// Flips only.
    Geometric,
    /// Brightness/contrast jitter, noise, and blur.
    NonGeometric,
    /// Horizontal flip with probability 0.5.
    Flip,
}

impl AugmentPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AugmentPolicy::All => "aug_all",
            AugmentPolicy::Geometric => "aug_geometric",
            AugmentPolicy::NonGeometric => "aug_non_geometric",
            AugmentPolicy::Flip => "aug_flip",
        }
    }

    fn geometric(&self) -> bool {
        matches!(
            self,
            AugmentPolicy::All | AugmentPolicy::Geometric | AugmentPolicy::Flip
        )
    }

    fn photometric(&self) -> bool {
        matches!(self, AugmentPolicy::All | AugmentPolicy::NonGeometric)
    }
}

impl fmt::Display for AugmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AugmentPolicy {
    type Err = SegDatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aug_all" => Ok(AugmentPolicy::All),
            "aug_geometric" => Ok(AugmentPolicy::Geometric),
            "aug_non_geometric" => Ok(AugmentPolicy::NonGeometric),
            "aug_flip" => Ok(AugmentPolicy::Flip),
            other => Err(SegDatasetError::config(format!(
                "unknown augmentation policy {other:?}"
            ))),
        }
    }
}

impl Augmenter for AugmentPolicy {
    fn augment(
        &self,
        mut image: Raster,
        mut label_plane: Raster,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Raster, Raster)> {
        if (image.width(), image.height()) != (label_plane.width(), label_plane.height()) {
            return Err(SegDatasetError::shape(format!(
                "image {}x{} and label {}x{} differ; cannot augment together",
                image.width(),
                image.height(),
                label_plane.width(),
                label_plane.height()
            )));
        }
        if self.geometric() {
            maybe_hflip(&mut image, &mut label_plane, 0.5, rng);
            if *self != AugmentPolicy::Flip {
                maybe_vflip(&mut image, &mut label_plane, 0.2, rng);
            }
        }
        if self.photometric() {
            maybe_jitter(&mut image, 0.5, 0.2, rng);
            maybe_noise(&mut image, 0.3, 8.0, rng);
            maybe_blur(&mut image, 0.2, 1.0, rng)?;
        }
        Ok((image, label_plane))
    }
}

/// How the generator augments labeled samples.
#[derive(Clone, Default)]
pub enum Augmentation {
    #[default]
    None,
    Builtin(AugmentPolicy),
    Custom(Arc<dyn Augmenter>),
}

impl Augmentation {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Augmentation::None)
    }

    pub fn describe(&self) -> String {
        match self {
            Augmentation::None => "none".to_string(),
            Augmentation::Builtin(p) => p.to_string(),
            Augmentation::Custom(_) => "custom".to_string(),
        }
    }

    pub(crate) fn apply(
        &self,
        image: Raster,
        label_plane: Raster,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Raster, Raster)> {
        match self {
            Augmentation::None => Ok((image, label_plane)),
            Augmentation::Builtin(p) => p.augment(image, label_plane, rng),
            Augmentation::Custom(f) => f.augment(image, label_plane, rng),
        }
    }
}

impl fmt::Debug for Augmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Augmentation({})", self.describe())
    }
}

pub(crate) fn maybe_hflip(
    image: &mut Raster,
    label: &mut Raster,
    prob: f64,
    rng: &mut dyn RngCore,
) {
    if prob > 0.0 && rng.random_bool(prob.min(1.0)) {
        image.flip_horizontal();
        label.flip_horizontal();
    }
}

pub(crate) fn maybe_vflip(
    image: &mut Raster,
    label: &mut Raster,
    prob: f64,
    rng: &mut dyn RngCore,
) {
    if prob > 0.0 && rng.random_bool(prob.min(1.0)) {
        image.flip_vertical();
        label.flip_vertical();
    }
}

pub(crate) fn maybe_jitter(image: &mut Raster, prob: f64, strength: f32, rng: &mut dyn RngCore) {
    if prob <= 0.0 || strength <= 0.0 || !rng.random_bool(prob.min(1.0)) {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for v in image.data_mut() {
        let x = *v as f32 / 255.0;
        let x = ((x - 0.5) * contrast + 0.5) * bright;
        *v = (x.clamp(0.0, 1.0) * 255.0) as u8;
    }
}

/// Add uniform noise of up to `strength` grey levels to every byte.
pub(crate) fn maybe_noise(image: &mut Raster, prob: f64, strength: f32, rng: &mut dyn RngCore) {
    if prob <= 0.0 || strength <= 0.0 || !rng.random_bool(prob.min(1.0)) {
        return;
    }
    for v in image.data_mut() {
        let noise = rng.random_range(-strength..strength);
        *v = (*v as f32 + noise).clamp(0.0, 255.0) as u8;
    }
}

pub(crate) fn maybe_blur(
    image: &mut Raster,
    prob: f64,
    sigma: f32,
    rng: &mut dyn RngCore,
) -> DatasetResult<()> {
    if prob <= 0.0 || sigma <= 0.0 || !rng.random_bool(prob.min(1.0)) {
        return Ok(());
    }
    let (w, h, channels) = (image.width(), image.height(), image.channels());
    let mut planes = Vec::with_capacity(channels);
    for c in 0..channels {
        let plane = image.channel(c)?.into_data();
        let gray = GrayImage::from_raw(w, h, plane)
            .ok_or_else(|| SegDatasetError::shape("channel plane has wrong length"))?;
        planes.push(imageops::blur(&gray, sigma).into_raw());
    }
    let pixels = w as usize * h as usize;
    let mut data = Vec::with_capacity(pixels * channels);
    for i in 0..pixels {
        for plane in &planes {
            data.push(plane[i]);
        }
    }
    *image = Raster::new(w, h, channels, data)?;
    Ok(())
}

#[cfg(test)]
mod aug_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair() -> (Raster, Raster) {
        let image = Raster::new(3, 2, 3, (0..18).map(|v| v as u8 * 10).collect()).unwrap();
        let label = Raster::new(3, 2, 1, vec![0, 1, 2, 3, 4, 5]).unwrap();
        (image, label)
    }

    #[test]
    fn hflip_moves_image_and_label_together() {
        let (mut image, mut label) = pair();
        let orig_image = image.clone();
        let mut rng = StdRng::seed_from_u64(0);
        maybe_hflip(&mut image, &mut label, 1.0, &mut rng);
        assert_eq!(label.data(), &[2, 1, 0, 5, 4, 3]);
        assert_eq!(image.get(0, 0, 1), orig_image.get(2, 0, 1));
    }

    #[test]
    fn photometric_policy_leaves_labels_untouched() {
        let (image, label) = pair();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            let (img, lbl) = AugmentPolicy::NonGeometric
                .augment(image.clone(), label.clone(), &mut rng)
                .unwrap();
            assert_eq!(lbl, label);
            assert_eq!(img.shape(), image.shape());
        }
    }

    #[test]
    fn policy_names_round_trip_and_reject_unknown() {
        for p in [
            AugmentPolicy::All,
            AugmentPolicy::Geometric,
            AugmentPolicy::NonGeometric,
            AugmentPolicy::Flip,
        ] {
            assert_eq!(p.name().parse::<AugmentPolicy>().unwrap(), p);
        }
        assert!(matches!(
            "aug_bogus".parse::<AugmentPolicy>(),
            Err(SegDatasetError::Config { .. })
        ));
    }

    fn mark_corner(
        img: Raster,
        mut lbl: Raster,
        _rng: &mut dyn RngCore,
    ) -> DatasetResult<(Raster, Raster)> {
        lbl.set(0, 0, 0, 9);
        Ok((img, lbl))
    }

    #[test]
    fn functions_are_augmenters() {
        let aug = Augmentation::Custom(Arc::new(mark_corner));
        let (image, label) = pair();
        let mut rng = StdRng::seed_from_u64(1);
        let (_, out) = aug.apply(image, label, &mut rng).unwrap();
        assert_eq!(out.get(0, 0, 0), 9);
    }
}
