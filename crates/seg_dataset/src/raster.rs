//! Decoded pixel grids and the decode/resize primitives used by the codec and generator.

use crate::types::{DatasetResult, Interpolation, ReadMode, SegDatasetError};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use std::path::Path;

/// Interleaved 8-bit pixel grid, `height x width x channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<u8>) -> DatasetResult<Self> {
        if channels == 0 {
            return Err(SegDatasetError::shape("raster needs at least one channel"));
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(SegDatasetError::shape(format!(
                "raster {width}x{height}x{channels} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Raster with every byte set to `value`.
    pub fn filled(width: u32, height: u32, channels: usize, value: u8) -> DatasetResult<Self> {
        Self::new(
            width,
            height,
            channels,
            vec![value; width as usize * height as usize * channels],
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(height, width, channels)`, the same ordering a tensor shape uses.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32, c: usize) -> u8 {
        self.data[self.offset(x, y) + c]
    }

    pub fn set(&mut self, x: u32, y: u32, c: usize, value: u8) {
        let idx = self.offset(x, y) + c;
        self.data[idx] = value;
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels
    }

    /// A single channel as a one-channel raster.
    pub fn channel(&self, c: usize) -> DatasetResult<Raster> {
        if c >= self.channels {
            return Err(SegDatasetError::shape(format!(
                "channel {c} out of range for {}-channel raster",
                self.channels
            )));
        }
        let data = self
            .data
            .chunks_exact(self.channels)
            .map(|px| px[c])
            .collect();
        Raster::new(self.width, self.height, 1, data)
    }

    /// Overwrite channel `c` with the single channel of `plane`.
    pub fn set_channel(&mut self, c: usize, plane: &Raster) -> DatasetResult<()> {
        if c >= self.channels || plane.channels != 1 {
            return Err(SegDatasetError::shape(format!(
                "cannot write a {}-channel plane into channel {c} of a {}-channel raster",
                plane.channels, self.channels
            )));
        }
        if (plane.width, plane.height) != (self.width, self.height) {
            return Err(SegDatasetError::shape(format!(
                "plane is {}x{}, raster is {}x{}",
                plane.width, plane.height, self.width, self.height
            )));
        }
        let channels = self.channels;
        for (px, v) in self.data.chunks_exact_mut(channels).zip(&plane.data) {
            px[c] = *v;
        }
        Ok(())
    }

    /// Largest value in channel `c`.
    pub fn max_in_channel(&self, c: usize) -> Option<u8> {
        self.data
            .chunks_exact(self.channels)
            .filter_map(|px| px.get(c).copied())
            .max()
    }

    /// Stack `other`'s channels after this raster's channels. Both must share width and height.
    pub fn concat_channels(&self, other: &Raster) -> DatasetResult<Raster> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(SegDatasetError::shape(format!(
                "cannot concatenate {}x{} raster with {}x{} raster along channels",
                self.width, self.height, other.width, other.height
            )));
        }
        let channels = self.channels + other.channels;
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        for (a, b) in self
            .data
            .chunks_exact(self.channels)
            .zip(other.data.chunks_exact(other.channels))
        {
            data.extend_from_slice(a);
            data.extend_from_slice(b);
        }
        Raster::new(self.width, self.height, channels, data)
    }

    /// Resample to `width x height`. Each channel is resized independently.
    pub fn resize(
        &self,
        width: u32,
        height: u32,
        interpolation: Interpolation,
    ) -> DatasetResult<Raster> {
        if width == 0 || height == 0 {
            return Err(SegDatasetError::shape(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(self.clone());
        }
        let filter = match interpolation {
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Nearest => FilterType::Nearest,
        };
        let mut planes = Vec::with_capacity(self.channels);
        for c in 0..self.channels {
            let plane = self.channel(c)?;
            let gray = GrayImage::from_raw(self.width, self.height, plane.data)
                .ok_or_else(|| SegDatasetError::shape("channel plane has wrong length"))?;
            planes.push(image::imageops::resize(&gray, width, height, filter).into_raw());
        }
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * self.channels);
        for i in 0..pixels {
            for plane in &planes {
                data.push(plane[i]);
            }
        }
        Raster::new(width, height, self.channels, data)
    }

    /// Scale both dimensions by `factor`, rounding to the nearest pixel with ties
    /// to even (so a width of 5 at 0.5 becomes 2), minimum 1.
    pub fn scale(&self, factor: f64, interpolation: Interpolation) -> DatasetResult<Raster> {
        let w = ((self.width as f64 * factor).round_ties_even() as u32).max(1);
        let h = ((self.height as f64 * factor).round_ties_even() as u32).max(1);
        self.resize(w, h, interpolation)
    }

    /// Mirror left to right.
    pub fn flip_horizontal(&mut self) {
        let (w, channels) = (self.width as usize, self.channels);
        if w == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(w * channels) {
            for x in 0..w / 2 {
                let (a, b) = (x * channels, (w - 1 - x) * channels);
                for c in 0..channels {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// Mirror top to bottom.
    pub fn flip_vertical(&mut self) {
        let row_len = self.width as usize * self.channels;
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.data.split_at_mut((h - 1 - y) * row_len);
            top[y * row_len..(y + 1) * row_len].swap_with_slice(&mut bottom[..row_len]);
        }
    }

    /// Convert from a decoded image, reordering colour channels to B,G,R(,A).
    pub fn from_dynamic(img: DynamicImage, mode: ReadMode) -> DatasetResult<Raster> {
        let (width, height) = img.dimensions();
        let bgr = |img: &DynamicImage| swap_red_blue(img.to_rgb8().into_raw(), 3);
        let bgra = |img: &DynamicImage| swap_red_blue(img.to_rgba8().into_raw(), 4);
        match mode {
            ReadMode::Grayscale => Raster::new(width, height, 1, img.to_luma8().into_raw()),
            ReadMode::Color => Raster::new(width, height, 3, bgr(&img)),
            ReadMode::Unchanged => match img.color().channel_count() {
                1 => Raster::new(width, height, 1, img.to_luma8().into_raw()),
                2 => Raster::new(width, height, 2, img.to_luma_alpha8().into_raw()),
                3 => Raster::new(width, height, 3, bgr(&img)),
                _ => Raster::new(width, height, 4, bgra(&img)),
            },
        }
    }

    /// Encode as an image for saving. Three and four channel rasters are read as B,G,R(,A).
    pub fn to_dynamic(&self) -> DatasetResult<DynamicImage> {
        let invalid = || SegDatasetError::shape("raster buffer does not match its dimensions");
        let (w, h) = (self.width, self.height);
        let img = match self.channels {
            1 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(w, h, self.data.clone()).ok_or_else(invalid)?,
            ),
            2 => DynamicImage::ImageLumaA8(
                image::GrayAlphaImage::from_raw(w, h, self.data.clone()).ok_or_else(invalid)?,
            ),
            3 => {
                let rgb = swap_red_blue(self.data.clone(), 3);
                DynamicImage::ImageRgb8(image::RgbImage::from_raw(w, h, rgb).ok_or_else(invalid)?)
            }
            4 => {
                let rgba = swap_red_blue(self.data.clone(), 4);
                DynamicImage::ImageRgba8(
                    image::RgbaImage::from_raw(w, h, rgba).ok_or_else(invalid)?,
                )
            }
            n => {
                return Err(SegDatasetError::shape(format!(
                    "cannot encode a {n}-channel raster as an image"
                )))
            }
        };
        Ok(img)
    }
}

fn swap_red_blue(mut data: Vec<u8>, channels: usize) -> Vec<u8> {
    for px in data.chunks_exact_mut(channels) {
        px.swap(0, 2);
    }
    data
}

/// Read and decode an image file.
pub fn decode(path: &Path, mode: ReadMode) -> DatasetResult<Raster> {
    let img = image::open(path).map_err(|e| SegDatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    Raster::from_dynamic(img, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32, channels: usize) -> Raster {
        let n = width as usize * height as usize * channels;
        Raster::new(width, height, channels, (0..n).map(|v| v as u8).collect()).unwrap()
    }

    #[test]
    fn color_decode_is_bgr() {
        let mut img = image::RgbImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        let r = Raster::from_dynamic(DynamicImage::ImageRgb8(img), ReadMode::Color).unwrap();
        assert_eq!(r.data(), &[30, 20, 10]);
        let back = r.to_dynamic().unwrap().to_rgb8();
        assert_eq!(back.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn grayscale_label_replicates_into_color() {
        let img = GrayImage::from_raw(2, 1, vec![2, 7]).unwrap();
        let r = Raster::from_dynamic(DynamicImage::ImageLuma8(img), ReadMode::Color).unwrap();
        assert_eq!(r.channel(0).unwrap().data(), &[2, 7]);
        assert_eq!(r.max_in_channel(0), Some(7));
    }

    #[test]
    fn nearest_resize_keeps_only_existing_values() {
        let r = Raster::new(2, 2, 1, vec![0, 1, 2, 3]).unwrap();
        let up = r.resize(5, 3, Interpolation::Nearest).unwrap();
        assert_eq!(up.shape(), (3, 5, 1));
        assert!(up.data().iter().all(|v| *v <= 3));
    }

    #[test]
    fn concat_and_scale() {
        let img = ramp(4, 2, 3);
        let aux = ramp(8, 4, 3).scale(0.5, Interpolation::Bilinear).unwrap();
        let combined = img.concat_channels(&aux).unwrap();
        assert_eq!(combined.shape(), (2, 4, 6));
        assert_eq!(combined.get(1, 0, 2), img.get(1, 0, 2));
        assert_eq!(combined.get(1, 0, 3), aux.get(1, 0, 0));
        assert!(img.concat_channels(&ramp(3, 2, 1)).is_err());
    }

    #[test]
    fn half_scale_rounds_ties_to_even() {
        let odd = ramp(5, 7, 1).scale(0.5, Interpolation::Bilinear).unwrap();
        assert_eq!(odd.shape(), (4, 2, 1));
        let tiny = ramp(1, 1, 3).scale(0.5, Interpolation::Bilinear).unwrap();
        assert_eq!(tiny.shape(), (1, 1, 3));
    }

    #[test]
    fn flips_are_involutions() {
        let orig = ramp(3, 3, 2);
        let mut r = orig.clone();
        r.flip_horizontal();
        assert_eq!(r.get(0, 1, 1), orig.get(2, 1, 1));
        r.flip_horizontal();
        r.flip_vertical();
        assert_eq!(r.get(1, 0, 0), orig.get(1, 2, 0));
        r.flip_vertical();
        assert_eq!(r, orig);
    }
}
