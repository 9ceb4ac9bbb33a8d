use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use rand::Rng;

use crate::error::NodeError;

const TEMP_SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PixelTensor {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl PixelTensor {
    pub fn new(shape: &[usize], data: Vec<f32>) -> Result<Self, NodeError> {
        let mut dims = shape;
        while dims.len() > 3 && dims[0] == 1 {
            dims = &dims[1..];
        }
        let [height, width, channels] = dims else {
            return Err(NodeError::Validation(format!(
                "expected an H x W x 3 image tensor, got shape {shape:?}"
            )));
        };
        let (height, width, channels) = (*height, *width, *channels);
        if channels != 3 {
            return Err(NodeError::Validation(format!(
                "expected 3 color channels, got {channels}"
            )));
        }
        if height == 0 || width == 0 {
            return Err(NodeError::Validation(format!(
                "image tensor is empty ({height} x {width})"
            )));
        }
        if u32::try_from(height).is_err() || u32::try_from(width).is_err() {
            return Err(NodeError::Validation(format!(
                "image tensor too large ({height} x {width})"
            )));
        }
        let expected = height
            .checked_mul(width)
            .and_then(|count| count.checked_mul(channels))
            .ok_or_else(|| {
                NodeError::Validation(format!("image tensor too large ({height} x {width})"))
            })?;
        if data.len() != expected {
            return Err(NodeError::Validation(format!(
                "image tensor holds {} values, shape {shape:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        Self {
            height: image.height() as usize,
            width: image.width() as usize,
            data: image
                .as_raw()
                .iter()
                .map(|value| f32::from(*value) / 255.0)
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn to_static_image(&self) -> Result<RgbImage, NodeError> {
        let bytes: Vec<u8> = self.data.iter().copied().map(channel_to_byte).collect();
        RgbImage::from_raw(self.width as u32, self.height as u32, bytes).ok_or_else(|| {
            NodeError::Validation(format!(
                "pixel buffer does not match {} x {}",
                self.width, self.height
            ))
        })
    }
}

fn channel_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value * 255.0).clamp(0.0, 255.0) as u8
}

pub fn content_hash(image: &RgbImage) -> String {
    hex::encode(md5::compute(image.as_raw().as_slice()).0)
}

pub fn file_url(path: &Path) -> String {
    file_url_for(&path.to_string_lossy(), cfg!(windows))
}

fn file_url_for(raw: &str, windows: bool) -> String {
    if windows {
        format!("file://{}", raw.replace('\\', "/"))
    } else {
        format!("file:///{}", raw.trim_start_matches('/'))
    }
}

pub fn path_from_file_url(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file://")?;
    if rest.trim_start_matches('/').is_empty() {
        return None;
    }
    if cfg!(windows) {
        Some(PathBuf::from(rest.trim_start_matches('/')))
    } else {
        Some(PathBuf::from(format!("/{}", rest.trim_start_matches('/'))))
    }
}

pub(crate) fn write_png(path: &Path, image: &RgbImage) -> Result<(), NodeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| NodeError::io(parent, source))?;
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

/// PNG written to a throwaway path and removed when the guard drops, on the
/// success path and on every error path alike.
#[derive(Debug)]
pub struct TempImageFile {
    path: PathBuf,
}

impl TempImageFile {
    pub fn create(dir: &Path, image: &RgbImage) -> Result<Self, NodeError> {
        let guard = Self {
            path: dir.join(format!("image_temp_{}.png", random_suffix(TEMP_SUFFIX_LEN))),
        };
        write_png(&guard.path, image)?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> String {
        file_url(&self.path)
    }
}

impl Drop for TempImageFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed temporary image"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temporary image")
            }
        }
    }
}
