//! Host-side helpers for raw grayscale fingerprint images.

use serde::{Deserialize, Serialize};

/// Capture size option.
///
/// The reader only produces full and half size images. Smaller options are
/// captured at half size and scaled down on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    /// 300x400
    #[default]
    Full,
    /// 150x200
    Half,
    /// 90x120
    Small,
    /// 60x80
    Tiny,
}

impl ImageSize {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Full => (300, 400),
            Self::Half => (150, 200),
            Self::Small => (90, 120),
            Self::Tiny => (60, 80),
        }
    }

    /// Size the device is asked to produce.
    pub fn device_size(self) -> Self {
        match self {
            Self::Full => Self::Full,
            _ => Self::Half,
        }
    }

    pub fn needs_scaling(self) -> bool {
        self.device_size() != self
    }
}

impl std::str::FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "half" => Ok(Self::Half),
            "small" => Ok(Self::Small),
            "tiny" => Ok(Self::Tiny),
            other => Err(format!("Unknown image size: {other}")),
        }
    }
}

/// Nearest-neighbour scale of an 8-bit grayscale buffer.
///
/// Pixels missing from a short source buffer read as white.
pub fn scale_nearest(src: &[u8], width: u32, height: u32, target_width: u32, target_height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity((target_width * target_height) as usize);
    if width == 0 || height == 0 {
        out.resize((target_width * target_height) as usize, 0xFF);
        return out;
    }

    for y in 0..target_height {
        let sy = (u64::from(y) * u64::from(height) / u64::from(target_height.max(1))) as usize;
        for x in 0..target_width {
            let sx = (u64::from(x) * u64::from(width) / u64::from(target_width.max(1))) as usize;
            let idx = sy * width as usize + sx;
            out.push(src.get(idx).copied().unwrap_or(0xFF));
        }
    }
    out
}

/// Quick quality statistics for a captured image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStats {
    pub min: u8,
    pub max: u8,
    pub mean: f64,
    /// max - min
    pub contrast: u8,
}

impl ImageStats {
    pub fn from_pixels(pixels: &[u8]) -> Option<Self> {
        if pixels.is_empty() {
            return None;
        }

        let mut min = u8::MAX;
        let mut max = u8::MIN;
        let mut sum: u64 = 0;
        for &p in pixels {
            min = min.min(p);
            max = max.max(p);
            sum += u64::from(p);
        }

        Some(Self {
            min,
            max,
            mean: sum as f64 / pixels.len() as f64,
            contrast: max - min,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_size_mapping() {
        assert_eq!(ImageSize::Full.device_size(), ImageSize::Full);
        assert_eq!(ImageSize::Half.device_size(), ImageSize::Half);
        assert_eq!(ImageSize::Tiny.device_size(), ImageSize::Half);
        assert!(ImageSize::Small.needs_scaling());
        assert!(!ImageSize::Half.needs_scaling());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!("TINY".parse::<ImageSize>(), Ok(ImageSize::Tiny));
        assert!("huge".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_scale_half() {
        // 4x2 image -> 2x1
        let src = [10, 20, 30, 40, 50, 60, 70, 80];
        let out = scale_nearest(&src, 4, 2, 2, 1);
        assert_eq!(out, vec![10, 30]);
    }

    #[test]
    fn test_scale_identity() {
        let src: Vec<u8> = (0..12).collect();
        assert_eq!(scale_nearest(&src, 3, 4, 3, 4), src);
    }

    #[test]
    fn test_scale_short_source_pads_white() {
        let out = scale_nearest(&[1, 2], 2, 2, 2, 2);
        assert_eq!(out, vec![1, 2, 0xFF, 0xFF]);
    }

    #[test]
    fn test_stats() {
        let stats = ImageStats::from_pixels(&[0, 100, 200]).unwrap();
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 200);
        assert_eq!(stats.contrast, 200);
        assert!((stats.mean - 100.0).abs() < f64::EPSILON);
        assert!(ImageStats::from_pixels(&[]).is_none());
    }
}
