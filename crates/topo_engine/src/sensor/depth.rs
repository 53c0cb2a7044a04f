//! Depth sample normalization
//!
//! Raw samples are millimetres. Each is mapped linearly from `[near, far]`
//! onto `[0, 1]` through an 8-bit intermediate, so the output only takes the
//! 256 values `n / 255`. The banding this produces is what the topography
//! shaders were tuned against.

use crate::sensor::device::{ImageFrame, DEPTH_BYTES_PER_PIXEL};
use crate::sensor::SensorError;

/// Closest distance the sensor reports reliably, in millimetres
pub const MIN_DISTANCE_MM: u16 = 801;

/// Furthest distance the sensor reports reliably, in millimetres
pub const MAX_DISTANCE_MM: u16 = 3975;

/// Depth window mapped onto `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRange {
    near_mm: u16,
    far_mm: u16,
}

impl DepthRange {
    /// Validated range; `near_mm` must be below `far_mm`
    pub fn new(near_mm: u16, far_mm: u16) -> Result<Self, SensorError> {
        if near_mm >= far_mm {
            return Err(SensorError::InvalidDepthRange { near_mm, far_mm });
        }
        Ok(Self { near_mm, far_mm })
    }

    /// Near distance in millimetres
    pub const fn near_mm(self) -> u16 {
        self.near_mm
    }

    /// Far distance in millimetres
    pub const fn far_mm(self) -> u16 {
        self.far_mm
    }

    /// Near distance in centimetres
    pub fn near_cm(self) -> f32 {
        f32::from(self.near_mm) / 10.0
    }

    /// Far distance in centimetres
    pub fn far_cm(self) -> f32 {
        f32::from(self.far_mm) / 10.0
    }

    /// Width of the window in millimetres
    pub const fn span_mm(self) -> u16 {
        self.far_mm - self.near_mm
    }

    /// Normalise one sample
    ///
    /// Samples below `near` give 0; samples beyond `far` saturate at 1.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn normalize(self, raw_mm: u16) -> f32 {
        let offset = f32::from(raw_mm.saturating_sub(self.near_mm));
        let level = (255.0 * offset / f32::from(self.span_mm())).min(255.0) as u8;
        f32::from(level) / 255.0
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            near_mm: MIN_DISTANCE_MM,
            far_mm: MAX_DISTANCE_MM,
        }
    }
}

/// Reusable per-pixel normalised depth buffer
#[derive(Debug, Clone)]
pub struct DepthNormalizer {
    range: DepthRange,
    values: Vec<f32>,
}

impl DepthNormalizer {
    /// Buffer for `pixel_count` samples, initially all zero
    pub fn new(range: DepthRange, pixel_count: usize) -> Self {
        Self {
            range,
            values: vec![0.0; pixel_count],
        }
    }

    /// Active range
    pub const fn range(&self) -> DepthRange {
        self.range
    }

    /// Normalise a depth frame into the buffer
    ///
    /// Samples are little-endian u16. The frame must carry exactly as many
    /// pixels as the buffer holds.
    pub fn normalize_frame(&mut self, frame: &ImageFrame) -> Result<&[f32], SensorError> {
        let pixels = frame.resolution().pixel_count();
        if pixels != self.values.len() {
            return Err(SensorError::MalformedFrame {
                stream: "depth",
                message: format!("{pixels} samples for a {} sample buffer", self.values.len()),
            });
        }

        let samples = frame.packed_rows(DEPTH_BYTES_PER_PIXEL, "depth")?;
        let range = self.range;
        for (value, bytes) in self.values.iter_mut().zip(samples.chunks_exact(DEPTH_BYTES_PER_PIXEL)) {
            let raw = u16::from(bytes[0]) | (u16::from(bytes[1]) << 8);
            *value = range.normalize(raw);
        }
        Ok(&self.values)
    }

    /// Last normalised frame
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Last normalised frame as raw bytes for a float texture upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }

    /// Last normalised frame as 8-bit grey, the exact quantization levels
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_luminance8(&self) -> Vec<u8> {
        self.values.iter().map(|v| (v * 255.0).round() as u8).collect()
    }
}
