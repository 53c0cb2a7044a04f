//! Camera that replays PNG recordings
//!
//! A recording directory holds `colour_NNNN.png` (RGB or RGBA, 8 bit) and
//! `depth_NNNN.png` (16-bit grey, millimetres) files. Frames are served in
//! numeric order and loop at the end. Recordings carry no skeletons.

use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage};

use crate::sensor::device::{DepthCamera, ImageFrame, Resolution, COLOUR_BYTES_PER_PIXEL, DEPTH_BYTES_PER_PIXEL};
use crate::sensor::skeleton::SkeletonFrame;
use crate::sensor::SensorError;

#[derive(Debug, Clone, Default)]
struct Track {
    files: Vec<PathBuf>,
    resolution: Option<Resolution>,
    cursor: usize,
    frames: u32,
}

impl Track {
    fn open(&mut self, stream: &'static str, requested: Resolution) -> Result<Resolution, SensorError> {
        let first = self.files.first().ok_or_else(|| SensorError::StreamOpen {
            stream,
            message: format!("recording has no {stream}_NNNN.png frames"),
        })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| SensorError::StreamOpen {
            stream,
            message: format!("{}: {e}", first.display()),
        })?;
        let resolution = Resolution::new(width, height);
        if resolution != requested {
            log::info!(
                "Recorded {stream} stream is {width}x{height}, not the requested {}x{}",
                requested.width,
                requested.height
            );
        }
        self.resolution = Some(resolution);
        Ok(resolution)
    }

    /// Next file in the loop along with its frame number
    fn advance(&mut self) -> Option<(&Path, u32, Resolution)> {
        let resolution = self.resolution?;
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.files.len();
        let frame = self.frames;
        self.frames = self.frames.wrapping_add(1);
        Some((&self.files[index], frame, resolution))
    }
}

/// Replays a recording directory
#[derive(Debug, Clone)]
pub struct RecordedCamera {
    dir: PathBuf,
    colour: Track,
    depth: Track,
}

/// Frame number from a `prefix_NNNN.png` file name
fn frame_index(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.strip_prefix('_')?.strip_suffix(".png")?.parse().ok()
}

impl RecordedCamera {
    /// Index a recording directory
    ///
    /// # Errors
    ///
    /// The directory cannot be read, or lacks either colour or depth frames.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SensorError> {
        let dir = dir.as_ref();
        let recording_error = |message: String| SensorError::Recording {
            path: dir.to_path_buf(),
            message,
        };

        let entries = std::fs::read_dir(dir).map_err(|e| recording_error(e.to_string()))?;
        let mut colour = Vec::new();
        let mut depth = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| recording_error(e.to_string()))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(index) = frame_index(name, "colour") {
                colour.push((index, path));
            } else if let Some(index) = frame_index(name, "depth") {
                depth.push((index, path));
            }
        }
        if depth.is_empty() {
            return Err(recording_error("no depth_NNNN.png frames".to_string()));
        }
        if colour.is_empty() {
            return Err(recording_error("no colour_NNNN.png frames".to_string()));
        }

        colour.sort();
        depth.sort();
        log::info!(
            "Recording {}: {} colour and {} depth frames",
            dir.display(),
            colour.len(),
            depth.len()
        );

        let files = |frames: Vec<(u32, PathBuf)>| -> Vec<PathBuf> { frames.into_iter().map(|(_, path)| path).collect() };
        Ok(Self {
            dir: dir.to_path_buf(),
            colour: Track { files: files(colour), ..Track::default() },
            depth: Track { files: files(depth), ..Track::default() },
        })
    }

    /// Recording directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(path: &Path, expected: Resolution) -> Option<DynamicImage> {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Skipping unreadable frame {}: {e}", path.display());
                return None;
            }
        };
        if Resolution::new(image.width(), image.height()) != expected {
            log::warn!(
                "Skipping frame {}: {}x{} does not match the stream",
                path.display(),
                image.width(),
                image.height()
            );
            return None;
        }
        Some(image)
    }
}

impl DepthCamera for RecordedCamera {
    fn name(&self) -> &str {
        "recording"
    }

    fn open_colour_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
        self.colour.open("colour", requested)
    }

    fn open_depth_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
        self.depth.open("depth", requested)
    }

    fn enable_skeleton_tracking(&mut self) -> Result<(), SensorError> {
        log::info!("Recording {} has no skeleton stream", self.dir.display());
        Ok(())
    }

    fn next_colour_frame(&mut self) -> Option<ImageFrame> {
        let (path, frame, resolution) = self.colour.advance()?;
        let mut pixels = Self::load(path, resolution)?.into_rgba8().into_raw();
        // Device layout is BGRA
        for pixel in pixels.chunks_exact_mut(COLOUR_BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
        Some(ImageFrame::packed(frame, resolution.width, resolution.height, COLOUR_BYTES_PER_PIXEL, pixels))
    }

    fn next_depth_frame(&mut self) -> Option<ImageFrame> {
        let (path, frame, resolution) = self.depth.advance()?;
        let image = Self::load(path, resolution)?;
        if image.color() != ColorType::L16 {
            log::warn!("Skipping depth frame {}: expected 16-bit grey, got {:?}", path.display(), image.color());
            return None;
        }
        let data = image.into_luma16().into_raw().iter().flat_map(|s| s.to_le_bytes()).collect();
        Some(ImageFrame::packed(frame, resolution.width, resolution.height, DEPTH_BYTES_PER_PIXEL, data))
    }

    fn next_skeleton_frame(&mut self) -> Option<SkeletonFrame> {
        None
    }

    fn shutdown(&mut self) {
        self.colour.resolution = None;
        self.depth.resolution = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgba};

    fn write_depth(dir: &Path, index: u32, value: u16) {
        let image = ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(4, 2, Luma([value]));
        image.save(dir.join(format!("depth_{index:04}.png"))).unwrap();
    }

    fn write_colour(dir: &Path, index: u32) {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        image.save(dir.join(format!("colour_{index:04}.png"))).unwrap();
    }

    #[test]
    fn test_frame_index_parsing() {
        assert_eq!(frame_index("depth_0012.png", "depth"), Some(12));
        assert_eq!(frame_index("depth_12.png", "colour"), None);
        assert_eq!(frame_index("depth_x.png", "depth"), None);
        assert_eq!(frame_index("depth0001.png", "depth"), None);
    }

    #[test]
    fn test_missing_depth_frames_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_colour(dir.path(), 0);
        assert!(matches!(RecordedCamera::open(dir.path()), Err(SensorError::Recording { .. })));
        assert!(RecordedCamera::open(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_missing_colour_frames_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_depth(dir.path(), 0, 1000);
        match RecordedCamera::open(dir.path()) {
            Err(SensorError::Recording { path, message }) => {
                assert_eq!(path, dir.path());
                assert!(message.contains("colour"), "{message}");
            }
            other => panic!("expected a recording error, got {other:?}"),
        }
    }

    #[test]
    fn test_depth_frames_loop_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_depth(dir.path(), 2, 2000);
        write_depth(dir.path(), 1, 1000);
        write_colour(dir.path(), 1);

        let mut camera = RecordedCamera::open(dir.path()).unwrap();
        assert_eq!(camera.open_depth_stream(Resolution::new(640, 480)).unwrap(), Resolution::new(4, 2));

        let first = camera.next_depth_frame().unwrap();
        assert_eq!(&first.data[..2], &1000u16.to_le_bytes());
        assert_eq!(first.pitch, 8);
        let second = camera.next_depth_frame().unwrap();
        assert_eq!(&second.data[..2], &2000u16.to_le_bytes());
        let third = camera.next_depth_frame().unwrap();
        assert_eq!(&third.data[..2], &1000u16.to_le_bytes());
        assert_eq!(third.frame_number, 2);
    }

    #[test]
    fn test_colour_frames_swizzled_to_bgra() {
        let dir = tempfile::tempdir().unwrap();
        write_depth(dir.path(), 0, 1000);
        write_colour(dir.path(), 0);

        let mut camera = RecordedCamera::open(dir.path()).unwrap();
        camera.open_colour_stream(Resolution::new(4, 2)).unwrap();
        let frame = camera.next_colour_frame().unwrap();
        assert_eq!(&frame.data[..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn test_streams_closed_until_opened() {
        let dir = tempfile::tempdir().unwrap();
        write_depth(dir.path(), 0, 1000);
        write_colour(dir.path(), 0);
        let mut camera = RecordedCamera::open(dir.path()).unwrap();
        assert!(camera.next_depth_frame().is_none());
        assert!(camera.next_colour_frame().is_none());
        assert!(camera.next_skeleton_frame().is_none());

        camera.open_depth_stream(Resolution::new(4, 2)).unwrap();
        assert!(camera.next_depth_frame().is_some());
        camera.shutdown();
        assert!(camera.next_depth_frame().is_none());
    }
}
