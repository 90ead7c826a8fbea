use bytes::{Bytes, BytesMut};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may include padding past `width * bytes_per_pixel`
    pub stride: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
    /// Set once the horizontal flip has been applied
    pub mirrored: bool,
}

/// Decoded pixel layouts that travel through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Gray8,
}

/// Wire formats requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    Mjpeg,
    Yuyv,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl CaptureFormat {
    pub fn name(self) -> &'static str {
        match self {
            CaptureFormat::Mjpeg => "MJPEG",
            CaptureFormat::Yuyv => "YUYV",
        }
    }
}

impl Frame {
    /// Wrap a tightly packed pixel buffer.
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Self {
        Self {
            data: data.into(),
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                stride: width * format.bytes_per_pixel() as u32,
                format,
                device_timestamp: None,
                mirrored: false,
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn with_device_timestamp(mut self, ts: Duration) -> Self {
        Arc::make_mut(&mut self.meta).device_timestamp = Some(ts);
        self
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Mirror the frame around its vertical axis.
    ///
    /// Row padding is preserved at the end of each row, and a row cut off
    /// mid-pixel keeps its trailing bytes, so the buffer length never changes.
    pub fn flip_horizontal(&mut self) {
        let bpp = self.meta.format.bytes_per_pixel();
        let stride = self.meta.stride as usize;
        let row_bytes = self.meta.width as usize * bpp;
        if stride == 0 {
            return;
        }
        let mut out = BytesMut::with_capacity(self.data.len());

        for row in self.data.chunks(stride) {
            let (pixels, padding) = row.split_at(row_bytes.min(row.len()));
            let whole = pixels.chunks_exact(bpp);
            let partial = whole.remainder();
            for px in whole.rev() {
                out.extend_from_slice(px);
            }
            out.extend_from_slice(partial);
            out.extend_from_slice(padding);
        }

        self.data = out.freeze();
        let meta = Arc::make_mut(&mut self.meta);
        meta.mirrored = !meta.mirrored;
    }

    /// Copy into an `RgbImage`, converting from the frame's layout.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let (w, h) = (self.meta.width as usize, self.meta.height as usize);
        let bpp = self.meta.format.bytes_per_pixel();
        let stride = self.meta.stride as usize;
        if stride < w * bpp || self.data.len() < stride * h.saturating_sub(1) + w * bpp {
            return None;
        }

        let mut rgb = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            let row = &self.data[y * stride..y * stride + w * bpp];
            match self.meta.format {
                PixelFormat::Rgb24 => rgb.extend_from_slice(row),
                PixelFormat::Bgr24 => {
                    for px in row.chunks_exact(3) {
                        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
                PixelFormat::Gray8 => {
                    for &l in row {
                        rgb.extend_from_slice(&[l, l, l]);
                    }
                }
            }
        }

        RgbImage::from_raw(self.meta.width, self.meta.height, rgb)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("size", &(self.meta.width, self.meta.height))
            .field("format", &self.meta.format)
            .field("mirrored", &self.meta.mirrored)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_reverses_pixels_within_each_row() {
        // 3x2 RGB frame, pixel value == column index
        let data: Vec<u8> = [0u8, 1, 2, 0, 1, 2]
            .iter()
            .flat_map(|&c| [c, c, c])
            .collect();
        let mut frame = Frame::new(data, 3, 2, PixelFormat::Rgb24, 1);

        frame.flip_horizontal();

        let expected: Vec<u8> = [2u8, 1, 0, 2, 1, 0]
            .iter()
            .flat_map(|&c| [c, c, c])
            .collect();
        assert_eq!(&frame.data[..], &expected[..]);
        assert!(frame.meta.mirrored);
    }

    #[test]
    fn flip_keeps_row_padding_in_place() {
        let mut frame = Frame::new(vec![1u8, 2, 9, 3, 4, 9], 2, 2, PixelFormat::Gray8, 0);
        Arc::make_mut(&mut frame.meta).stride = 3;

        frame.flip_horizontal();

        assert_eq!(&frame.data[..], &[2, 1, 9, 4, 3, 9]);
    }

    #[test]
    fn flip_keeps_length_of_truncated_last_row() {
        // second row stops two bytes into its first pixel
        let data = vec![1u8, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4];
        let mut frame = Frame::new(data, 3, 2, PixelFormat::Rgb24, 0);

        frame.flip_horizontal();

        assert_eq!(frame.data.len(), 11);
        assert_eq!(&frame.data[..], &[3, 3, 3, 2, 2, 2, 1, 1, 1, 4, 4]);
    }

    #[test]
    fn double_flip_restores_original() {
        let data: Vec<u8> = (0..24).collect();
        let mut frame = Frame::new(data.clone(), 4, 2, PixelFormat::Bgr24, 0);
        frame.flip_horizontal();
        frame.flip_horizontal();
        assert_eq!(&frame.data[..], &data[..]);
        assert!(!frame.meta.mirrored);
    }

    #[test]
    fn bgr_converts_to_rgb_image() {
        let frame = Frame::new(vec![10u8, 20, 30], 1, 1, PixelFormat::Bgr24, 0);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn short_buffer_has_no_rgb_image() {
        let frame = Frame::new(vec![0u8; 3], 2, 2, PixelFormat::Gray8, 0);
        assert!(frame.to_rgb_image().is_none());
    }
}
