use jpeg_decoder::Decoder;

use super::frame::{CaptureFormat, PixelFormat};
use crate::error::CaptureError;

/// Decoded image returned by [`decode_frame`]
pub struct Decoded {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

pub fn decode_frame(
    data: &[u8],
    format: CaptureFormat,
    width: u32,
    height: u32,
) -> Result<Decoded, CaptureError> {
    match format {
        CaptureFormat::Mjpeg => decode_mjpeg(data),
        CaptureFormat::Yuyv => {
            let expected = width as usize * height as usize * 2;
            if data.len() < expected {
                return Err(CaptureError::Decode {
                    format: format.name(),
                    reason: format!("expected {expected} bytes, got {}", data.len()),
                });
            }
            Ok(Decoded {
                pixels: yuyv_to_rgb(&data[..expected]),
                width,
                height,
                format: PixelFormat::Rgb24,
            })
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<Decoded, CaptureError> {
    let decode_err = |reason: String| CaptureError::Decode {
        format: CaptureFormat::Mjpeg.name(),
        reason,
    };

    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode().map_err(|e| decode_err(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| decode_err("missing image header".into()))?;

    let format = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => PixelFormat::Rgb24,
        jpeg_decoder::PixelFormat::L8 => PixelFormat::Gray8,
        other => return Err(decode_err(format!("unsupported JPEG layout {other:?}"))),
    };

    Ok(Decoded {
        pixels,
        width: info.width as u32,
        height: info.height as u32,
        format,
    })
}

/// BT.601 YUYV (4:2:2) to packed RGB24.
pub fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(yuyv.len() / 2 * 3);

    // [Y0, U, Y1, V] encodes two pixels sharing chroma
    for chunk in yuyv.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            out.push((y - 0.344_136 * u - 0.714_136 * v).clamp(0.0, 255.0) as u8);
            out.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_yields_gray() {
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128]);
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn short_yuyv_buffer_is_a_decode_error() {
        let err = decode_frame(&[0u8; 6], CaptureFormat::Yuyv, 2, 2).err().unwrap();
        assert!(matches!(err, CaptureError::Decode { format: "YUYV", .. }));
    }

    #[test]
    fn garbage_jpeg_is_a_decode_error() {
        assert!(decode_frame(&[0u8, 1, 2, 3], CaptureFormat::Mjpeg, 2, 2).is_err());
    }

    #[test]
    fn jpeg_round_trips_through_image_encoder() {
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([200, 40, 40]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 95)
            .encode(img.as_raw(), 8, 4, image::ExtendedColorType::Rgb8)
            .unwrap();

        let decoded = decode_frame(&jpeg, CaptureFormat::Mjpeg, 8, 4).unwrap();
        assert_eq!((decoded.width, decoded.height), (8, 4));
        assert_eq!(decoded.format, PixelFormat::Rgb24);
        assert_eq!(decoded.pixels.len(), 8 * 4 * 3);
    }
}
