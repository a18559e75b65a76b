//! Reading verification URLs back out of QR images.

use crate::error::ScanError;
use crate::verification::QrRaster;

/// Decode a PNG into an 8-bit greyscale raster.
pub fn decode_png(bytes: &[u8]) -> Result<QrRaster, ScanError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let data = &buf[..info.buffer_size()];

    let channels = match info.color_type {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb => 3,
        png::ColorType::Rgba => 4,
        other => {
            return Err(ScanError::Unsupported(format!("color type {:?}", other)));
        }
    };
    if info.bit_depth != png::BitDepth::Eight {
        return Err(ScanError::Unsupported(format!("bit depth {:?}", info.bit_depth)));
    }

    let pixels = data
        .chunks_exact(channels)
        .map(|px| match channels {
            1 | 2 => px[0],
            _ => ((u32::from(px[0]) * 299 + u32::from(px[1]) * 587 + u32::from(px[2]) * 114)
                / 1000) as u8,
        })
        .collect();

    Ok(QrRaster {
        width: info.width,
        height: info.height,
        pixels,
    })
}

/// Find the first QR code in `raster` and return its text.
pub fn scan_raster(raster: &QrRaster) -> Result<String, ScanError> {
    let width = raster.width as usize;
    let mut img = rqrr::PreparedImage::prepare_from_greyscale(
        width,
        raster.height as usize,
        |x, y| raster.pixels[y * width + x],
    );
    let grids = img.detect_grids();
    let grid = grids.first().ok_or(ScanError::NotFound)?;
    let (_meta, content) = grid
        .decode()
        .map_err(|e| ScanError::Decode(format!("{:?}", e)))?;
    Ok(content)
}

pub fn scan_png(bytes: &[u8]) -> Result<String, ScanError> {
    scan_raster(&decode_png(bytes)?)
}
