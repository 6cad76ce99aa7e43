//! PNG decoding and Image XObject embedding
//!
//! Every PNG colour type and bit depth is normalised to 8 bits per
//! component. Colour samples go into a `FlateDecode` image stream; an alpha
//! channel, when present and not fully opaque, becomes a `DeviceGray` soft
//! mask referenced through `/SMask`.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::CoverError;

/// Raster data split into PDF colour samples and an optional alpha plane
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub samples: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// Decode PNG bytes into 8-bit colour samples plus an optional alpha plane
pub fn decode_png(bytes: &[u8]) -> Result<DecodedImage, CoverError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::normalize_to_color8());

    let mut reader = decoder
        .read_info()
        .map_err(|e| CoverError::ImageError(format!("Failed to read PNG header: {}", e)))?;

    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buffer)
        .map_err(|e| CoverError::ImageError(format!("Failed to decode PNG data: {}", e)))?;
    buffer.truncate(info.buffer_size());

    let (color_space, channels, has_alpha) = match info.color_type {
        png::ColorType::Rgb => ("DeviceRGB", 3, false),
        png::ColorType::Rgba => ("DeviceRGB", 4, true),
        png::ColorType::Grayscale => ("DeviceGray", 1, false),
        png::ColorType::GrayscaleAlpha => ("DeviceGray", 2, true),
        png::ColorType::Indexed => {
            return Err(CoverError::ImageError(
                "Indexed PNG was not expanded".into(),
            ))
        }
    };

    if !has_alpha {
        return Ok(DecodedImage {
            width: info.width,
            height: info.height,
            color_space,
            samples: buffer,
            alpha: None,
        });
    }

    let color_channels = channels - 1;
    let pixel_count = (info.width * info.height) as usize;
    let mut samples = Vec::with_capacity(pixel_count * color_channels);
    let mut alpha = Vec::with_capacity(pixel_count);

    for pixel in buffer.chunks_exact(channels) {
        samples.extend_from_slice(&pixel[..color_channels]);
        alpha.push(pixel[color_channels]);
    }

    // Fully opaque alpha carries no information
    let alpha = if alpha.iter().all(|&a| a == u8::MAX) {
        None
    } else {
        Some(alpha)
    };

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        color_space,
        samples,
        alpha,
    })
}

/// Decode a PNG and add it to `doc` as an Image XObject
///
/// Returns the object ID of the image stream.
pub fn embed_png(doc: &mut Document, png_bytes: &[u8]) -> Result<ObjectId, CoverError> {
    let image = decode_png(png_bytes)?;

    let smask_id = match &image.alpha {
        Some(alpha) => {
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            };
            let stream = Stream::new(dict, flate_encode(alpha)?);
            Some(doc.add_object(Object::Stream(stream)))
        }
        None => None,
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(id) = smask_id {
        dict.set("SMask", Object::Reference(id));
    }

    let stream = Stream::new(dict, flate_encode(&image.samples)?);
    Ok(doc.add_object(Object::Stream(stream)))
}

fn flate_encode(data: &[u8]) -> Result<Vec<u8>, CoverError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
