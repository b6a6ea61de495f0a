use wasm_bindgen::prelude::*;
use image::{DynamicImage, GenericImageView, ImageError, RgbaImage, imageops::FilterType};
use js_sys::{Array, Object, Reflect};
use tracing::debug;
#[cfg(not(target_arch = "wasm32"))]
use anyhow::{Context, Result};

pub mod cluster;
pub mod sampler;

pub use cluster::{ExtractedColor, SIMILARITY_THRESHOLD, cluster};
pub use sampler::{PixelSource, Sample, samples};

/// Extract the dominant colours of an in-memory pixel grid.
///
/// Every pixel is sampled once (row-major, alpha turned into a weight) and the
/// samples are merged into buckets of near-identical colours. The returned list
/// is sorted by descending weight; the weights add up to the summed alpha of the
/// image divided by 255.
///
/// Never fails: a zero-area grid simply yields an empty list.
pub fn extract_colors<P: PixelSource + ?Sized>(source: &P) -> Vec<ExtractedColor> {
    let (w, h) = (source.width(), source.height());
    let colors = cluster(samples(source));
    debug!(
        width = w,
        height = h,
        samples = w as u64 * h as u64,
        clusters = colors.len(),
        "extracted colors"
    );
    colors
}

// ------------------------------------------------------------
// Decoding helpers (everything that can fail happens here)
// ------------------------------------------------------------

/// Decode `input` and, when asked, shrink it so the longest side equals
/// `downscale` (nearest-neighbour, aspect ratio kept). Images already within the
/// limit are left untouched.
fn decode(input: &[u8], downscale: Option<u32>) -> Result<DynamicImage, ImageError> {
    let img = image::load_from_memory(input)?;
    Ok(match downscale {
        Some(scale) => shrink_to(img, scale),
        None => img,
    })
}

fn shrink_to(img: DynamicImage, scale: u32) -> DynamicImage {
    let (orig_w, orig_h) = img.dimensions();
    let max_side = orig_w.max(orig_h);
    if max_side <= scale {
        return img;
    }

    let ratio = scale as f32 / max_side as f32;
    let w = ((orig_w as f32) * ratio).round().max(1.0) as u32;
    let h = ((orig_h as f32) * ratio).round().max(1.0) as u32;
    debug!(orig_w, orig_h, w, h, "downscaling before extraction");
    DynamicImage::ImageRgba8(image::imageops::resize(&img, w, h, FilterType::Nearest))
}

fn colors_to_js(colors: &[ExtractedColor]) -> Result<Array, JsValue> {
    let out = Array::new();
    for c in colors {
        let entry = Object::new();
        Reflect::set(&entry, &JsValue::from_str("color"), &JsValue::from_str(&c.hex()))?;
        Reflect::set(&entry, &JsValue::from_str("weight"), &JsValue::from_f64(c.weight))?;
        out.push(&entry);
    }
    Ok(out)
}

/// Extract the dominant colours of an encoded image (PNG, JPEG, ...).
///
/// Returns an array of `{ color: "RRGGBB", weight: number }` objects, heaviest
/// first. `downscale` optionally caps the longest side before sampling, which
/// trades accuracy for speed on large images.
#[wasm_bindgen(js_name = extractColors)]
pub fn extract_colors_js(input: Vec<u8>, downscale: Option<u32>) -> Result<Array, JsValue> {
    let img = decode(&input, downscale)
        .map_err(|e| JsValue::from_str(&format!("Unable to decode image: {e}")))?;
    colors_to_js(&extract_colors(&img))
}

/// Same as `extractColors`, for raw RGBA8 pixels such as canvas `ImageData`.
#[wasm_bindgen(js_name = extractColorsRgba)]
pub fn extract_colors_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Array, JsValue> {
    let len = data.len();
    let mismatch = || {
        JsValue::from_str(&format!(
            "Pixel buffer of {len} bytes does not match {width}x{height} RGBA"
        ))
    };
    if len as u64 != width as u64 * height as u64 * 4 {
        return Err(mismatch());
    }
    let img = RgbaImage::from_raw(width, height, data).ok_or_else(mismatch)?;
    colors_to_js(&extract_colors(&img))
}

/// Decode an encoded image, optionally shrink it, and extract its dominant colours.
#[cfg(not(target_arch = "wasm32"))]
pub fn extract_colors_bytes(input: &[u8], downscale: Option<u32>) -> Result<Vec<ExtractedColor>> {
    let img = decode(input, downscale).context("unable to decode image")?;
    Ok(extract_colors(&img))
}
