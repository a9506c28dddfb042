use std::time::SystemTime;

use anyhow::Context as _;
use image::ImageEncoder as _;

use crate::{
    capture::DirectionalImage,
    error::{PanotourError, PanotourResult},
};

/// Stitching policy for one panorama.
#[derive(Clone, Debug)]
pub struct StitchConfig {
    /// Headings expected, in left-to-right placement order.
    pub expected_headings: Vec<u32>,
    /// When a heading is missing, substitute a uniform gray tile instead of
    /// failing. Explicit opt-in; the default refuses incomplete captures.
    pub fill_missing: bool,
    /// JPEG quality for the stitched output, 1..=100.
    pub jpeg_quality: u8,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            expected_headings: vec![0, 90, 180, 270],
            fill_missing: false,
            jpeg_quality: 95,
        }
    }
}

/// One equirectangular frame of the tour (width = 2 × height by
/// construction), JPEG-encoded, bound to the route point it was captured at.
#[derive(Clone, Debug)]
pub struct Panorama {
    pub point_index: usize,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    pub captured_at: SystemTime,
}

const FILL_GRAY: image::Rgba<u8> = image::Rgba([128, 128, 128, 255]);

/// Composite directional captures into a single equirectangular JPEG.
///
/// Square tiles of equal size are laid out left to right in expected-heading
/// order on a canvas of width N×tile and height width/2, each tile vertically
/// centered.
///
/// The vertical centering is a deliberate approximation: true spherical
/// stitching would blend seams and compress toward the poles, which this
/// pipeline does not attempt. The output is geometrically correct enough for
/// equirectangular players along the horizon band and is documented as a
/// fidelity limitation.
pub fn stitch_panorama(
    images: &[DirectionalImage],
    cfg: &StitchConfig,
) -> PanotourResult<Panorama> {
    if cfg.expected_headings.len() < 2 {
        return Err(PanotourError::validation(
            "stitching requires at least 2 expected headings",
        ));
    }
    if cfg.jpeg_quality == 0 || cfg.jpeg_quality > 100 {
        return Err(PanotourError::validation(
            "jpeg quality must be in 1..=100",
        ));
    }
    if images.is_empty() {
        return Err(PanotourError::incomplete_capture(
            "no directional images supplied",
        ));
    }

    for img in images {
        if !cfg.expected_headings.contains(&img.heading) {
            return Err(PanotourError::validation(format!(
                "unexpected heading {} (expected one of {:?})",
                img.heading, cfg.expected_headings
            )));
        }
    }

    // Decode the supplied tiles and index them by heading.
    let mut tiles: Vec<(u32, image::RgbaImage)> = Vec::with_capacity(images.len());
    for img in images {
        if tiles.iter().any(|(h, _)| *h == img.heading) {
            return Err(PanotourError::validation(format!(
                "heading {} supplied more than once",
                img.heading
            )));
        }
        let decoded = image::load_from_memory(&img.bytes)
            .with_context(|| format!("decode directional image at heading {}", img.heading))?
            .to_rgba8();
        tiles.push((img.heading, decoded));
    }

    let tile_size = tiles[0].1.width();
    for (heading, tile) in &tiles {
        if tile.width() != tile.height() {
            return Err(PanotourError::validation(format!(
                "directional image at heading {heading} is {}x{}, captures must be square",
                tile.width(),
                tile.height()
            )));
        }
        if tile.width() != tile_size {
            return Err(PanotourError::validation(format!(
                "directional image at heading {heading} is {}px, others are {tile_size}px",
                tile.width()
            )));
        }
    }

    let missing: Vec<u32> = cfg
        .expected_headings
        .iter()
        .copied()
        .filter(|h| !tiles.iter().any(|(th, _)| th == h))
        .collect();
    if !missing.is_empty() && !cfg.fill_missing {
        return Err(PanotourError::incomplete_capture(format!(
            "missing headings {missing:?} (got {} of {})",
            tiles.len(),
            cfg.expected_headings.len()
        )));
    }

    let canvas_width = tile_size * cfg.expected_headings.len() as u32;
    let canvas_height = canvas_width / 2;
    let mut canvas = image::RgbaImage::new(canvas_width, canvas_height);
    let y = i64::from((canvas_height - tile_size.min(canvas_height)) / 2);

    let mut fill_tile: Option<image::RgbaImage> = None;
    for (i, heading) in cfg.expected_headings.iter().enumerate() {
        let tile = match tiles.iter().find(|(th, _)| th == heading) {
            Some((_, tile)) => tile,
            None => fill_tile
                .get_or_insert_with(|| image::RgbaImage::from_pixel(tile_size, tile_size, FILL_GRAY)),
        };
        image::imageops::replace(&mut canvas, tile, i as i64 * i64::from(tile_size), y);
    }

    let rgb = image::DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, cfg.jpeg_quality);
    encoder
        .write_image(
            rgb.as_raw(),
            canvas_width,
            canvas_height,
            image::ExtendedColorType::Rgb8,
        )
        .context("encode stitched panorama as jpeg")?;

    Ok(Panorama {
        point_index: images[0].point_index,
        width: canvas_width,
        height: canvas_height,
        jpeg,
        captured_at: images[0].captured_at,
    })
}
