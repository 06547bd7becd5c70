// Final compositing step for evidence photos: a caption band appended
// beneath the raster carrying the test identity, checkpoint and, when
// markers were placed, a legend of their captions. Runs for every kept photo
// at capture completion, annotated or not.

use crate::annotation::Annotation;
use crate::error::LabError;
use crate::render_overlay::{encode_jpeg, rasterize_document};
use crate::test_record::Day;
use image::RgbaImage;
use svg::Document;
use svg::node::element::{Circle, Rectangle, Text};

pub const CAPTION_HEIGHT_RATIO: f32 = 0.3;
pub const CAPTION_MIN_HEIGHT: u32 = 200;
pub const CAPTION_MAX_HEIGHT: u32 = 300;
pub const CAPTION_JPEG_QUALITY: u8 = 90;

const PADDING: f32 = 20.0;
const LINE_FONT_PX: f32 = 28.0;
const LINE_STEP: f32 = 35.0;
const LEGEND_FONT_PX: f32 = 24.0;
const LEGEND_STEP: f32 = 30.0;
const LEGEND_BADGE_RADIUS: f32 = 12.0;
const LEGEND_BADGE_FONT_PX: f32 = 16.0;

/// Identity block rendered into every caption band.
#[derive(Debug, Clone)]
pub struct CaptionContext {
    pub experiment_number: u32,
    pub repetition_number: u32,
    pub test_number: u32,
    pub day: Day,
    pub strain: String,
    pub unit: Option<String>,
    pub test_lot: Option<String>,
}

/// Band height is proportional to the photo, clamped to a fixed range.
pub fn caption_band_height(image_height: u32) -> u32 {
    let proportional = (image_height as f32 * CAPTION_HEIGHT_RATIO) as u32;
    proportional.clamp(CAPTION_MIN_HEIGHT, CAPTION_MAX_HEIGHT)
}

fn unit_label(unit: &str) -> &'static str {
    if unit.eq_ignore_ascii_case("americana") {
        "Americana"
    } else {
        "Salto"
    }
}

/// The informational lines in their fixed order. `photo_number` is 1-based
/// within the day's kept set.
pub fn caption_lines(ctx: &CaptionContext, photo_number: u32) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Exp #{} - Rep #{} - Test #{}",
            ctx.experiment_number, ctx.repetition_number, ctx.test_number
        ),
        format!(
            "Day: {} - Strain: {} - Photo {}",
            ctx.day, ctx.strain, photo_number
        ),
    ];
    let mut parts: Vec<String> = Vec::new();
    if let Some(unit) = ctx.unit.as_deref().filter(|u| !u.trim().is_empty()) {
        parts.push(unit_label(unit).to_string());
    }
    if let Some(lot) = ctx.test_lot.as_deref().filter(|l| !l.trim().is_empty()) {
        parts.push(format!("Lot: {lot}"));
    }
    if !parts.is_empty() {
        lines.push(parts.join(" - "));
    }
    lines
}

fn caption_text(content: String, x: f32, y: f32, font_px: f32) -> Text {
    Text::new(content)
        .set("x", x)
        .set("y", y)
        .set("fill", "#FFFFFF")
        .set("font-family", "Arial, sans-serif")
        .set("font-weight", "bold")
        .set("font-size", font_px)
}

/// The caption band as an SVG document of `width` x `band_height`.
pub fn caption_document(
    ctx: &CaptionContext,
    markers: &[Annotation],
    photo_number: u32,
    width: u32,
    band_height: u32,
) -> Document {
    let mut doc = Document::new()
        .set("width", width)
        .set("height", band_height)
        .set("viewBox", (0, 0, width, band_height))
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", width)
                .set("height", band_height)
                .set("fill", "#000000"),
        );

    let mut y = 40.0;
    for line in caption_lines(ctx, photo_number) {
        doc = doc.add(caption_text(line, PADDING, y, LINE_FONT_PX));
        y += LINE_STEP;
    }

    let captioned: Vec<(usize, &Annotation)> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.caption.trim().is_empty())
        .collect();
    if !captioned.is_empty() {
        y += 10.0;
        doc = doc.add(caption_text("Annotations:".to_string(), PADDING, y, LINE_FONT_PX));
        y += LINE_STEP;

        for (index, marker) in captioned {
            doc = doc.add(
                Circle::new()
                    .set("cx", PADDING + 15.0)
                    .set("cy", y - 10.0)
                    .set("r", LEGEND_BADGE_RADIUS)
                    .set("fill", marker.color.as_str()),
            );
            doc = doc.add(
                Text::new(format!("{}", index + 1))
                    .set("x", PADDING + 15.0)
                    .set("y", y - 10.0)
                    .set("fill", "#FFFFFF")
                    .set("font-family", "Arial, sans-serif")
                    .set("font-weight", "bold")
                    .set("font-size", LEGEND_BADGE_FONT_PX)
                    .set("text-anchor", "middle")
                    .set("dominant-baseline", "central"),
            );
            doc = doc.add(caption_text(
                marker.caption.trim().to_string(),
                PADDING + 35.0,
                y,
                LEGEND_FONT_PX,
            ));
            y += LEGEND_STEP;
        }
    }
    doc
}

/// Append the caption band beneath the photo and return the new raster.
pub fn bake_caption(
    raster: &RgbaImage,
    ctx: &CaptionContext,
    photo_number: u32,
    markers: &[Annotation],
) -> Result<RgbaImage, LabError> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(LabError::invalid_input("bake_caption: empty raster"));
    }
    let band_height = caption_band_height(height);
    let doc = caption_document(ctx, markers, photo_number, width, band_height);
    let band = rasterize_document(&doc, width, band_height)?;

    let mut out = RgbaImage::from_pixel(width, height + band_height, image::Rgba([0, 0, 0, 255]));
    image::imageops::overlay(&mut out, raster, 0, 0);
    image::imageops::overlay(&mut out, &band, 0, height as i64);
    Ok(out)
}

/// Bake and encode in one go; this is what gets persisted.
pub fn bake_caption_jpeg(
    raster: &RgbaImage,
    ctx: &CaptionContext,
    photo_number: u32,
    markers: &[Annotation],
) -> Result<Vec<u8>, LabError> {
    let baked = bake_caption(raster, ctx, photo_number, markers)?;
    encode_jpeg(&baked, CAPTION_JPEG_QUALITY)
}
