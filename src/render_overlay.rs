// Bakes numbered circle markers into a full-resolution raster. The overlay
// is built as an SVG document and rasterized, then alpha-composited over the
// photo. Marker coordinates arrive in display space and are scaled back by
// originalWidth / displayedWidth.

use crate::annotation::Annotation;
use crate::error::LabError;
use image::RgbaImage;
use resvg::{tiny_skia, usvg};
use svg::Document;
use svg::node::element::{Circle, Text};

const MARKER_STROKE_WIDTH: f32 = 6.0;
const BADGE_OFFSET_FACTOR: f32 = 0.7;
const BADGE_MIN_FONT_PX: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerGeometry {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub stroke_width: f32,
    pub badge_cx: f32,
    pub badge_cy: f32,
    pub badge_radius: f32,
    pub badge_font_px: f32,
}

/// Full-resolution geometry of one marker for a given display scale factor.
pub fn scaled_marker_geometry(annotation: &Annotation, scale: f32) -> MarkerGeometry {
    let cx = annotation.x * scale;
    let cy = annotation.y * scale;
    let diameter = annotation.size.display_diameter() * scale;
    let radius = diameter / 2.0;
    let badge_font_px = (diameter / 4.0).max(BADGE_MIN_FONT_PX);
    MarkerGeometry {
        cx,
        cy,
        radius,
        stroke_width: MARKER_STROKE_WIDTH * scale,
        badge_cx: cx - radius * BADGE_OFFSET_FACTOR,
        badge_cy: cy - radius * BADGE_OFFSET_FACTOR,
        badge_radius: badge_font_px / 1.5,
        badge_font_px,
    }
}

/// Transparent overlay with one stroked circle plus an index badge per
/// marker, sized to the full-resolution raster.
pub fn marker_overlay_document(
    markers: &[Annotation],
    width: u32,
    height: u32,
    scale: f32,
) -> Document {
    let mut doc = Document::new()
        .set("width", width)
        .set("height", height)
        .set("viewBox", (0, 0, width, height));

    for (index, marker) in markers.iter().enumerate() {
        let geometry = scaled_marker_geometry(marker, scale);
        doc = doc.add(
            Circle::new()
                .set("cx", geometry.cx)
                .set("cy", geometry.cy)
                .set("r", geometry.radius)
                .set("fill", "none")
                .set("stroke", marker.color.as_str())
                .set("stroke-width", geometry.stroke_width),
        );
        doc = doc.add(
            Circle::new()
                .set("cx", geometry.badge_cx)
                .set("cy", geometry.badge_cy)
                .set("r", geometry.badge_radius)
                .set("fill", marker.color.as_str()),
        );
        doc = doc.add(
            Text::new(format!("{}", index + 1))
                .set("x", geometry.badge_cx)
                .set("y", geometry.badge_cy)
                .set("fill", "#FFFFFF")
                .set("font-family", "Arial, sans-serif")
                .set("font-weight", "bold")
                .set("font-size", geometry.badge_font_px)
                .set("text-anchor", "middle")
                .set("dominant-baseline", "central"),
        );
    }
    doc
}

/// Rasterize an SVG document onto a transparent pixmap of the given size.
pub fn rasterize_document(
    doc: &Document,
    width: u32,
    height: u32,
) -> Result<RgbaImage, LabError> {
    if width == 0 || height == 0 {
        return Err(LabError::invalid_input("cannot rasterize a zero-sized overlay"));
    }
    let svg_text = doc.to_string();
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(&svg_text, &options)
        .map_err(|e| LabError::internal(format!("overlay SVG did not parse: {e}")))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| LabError::internal("could not allocate overlay pixmap"))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    let mut raster = RgbaImage::new(width, height);
    for (i, pixel) in pixmap.pixels().iter().enumerate() {
        let color = pixel.demultiply();
        let x = i as u32 % width;
        let y = i as u32 / width;
        raster.put_pixel(
            x,
            y,
            image::Rgba([color.red(), color.green(), color.blue(), color.alpha()]),
        );
    }
    Ok(raster)
}

/// Bake markers into a copy of the raster. An empty marker list returns the
/// raster unchanged.
pub fn bake_markers(
    raster: &RgbaImage,
    markers: &[Annotation],
    displayed_width: f32,
) -> Result<RgbaImage, LabError> {
    if displayed_width <= 0.0 {
        return Err(LabError::invalid_input("bake_markers: displayed width must be positive"));
    }
    let mut out = raster.clone();
    if markers.is_empty() {
        return Ok(out);
    }
    let scale = raster.width() as f32 / displayed_width;
    let doc = marker_overlay_document(markers, raster.width(), raster.height(), scale);
    let overlay = rasterize_document(&doc, raster.width(), raster.height())?;
    image::imageops::overlay(&mut out, &overlay, 0, 0);
    Ok(out)
}

/// Decode an encoded photo (jpeg/png/webp) into an RGBA raster.
pub fn decode_raster(bytes: &[u8]) -> Result<RgbaImage, LabError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| LabError::invalid_input(format!("could not decode photo: {e}")))?;
    Ok(image.to_rgba8())
}

/// Encode a raster as JPEG. Alpha is dropped; evidence photos are opaque.
pub fn encode_jpeg(raster: &RgbaImage, quality: u8) -> Result<Vec<u8>, LabError> {
    let rgb = image::DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| LabError::internal(format!("JPEG encode failed: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::MarkerSize;

    fn marker(x: f32, y: f32) -> Annotation {
        Annotation {
            x,
            y,
            size: MarkerSize::Medium,
            caption: "colony".to_string(),
            color: "#FF0033".to_string(),
        }
    }

    #[test]
    fn test_geometry_is_scale_invariant() {
        let annotation = marker(100.0, 80.0);
        let base = scaled_marker_geometry(&annotation, 1.0);
        let doubled = scaled_marker_geometry(&annotation, 2.0);
        assert_eq!(doubled.cx, base.cx * 2.0);
        assert_eq!(doubled.cy, base.cy * 2.0);
        assert_eq!(doubled.radius, base.radius * 2.0);
        assert_eq!(doubled.stroke_width, base.stroke_width * 2.0);
    }

    #[test]
    fn test_badge_font_has_a_floor() {
        let mut annotation = marker(10.0, 10.0);
        annotation.size = MarkerSize::Small;
        // small marker at 1:1 scale: diameter 40 -> font would be 10, floored
        let geometry = scaled_marker_geometry(&annotation, 1.0);
        assert_eq!(geometry.badge_font_px, 16.0);
        // large marker: diameter 120 -> font 30
        annotation.size = MarkerSize::Large;
        let geometry = scaled_marker_geometry(&annotation, 1.0);
        assert_eq!(geometry.badge_font_px, 30.0);
    }

    #[test]
    fn test_bake_draws_the_stroke_in_marker_color() {
        let raster = RgbaImage::from_pixel(400, 300, image::Rgba([0, 0, 0, 255]));
        let annotation = marker(200.0, 150.0);
        let baked = bake_markers(&raster, &[annotation], 400.0).unwrap();

        // scale 1: circle of radius 40 centered at (200, 150); somewhere on
        // its horizontal midline there must be strongly red pixels.
        let row = 150;
        let red_hits = (0..400)
            .filter(|x| {
                let p = baked.get_pixel(*x, row);
                p.0[0] > 180 && p.0[1] < 90 && p.0[2] < 90
            })
            .count();
        assert!(red_hits > 0, "no red stroke pixels found on the midline");
    }

    #[test]
    fn test_bake_without_markers_is_identity() {
        let raster = RgbaImage::from_pixel(32, 32, image::Rgba([10, 20, 30, 255]));
        let baked = bake_markers(&raster, &[], 32.0).unwrap();
        assert_eq!(baked, raster);
    }

    #[test]
    fn test_jpeg_roundtrip_keeps_dimensions() {
        let raster = RgbaImage::from_pixel(64, 48, image::Rgba([200, 10, 10, 255]));
        let bytes = encode_jpeg(&raster, 90).unwrap();
        let decoded = decode_raster(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }
}
