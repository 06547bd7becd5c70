// Numbered circular markers placed on evidence photos, plus the interactive
// editor that collects them before they are baked into the raster.

use crate::error::LabError;
use crate::render_overlay;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker colors, cycled by insertion order at annotation time.
pub const FLUORESCENT_PALETTE: [&str; 10] = [
    "#FF0033", // red
    "#00FF33", // green
    "#3300FF", // blue
    "#FF33FF", // magenta
    "#FFFF00", // yellow
    "#00FFFF", // cyan
    "#FF6600", // orange
    "#CC00FF", // violet
    "#FF0099", // pink
    "#66FF00", // lime
];

pub fn palette_color(insertion_index: usize) -> &'static str {
    FLUORESCENT_PALETTE[insertion_index % FLUORESCENT_PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSize {
    Small,
    Medium,
    Large,
}

impl MarkerSize {
    /// Circle diameter in display pixels at annotation time.
    pub fn display_diameter(self) -> f32 {
        match self {
            MarkerSize::Small => 40.0,
            MarkerSize::Medium => 80.0,
            MarkerSize::Large => 120.0,
        }
    }
}

/// A single marker. Coordinates are in the display coordinate space of the
/// image at annotation time; scaling back to full resolution happens at bake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub x: f32,
    pub y: f32,
    pub size: MarkerSize,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub color: String,
}

/// Photo index (0-based position in a day's photo list) to its markers.
pub type AnnotationMap = BTreeMap<u32, Vec<Annotation>>;

/// Stored annotation payloads come in two historical shapes: the current
/// per-photo-index map and a legacy bare list that predates multi-photo
/// annotation. Normalization happens once, here, at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationsPayload {
    ByPhotoIndex(BTreeMap<String, Vec<Annotation>>),
    LegacyFlat(Vec<Annotation>),
}

impl AnnotationsPayload {
    /// Legacy flat lists are attributed to photo index 0. Non-numeric map
    /// keys are dropped. Markers without a color get one from the palette by
    /// their position in the list.
    pub fn normalize(self) -> AnnotationMap {
        let mut out = AnnotationMap::new();
        match self {
            AnnotationsPayload::LegacyFlat(list) => {
                if !list.is_empty() {
                    out.insert(0, fill_missing_colors(list));
                }
            }
            AnnotationsPayload::ByPhotoIndex(map) => {
                for (key, list) in map {
                    let Ok(index) = key.trim().parse::<u32>() else {
                        continue;
                    };
                    if !list.is_empty() {
                        out.insert(index, fill_missing_colors(list));
                    }
                }
            }
        }
        out
    }
}

/// Field deserializer for stored annotation columns: accepts null, the
/// current map shape or the legacy flat list, and normalizes right here so
/// nothing downstream ever sees the legacy shape.
pub fn deserialize_annotation_map<'de, D>(deserializer: D) -> Result<AnnotationMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let payload = Option::<AnnotationsPayload>::deserialize(deserializer)?;
    Ok(payload.map(AnnotationsPayload::normalize).unwrap_or_default())
}

fn fill_missing_colors(mut list: Vec<Annotation>) -> Vec<Annotation> {
    for (i, annotation) in list.iter_mut().enumerate() {
        if annotation.color.trim().is_empty() {
            annotation.color = palette_color(i).to_string();
        }
    }
    list
}

/// Result of saving an annotation pass: the flattened raster for display and
/// the structured marker list, which stays the source of truth.
#[derive(Debug, Clone)]
pub struct AnnotationBake {
    pub raster: RgbaImage,
    pub annotations: Vec<Annotation>,
}

/// Interactive marker placement on one captured raster.
///
/// The caller drives it: `add_marker` on click (which opens caption input for
/// the new marker), `commit_caption` to close it, `undo` to drop the last
/// marker, `save` to bake. Cancelling is dropping the editor.
#[derive(Debug)]
pub struct AnnotationEditor {
    raster: RgbaImage,
    displayed_width: f32,
    current_size: MarkerSize,
    markers: Vec<Annotation>,
    caption_input: Option<usize>,
}

impl AnnotationEditor {
    pub fn new(raster: RgbaImage, displayed_width: f32) -> Result<Self, LabError> {
        if displayed_width <= 0.0 {
            return Err(LabError::invalid_input(
                "annotation editor needs a positive displayed width",
            ));
        }
        Ok(Self {
            raster,
            displayed_width,
            current_size: MarkerSize::Medium,
            markers: Vec::new(),
            caption_input: None,
        })
    }

    pub fn set_marker_size(&mut self, size: MarkerSize) {
        self.current_size = size;
    }

    pub fn markers(&self) -> &[Annotation] {
        &self.markers
    }

    /// Index of the marker currently awaiting a caption, if any.
    pub fn caption_input(&self) -> Option<usize> {
        self.caption_input
    }

    /// Append a marker at display coordinates and open caption input for it.
    pub fn add_marker(&mut self, x: f32, y: f32) -> usize {
        let color = palette_color(self.markers.len()).to_string();
        self.markers.push(Annotation {
            x,
            y,
            size: self.current_size,
            caption: String::new(),
            color,
        });
        let index = self.markers.len() - 1;
        self.caption_input = Some(index);
        index
    }

    /// Re-open caption input for an existing marker.
    pub fn edit_caption(&mut self, index: usize) -> Result<(), LabError> {
        if index >= self.markers.len() {
            return Err(LabError::not_found(format!("no marker #{}", index + 1)));
        }
        self.caption_input = Some(index);
        Ok(())
    }

    /// Commit the caption explicitly. Blank input leaves the marker's caption
    /// untouched; either way the input closes.
    pub fn commit_caption(&mut self, text: &str) {
        if let Some(index) = self.caption_input {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                self.markers[index].caption = trimmed.to_string();
            }
        }
        self.caption_input = None;
    }

    pub fn close_caption_input(&mut self) {
        self.caption_input = None;
    }

    /// Remove the last marker only.
    pub fn undo(&mut self) {
        if self.markers.pop().is_some() {
            self.caption_input = None;
        }
    }

    /// Bake the markers into a full-resolution copy of the raster and return
    /// it together with the untouched marker list.
    pub fn save(&self) -> Result<AnnotationBake, LabError> {
        let raster =
            render_overlay::bake_markers(&self.raster, &self.markers, self.displayed_width)?;
        Ok(AnnotationBake {
            raster,
            annotations: self.markers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_raster() -> RgbaImage {
        RgbaImage::from_pixel(320, 240, image::Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn test_palette_cycles_by_insertion_order() {
        let mut editor = AnnotationEditor::new(blank_raster(), 320.0).unwrap();
        for i in 0..12 {
            editor.add_marker(10.0 + i as f32, 20.0);
            editor.commit_caption(&format!("spot {i}"));
        }
        let markers = editor.markers();
        assert_eq!(markers[0].color, FLUORESCENT_PALETTE[0]);
        assert_eq!(markers[9].color, FLUORESCENT_PALETTE[9]);
        assert_eq!(markers[10].color, FLUORESCENT_PALETTE[0]);
        assert_eq!(markers[11].color, FLUORESCENT_PALETTE[1]);
    }

    #[test]
    fn test_caption_commit_is_explicit_and_blank_is_ignored() {
        let mut editor = AnnotationEditor::new(blank_raster(), 320.0).unwrap();
        editor.add_marker(5.0, 5.0);
        assert_eq!(editor.caption_input(), Some(0));
        editor.commit_caption("  mold colony  ");
        assert_eq!(editor.caption_input(), None);
        assert_eq!(editor.markers()[0].caption, "mold colony");

        editor.edit_caption(0).unwrap();
        editor.commit_caption("   ");
        assert_eq!(editor.markers()[0].caption, "mold colony");
    }

    #[test]
    fn test_undo_removes_last_marker_only() {
        let mut editor = AnnotationEditor::new(blank_raster(), 320.0).unwrap();
        editor.add_marker(1.0, 1.0);
        editor.commit_caption("first");
        editor.add_marker(2.0, 2.0);
        editor.commit_caption("second");
        editor.undo();
        assert_eq!(editor.markers().len(), 1);
        assert_eq!(editor.markers()[0].caption, "first");
        editor.undo();
        assert!(editor.markers().is_empty());
        editor.undo();
        assert!(editor.markers().is_empty());
    }

    #[test]
    fn test_legacy_flat_payload_normalizes_to_photo_zero() {
        let json = r#"[{ "x": 10.0, "y": 12.0, "size": "medium", "caption": "edge" }]"#;
        let payload: AnnotationsPayload = serde_json::from_str(json).unwrap();
        let map = payload.normalize();
        assert_eq!(map.len(), 1);
        let markers = &map[&0];
        assert_eq!(markers[0].caption, "edge");
        assert_eq!(markers[0].color, FLUORESCENT_PALETTE[0]);
    }

    #[test]
    fn test_map_payload_keeps_indices_and_drops_bad_keys() {
        let json = r##"{
            "0": [{ "x": 1.0, "y": 1.0, "size": "small", "caption": "a", "color": "#FF0033" }],
            "3": [{ "x": 2.0, "y": 2.0, "size": "large", "caption": "b", "color": "" }],
            "oops": [{ "x": 9.0, "y": 9.0, "size": "small", "caption": "zz" }]
        }"##;
        let payload: AnnotationsPayload = serde_json::from_str(json).unwrap();
        let map = payload.normalize();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(map[&3][0].color, FLUORESCENT_PALETTE[0]);
    }
}
