// Acquisition of a fixed-size ordered set of evidence photos from an imaging
// device, with per-slot annotation and caption compositing at completion.
//
// Slot mutations are serialized by user action; the session does not guard
// against interleaved capture/annotate calls, that gating belongs to the
// surface driving it.

use crate::annotation::{AnnotationBake, AnnotationEditor, AnnotationMap};
use crate::error::{ErrorCode, LabError};
use crate::render_caption::{CaptionContext, bake_caption_jpeg};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Raster = image::RgbaImage;

/// Fixed number of photo slots per checkpoint day.
pub const PHOTO_SLOT_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub facing: Option<CameraFacing>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl CaptureConstraints {
    /// First attempt: the back camera at a useful resolution.
    pub fn preferred() -> Self {
        Self {
            facing: Some(CameraFacing::Back),
            ideal_width: Some(1280),
            ideal_height: Some(720),
        }
    }

    /// Retry attempt: any camera, no resolution hint.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFailure {
    PermissionDenied,
    NoHardware,
    Other(String),
}

impl fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFailure::PermissionDenied => write!(f, "camera permission denied"),
            DeviceFailure::NoHardware => write!(f, "no camera hardware available"),
            DeviceFailure::Other(msg) => write!(f, "camera unavailable: {msg}"),
        }
    }
}

/// Imaging device contract: one raster per acquisition.
pub trait CaptureDevice {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<Raster, DeviceFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// Terminal: both acquisition attempts failed. Only cancellation is left.
    Unavailable { reason: DeviceFailure },
}

/// Everything `complete()` hands back: caption-baked JPEG photos of the kept
/// slots in order, plus the annotation map keyed by position in that list.
#[derive(Debug, Clone)]
pub struct CompletedCapture {
    pub photos: Vec<Vec<u8>>,
    pub annotations: AnnotationMap,
}

pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    context: CaptionContext,
    slots: Vec<Option<Raster>>,
    annotations: BTreeMap<usize, Vec<crate::annotation::Annotation>>,
    cursor: usize,
    state: SessionState,
}

fn device_error(reason: &DeviceFailure) -> LabError {
    LabError {
        code: ErrorCode::Device,
        message: reason.to_string(),
    }
}

/// Keep the most actionable reason for the user message.
fn dominant_reason(first: DeviceFailure, second: DeviceFailure) -> DeviceFailure {
    for candidate in [&first, &second] {
        if *candidate == DeviceFailure::PermissionDenied {
            return DeviceFailure::PermissionDenied;
        }
    }
    for candidate in [&first, &second] {
        if *candidate == DeviceFailure::NoHardware {
            return DeviceFailure::NoHardware;
        }
    }
    second
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(device: D, context: CaptionContext) -> Self {
        Self {
            device,
            context,
            slots: (0..PHOTO_SLOT_COUNT).map(|_| None).collect(),
            annotations: BTreeMap::new(),
            cursor: 0,
            state: SessionState::Ready,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn slot_filled(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.is_some())
    }

    pub fn captured_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn check_slot(&self, slot: usize) -> Result<(), LabError> {
        if slot >= PHOTO_SLOT_COUNT {
            return Err(LabError::invalid_input(format!(
                "slot {slot} out of range (0..{PHOTO_SLOT_COUNT})"
            )));
        }
        Ok(())
    }

    /// Acquire one raster into `slot`, leaving the other slots untouched.
    ///
    /// The device is asked with preferred constraints first and retried once
    /// with minimal ones; a second failure puts the session into a terminal
    /// non-capturing state. Filling a slot advances the cursor unless it was
    /// the last one; the caller decides what happens after that.
    pub fn capture(&mut self, slot: usize) -> Result<(), LabError> {
        self.check_slot(slot)?;
        if let SessionState::Unavailable { reason } = &self.state {
            return Err(device_error(reason));
        }

        let raster = match self.device.acquire(&CaptureConstraints::preferred()) {
            Ok(raster) => raster,
            Err(first) => match self.device.acquire(&CaptureConstraints::minimal()) {
                Ok(raster) => raster,
                Err(second) => {
                    let reason = dominant_reason(first, second);
                    self.state = SessionState::Unavailable {
                        reason: reason.clone(),
                    };
                    return Err(device_error(&reason));
                }
            },
        };

        self.slots[slot] = Some(raster);
        // A fresh capture invalidates any markers placed on the old raster.
        self.annotations.remove(&slot);

        let all_filled = self.captured_count() == PHOTO_SLOT_COUNT;
        if slot == self.cursor && self.cursor + 1 < PHOTO_SLOT_COUNT && !all_filled {
            self.cursor += 1;
        }
        Ok(())
    }

    /// Overwrite an already-filled slot.
    pub fn retake(&mut self, slot: usize) -> Result<(), LabError> {
        self.check_slot(slot)?;
        if !self.slot_filled(slot) {
            return Err(LabError::not_found(format!(
                "slot {slot} has no photo to retake"
            )));
        }
        self.cursor = slot;
        self.capture(slot)
    }

    /// Open an annotation editor on the slot's current raster.
    /// `displayed_width` is the width the raster is shown at while marking.
    pub fn begin_annotation(
        &self,
        slot: usize,
        displayed_width: f32,
    ) -> Result<AnnotationEditor, LabError> {
        self.check_slot(slot)?;
        let Some(raster) = self.slots[slot].as_ref() else {
            return Err(LabError::not_found(format!(
                "slot {slot} has no photo to annotate"
            )));
        };
        AnnotationEditor::new(raster.clone(), displayed_width)
    }

    /// Commit a saved annotation pass: the flattened raster replaces the
    /// slot's photo and the marker list is kept for the caption legend.
    /// Cancelling the editor is simply never calling this.
    pub fn apply_annotation(&mut self, slot: usize, bake: AnnotationBake) -> Result<(), LabError> {
        self.check_slot(slot)?;
        if !self.slot_filled(slot) {
            return Err(LabError::not_found(format!("slot {slot} is empty")));
        }
        self.slots[slot] = Some(bake.raster);
        if bake.annotations.is_empty() {
            self.annotations.remove(&slot);
        } else {
            self.annotations.insert(slot, bake.annotations);
        }
        Ok(())
    }

    /// Run the caption pipeline over every filled slot, in slot order, and
    /// return the encoded results plus the annotation map re-keyed by
    /// position in the returned list.
    pub fn complete(&self) -> Result<CompletedCapture, LabError> {
        let kept: Vec<(usize, &Raster)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|raster| (i, raster)))
            .collect();
        if kept.is_empty() {
            return Err(LabError::invalid_input(
                "no photos captured; capture at least one before completing",
            ));
        }

        let mut photos = Vec::with_capacity(kept.len());
        let mut annotations = AnnotationMap::new();
        for (position, (slot, raster)) in kept.into_iter().enumerate() {
            let markers = self
                .annotations
                .get(&slot)
                .map(|m| m.as_slice())
                .unwrap_or(&[]);
            let photo_number = (position + 1) as u32;
            photos.push(bake_caption_jpeg(
                raster,
                &self.context,
                photo_number,
                markers,
            )?);
            if !markers.is_empty() {
                annotations.insert(position as u32, markers.to_vec());
            }
        }
        Ok(CompletedCapture {
            photos,
            annotations,
        })
    }
}
