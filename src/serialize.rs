//! Serialization and Persistence
//!
//! Module state beyond knob values is saved as small JSON objects with the
//! host's camelCase keys. Loading merges: keys missing from the document keep
//! their current value, so older saves and partial documents load cleanly.

use crate::error::ModuleError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted state object that can be merged from a partial document
pub trait StateBlob: Serialize {
    /// The same fields, each optional
    type Patch: DeserializeOwned;

    fn apply(&mut self, patch: Self::Patch);

    fn to_json(&self) -> Result<Value, ModuleError> {
        Ok(serde_json::to_value(self)?)
    }

    fn merge_json(&mut self, value: &Value) -> Result<(), ModuleError> {
        if !value.is_object() {
            return Err(ModuleError::InvalidState(format!(
                "expected a JSON object, found {}",
                value
            )));
        }
        let patch = Self::Patch::deserialize(value)?;
        self.apply(patch);
        Ok(())
    }
}

/// Panel appearance shared by the effect modules and the drum voice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    /// -1 follows the host theme
    pub panel_theme: i32,
    pub panel_contrast: f64,
}

impl PanelState {
    pub const DEFAULT_CONTRAST: f64 = 255.0;
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            panel_theme: -1,
            panel_contrast: Self::DEFAULT_CONTRAST,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelStatePatch {
    panel_theme: Option<i32>,
    panel_contrast: Option<f64>,
}

impl StateBlob for PanelState {
    type Patch = PanelStatePatch;

    fn apply(&mut self, patch: PanelStatePatch) {
        if let Some(theme) = patch.panel_theme {
            self.panel_theme = theme;
        }
        if let Some(contrast) = patch.panel_contrast {
            self.panel_contrast = contrast;
        }
    }
}

/// Sequencer mode, clock source and the per-track settings that have no knob
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaddyState {
    pub mode_value: i32,
    pub clock_source_value: i32,
    /// Envelope attack per track in seconds
    pub attack_times: [f64; 3],
    /// Pattern rotation per track
    pub shifts: [i32; 3],
}

impl Default for MaddyState {
    fn default() -> Self {
        Self {
            mode_value: 1,
            clock_source_value: 0,
            attack_times: [0.006; 3],
            shifts: [0; 3],
        }
    }
}

/// Arrays may be shorter than three; trailing tracks keep their values
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaddyStatePatch {
    mode_value: Option<i32>,
    clock_source_value: Option<i32>,
    attack_times: Option<Vec<f64>>,
    shifts: Option<Vec<i32>>,
}

impl StateBlob for MaddyState {
    type Patch = MaddyStatePatch;

    fn apply(&mut self, patch: MaddyStatePatch) {
        if let Some(mode) = patch.mode_value {
            self.mode_value = mode;
        }
        if let Some(source) = patch.clock_source_value {
            self.clock_source_value = source;
        }
        if let Some(times) = patch.attack_times {
            for (slot, time) in self.attack_times.iter_mut().zip(times) {
                *slot = time;
            }
        }
        if let Some(shifts) = patch.shifts {
            for (slot, shift) in self.shifts.iter_mut().zip(shifts) {
                *slot = shift;
            }
        }
    }
}
