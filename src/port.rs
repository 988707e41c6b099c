//! Signal Conventions and Port System
//!
//! This module defines the signal types, port and parameter definitions, and the
//! type-erased interface a host drives once per audio frame. Ports carry
//! polyphonic voltage frames of up to [`MAX_POLY`] channels; a port missing
//! from a [`PortValues`] map is unpatched, which is distinct from a patched
//! cable sitting at 0 V.

use crate::error::ModuleError;
use serde::Serialize;
use std::collections::HashMap;

/// Port index, unique within one module
pub type PortId = u32;

/// Parameter index; equals its position in the module's [`ParamBank`]
pub type ParamId = u32;

/// Maximum number of channels a polyphonic cable can carry
pub const MAX_POLY: usize = 16;

/// What a cable carries, in the voltage conventions of a hardware rack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignalKind {
    /// AC audio around 0 V, ±5 V nominal
    Audio,

    /// Modulation centred on 0 V, ±5 V
    CvBipolar,

    /// Positive-only modulation, 0 to 10 V
    CvUnipolar,

    /// Pitch, one volt per octave
    VoltPerOctave,

    /// Gate signal: 0V low, 10V high while the event lasts
    Gate,

    /// Short 10 V pulse marking an instant
    Trigger,

    /// Periodic pulses at the tempo
    Clock,
}

impl SignalKind {
    /// Nominal (low, high) voltage for this kind of cable
    pub fn voltage_range(&self) -> (f64, f64) {
        match self {
            SignalKind::Audio => (-5.0, 5.0),
            SignalKind::CvBipolar => (-5.0, 5.0),
            SignalKind::CvUnipolar => (0.0, 10.0),
            SignalKind::VoltPerOctave => (-5.0, 5.0),
            SignalKind::Gate | SignalKind::Trigger | SignalKind::Clock => (0.0, 10.0),
        }
    }
}

/// One jack on the panel
#[derive(Debug, Clone, Serialize)]
pub struct PortDef {
    /// Index within the module
    pub id: PortId,

    /// Snake-case label such as `clock` or `length_cv`
    pub name: String,

    /// Expected voltage convention
    pub kind: SignalKind,

    /// Whether the port reads or writes more than one channel
    pub polyphonic: bool,

    /// For inputs: another input that feeds this one when unpatched
    pub normalled_to: Option<PortId>,

    /// Parameter that scales this CV input, if any
    pub attenuator: Option<ParamId>,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            polyphonic: false,
            normalled_to: None,
            attenuator: None,
        }
    }

    pub fn polyphonic(mut self) -> Self {
        self.polyphonic = true;
        self
    }

    pub fn with_attenuator(mut self, param: ParamId) -> Self {
        self.attenuator = Some(param);
        self
    }

    pub fn normalled_to(mut self, port: PortId) -> Self {
        self.normalled_to = Some(port);
        self
    }
}

/// Every jack a module exposes, inputs and outputs separately
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// One polyphonic cable frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyFrame {
    channels: usize,
    voltages: [f64; MAX_POLY],
}

impl PolyFrame {
    pub fn mono(value: f64) -> Self {
        let mut voltages = [0.0; MAX_POLY];
        voltages[0] = value;
        Self {
            channels: 1,
            voltages,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.voltages[..self.channels]
    }
}

/// Per-frame voltages keyed by port
///
/// Entries are created once per port and overwritten in place afterwards, so
/// a host that reuses the same container per frame does not allocate.
#[derive(Debug, Clone, Default)]
pub struct PortValues {
    pub values: HashMap<PortId, PolyFrame>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel 0 of a patched port
    pub fn get(&self, id: PortId) -> Option<f64> {
        self.values.get(&id).map(|frame| frame.voltages[0])
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.get(id).unwrap_or(default)
    }

    /// Voltage on `channel`; channels past the cable's width read 0V.
    pub fn voltage(&self, id: PortId, channel: usize) -> f64 {
        match self.values.get(&id) {
            Some(frame) if channel < frame.channels => frame.voltages[channel],
            _ => 0.0,
        }
    }

    /// Poly-CV lookup: `channel` when the cable carries it, otherwise channel 0.
    /// `None` when the port is unpatched.
    pub fn poly_voltage(&self, id: PortId, channel: usize) -> Option<f64> {
        self.values.get(&id).map(|frame| {
            if channel < frame.channels {
                frame.voltages[channel]
            } else {
                frame.voltages[0]
            }
        })
    }

    /// Channel count of a patched port, 0 when unpatched
    pub fn channels(&self, id: PortId) -> usize {
        self.values.get(&id).map_or(0, |frame| frame.channels)
    }

    pub fn has(&self, id: PortId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn set(&mut self, id: PortId, value: f64) {
        self.values.insert(id, PolyFrame::mono(value));
    }

    pub fn set_poly(&mut self, id: PortId, voltages: &[f64]) {
        let frame = self.values.entry(id).or_insert(PolyFrame::mono(0.0));
        let count = voltages.len().min(MAX_POLY);
        frame.voltages[..count].copy_from_slice(&voltages[..count]);
        if count == 0 {
            frame.voltages[0] = 0.0;
        }
        frame.channels = count.max(1);
    }

    /// Set the channel count of an output before writing its channels
    pub fn set_channels(&mut self, id: PortId, channels: usize) {
        let frame = self.values.entry(id).or_insert(PolyFrame::mono(0.0));
        frame.channels = channels.clamp(1, MAX_POLY);
    }

    pub fn set_channel(&mut self, id: PortId, channel: usize, value: f64) {
        if channel >= MAX_POLY {
            return;
        }
        let frame = self.values.entry(id).or_insert(PolyFrame::mono(0.0));
        frame.voltages[channel] = value;
        if channel >= frame.channels {
            frame.channels = channel + 1;
        }
    }

    pub fn remove(&mut self, id: PortId) {
        self.values.remove(&id);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// How a parameter value is rendered for display
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ParamDisplay {
    /// Plain number followed by the unit
    Number,
    /// Signed div/mult knob: 2 shows "3x", -2 shows "1/3x"
    DivMult,
    /// Index into the fixed ratio table used by the drum voice
    RatioTable,
    /// Value is an exponent of two (frequency knobs stored in octaves)
    Exp2,
    /// Value selects one of a list of names
    Labels(&'static [&'static str]),
}

/// Range, default and display metadata for one knob or switch
#[derive(Debug, Clone, Serialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Round to the nearest integer when set
    pub snap: bool,
    pub unit: &'static str,
    pub display: ParamDisplay,
}

impl ParamDef {
    pub fn new(id: ParamId, name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self {
            id,
            name: name.into(),
            min,
            max,
            default,
            snap: false,
            unit: "",
            display: ParamDisplay::Number,
        }
    }

    pub fn snapped(mut self) -> Self {
        self.snap = true;
        self
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_display(mut self, display: ParamDisplay) -> Self {
        self.display = display;
        self
    }

    /// Clamp into range, snapping when required. Non-finite input falls back
    /// to the default.
    pub fn constrain(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        let value = value.clamp(self.min, self.max);
        if self.snap {
            value.round()
        } else {
            value
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        match self.display {
            ParamDisplay::Number => format!("{:.2}{}", value, self.unit),
            ParamDisplay::DivMult => crate::clock::DivMult::from_knob(value.round() as i32).label(),
            ParamDisplay::RatioTable => {
                crate::clock::DivMult::from_ratio_index(value.round() as i32).label()
            }
            ParamDisplay::Exp2 => format!("{:.1}{}", libm::exp2(value), self.unit),
            ParamDisplay::Labels(names) => {
                if names.is_empty() {
                    return String::new();
                }
                let index = (value.round().max(0.0) as usize).min(names.len() - 1);
                names[index].to_string()
            }
        }
    }
}

/// Current values for a module's parameters
///
/// Parameter ids must equal their position in the definition list.
#[derive(Debug, Clone)]
pub struct ParamBank {
    defs: Vec<ParamDef>,
    values: Vec<f64>,
}

impl ParamBank {
    pub fn new(defs: Vec<ParamDef>) -> Self {
        debug_assert!(defs.iter().enumerate().all(|(i, d)| d.id as usize == i));
        let values = defs.iter().map(|d| d.default).collect();
        Self { defs, values }
    }

    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    /// Value of a known parameter; unknown ids read 0.
    #[inline]
    pub fn get(&self, id: ParamId) -> f64 {
        self.values.get(id as usize).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn get_int(&self, id: ParamId) -> i32 {
        self.get(id).round() as i32
    }

    pub fn value(&self, id: ParamId) -> Option<f64> {
        self.values.get(id as usize).copied()
    }

    pub fn set(&mut self, id: ParamId, value: f64) -> Result<(), ModuleError> {
        let def = self
            .defs
            .get(id as usize)
            .ok_or(ModuleError::UnknownParam(id))?;
        self.values[id as usize] = def.constrain(value);
        Ok(())
    }

    pub fn restore_defaults(&mut self) {
        for (value, def) in self.values.iter_mut().zip(&self.defs) {
            *value = def.default;
        }
    }
}

/// Object-safe interface the host drives once per audio frame
pub trait GraphModule: Send + Sync {
    /// Jacks this module exposes
    fn port_spec(&self) -> &PortSpec;

    /// Process one audio frame
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Process one frame while the host has the module bypassed
    fn bypass(&mut self, _inputs: &PortValues, _outputs: &mut PortValues) {}

    /// Reset all transient state, keeping parameters and configuration
    fn reset(&mut self);

    /// Change the sample rate; transient state starts over
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Knob and switch definitions, indexed by id
    fn params(&self) -> &[ParamDef] {
        &[]
    }

    /// Current value of a parameter, `None` for unknown ids
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Store a parameter, clamped into its range
    fn set_param(&mut self, id: ParamId, _value: f64) -> Result<(), ModuleError> {
        Err(ModuleError::UnknownParam(id))
    }

    /// Stable name stored alongside saved state
    fn type_id(&self) -> &'static str;

    /// Serialize module state beyond its parameters
    fn serialize_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore state produced by [`GraphModule::serialize_state`]
    fn deserialize_state(&mut self, _state: &serde_json::Value) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_kinds_share_unipolar_range() {
        for kind in [SignalKind::Gate, SignalKind::Trigger, SignalKind::Clock] {
            assert_eq!(kind.voltage_range(), SignalKind::CvUnipolar.voltage_range());
        }
        let (low, high) = SignalKind::Audio.voltage_range();
        assert_eq!(low, -high);
    }

    #[test]
    fn test_mono_set_then_read() {
        let mut pv = PortValues::new();
        pv.set(4, 2.5);
        assert_eq!(pv.get(4), Some(2.5));
        assert_eq!(pv.channels(4), 1);
        assert!(pv.get(5).is_none());
        assert_eq!(pv.get_or(5, -1.0), -1.0);
        assert_eq!(pv.channels(5), 0);

        pv.set(4, -3.0);
        assert_eq!(pv.voltage(4, 0), -3.0);
    }

    #[test]
    fn test_unpatched_is_not_zero() {
        let mut pv = PortValues::new();
        assert_eq!(pv.poly_voltage(3, 0), None);
        pv.set(3, 0.0);
        assert_eq!(pv.poly_voltage(3, 0), Some(0.0));
    }

    #[test]
    fn test_poly_voltage_falls_back_to_first_channel() {
        let mut pv = PortValues::new();
        pv.set_poly(0, &[1.0, 2.0, 3.0]);
        assert_eq!(pv.channels(0), 3);
        assert_eq!(pv.poly_voltage(0, 2), Some(3.0));
        assert_eq!(pv.poly_voltage(0, 7), Some(1.0));
        assert_eq!(pv.voltage(0, 7), 0.0);
    }

    #[test]
    fn test_set_channel_grows_channel_count() {
        let mut pv = PortValues::new();
        pv.set_channels(10, 2);
        pv.set_channel(10, 0, 1.0);
        pv.set_channel(10, 1, -1.0);
        assert_eq!(pv.channels(10), 2);
        pv.set_channel(10, 4, 0.5);
        assert_eq!(pv.channels(10), 5);
        pv.set_channel(10, MAX_POLY, 9.0);
        assert_eq!(pv.channels(10), 5);
    }

    #[test]
    fn test_set_poly_clamps_to_max_poly() {
        let mut pv = PortValues::new();
        let many = [0.5; 20];
        pv.set_poly(0, &many);
        assert_eq!(pv.channels(0), MAX_POLY);
        pv.set_poly(0, &[]);
        assert_eq!(pv.channels(0), 1);
        assert_eq!(pv.get(0), Some(0.0));
    }

    #[test]
    fn test_jack_lookup_by_name_and_id() {
        let spec = PortSpec {
            inputs: vec![
                PortDef::new(0, "clock", SignalKind::Clock),
                PortDef::new(1, "fill_cv", SignalKind::CvBipolar).with_attenuator(3),
            ],
            outputs: vec![
                PortDef::new(10, "gate", SignalKind::Gate),
                PortDef::new(11, "out", SignalKind::Audio).polyphonic(),
            ],
        };

        assert_eq!(spec.input_by_name("clock").map(|p| p.id), Some(0));
        assert!(spec.output_by_name("clock").is_none());
        assert_eq!(spec.input_by_id(1).and_then(|p| p.attenuator), Some(3));
        assert!(spec.output_by_id(11).map_or(false, |p| p.polyphonic));
        assert!(spec.output_by_id(99).is_none());
    }

    #[test]
    fn test_param_constrain_snaps_and_clamps() {
        let def = ParamDef::new(0, "length", 1.0, 32.0, 16.0).snapped();
        assert_eq!(def.constrain(40.0), 32.0);
        assert_eq!(def.constrain(4.6), 5.0);
        assert_eq!(def.constrain(f64::NAN), 16.0);
    }

    #[test]
    fn test_param_display_formats() {
        let divmult = ParamDef::new(0, "div", -3.0, 3.0, 0.0).with_display(ParamDisplay::DivMult);
        assert_eq!(divmult.format_value(1.0), "2x");
        assert_eq!(divmult.format_value(-2.0), "1/3x");
        assert_eq!(divmult.format_value(0.0), "1x");

        let ratio = ParamDef::new(1, "ratio", 0.0, 4.0, 1.0).with_display(ParamDisplay::RatioTable);
        assert_eq!(ratio.format_value(2.0), "1.5x");

        let modes = ParamDef::new(2, "mode", 0.0, 1.0, 0.0)
            .with_display(ParamDisplay::Labels(&["Add", "Screen"]));
        assert_eq!(modes.format_value(5.0), "Screen");
    }

    #[test]
    fn test_param_bank() {
        let mut bank = ParamBank::new(vec![
            ParamDef::new(0, "a", 0.0, 1.0, 0.5),
            ParamDef::new(1, "b", -3.0, 3.0, 0.0).snapped(),
        ]);
        assert_eq!(bank.get(0), 0.5);
        bank.set(1, 2.4).unwrap();
        assert_eq!(bank.get_int(1), 2);
        assert!(matches!(bank.set(7, 1.0), Err(ModuleError::UnknownParam(7))));
        bank.restore_defaults();
        assert_eq!(bank.get(1), 0.0);
    }
}
