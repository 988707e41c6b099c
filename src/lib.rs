//! # MadZine: Rhythm, Voice and Effect Modules for Modular Hosts
//!
//! `madzine` is a collection of sample-accurate modules for a modular
//! synthesis host: Euclidean rhythm generators with clock division and
//! chained sequencing, an analog-model ping filter, a kick/hat drum voice,
//! an eight-speaker cube panner, polyphonic chaos effects (granular, reverb,
//! delay) and a four-channel display capture.
//!
//! ## Architecture
//!
//! - **Primitives** - edge detectors, Euclidean patterns, clocks, envelopes,
//!   filters, noise, the filter-cell engine and effect cores. Plain structs
//!   with `process` methods, usable on their own.
//! - **Port System** - the host boundary: port and parameter definitions,
//!   polyphonic port values and the object-safe [`GraphModule`] trait.
//! - **Modules** - host-facing modules built from the primitives, one per
//!   panel.
//!
//! The host calls [`GraphModule::tick`] once per audio frame. Nothing in that
//! path allocates, locks or returns an error: out-of-range values are
//! clamped and non-finite outputs are scrubbed to 0 V at the jacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use madzine::prelude::*;
//!
//! let mut rhythm = EuclideanRhythm::new(48000.0);
//! let mut inputs = PortValues::new();
//! let mut outputs = PortValues::new();
//!
//! inputs.set(EuclideanRhythm::CLOCK_INPUT, 10.0);
//! rhythm.tick(&inputs, &mut outputs);
//!
//! // first track's gate
//! let gate = outputs.get_or(EuclideanRhythm::GATE_OUTPUT, 0.0);
//! ```

pub mod analog;
pub mod clock;
pub mod effects;
pub mod envelope;
pub mod error;
pub mod euclid;
pub mod filter;
pub mod modules;
pub mod panner;
pub mod port;
pub mod rng;
pub mod scope;
pub mod sequencer;
pub mod serialize;
pub mod trigger;

/// Prelude module for convenient imports
pub mod prelude {
    // Port System
    pub use crate::port::{
        GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PolyFrame, PortDef, PortId,
        PortSpec, PortValues, SignalKind, MAX_POLY,
    };

    // Modules
    pub use crate::modules::{
        ChaosEffect, ClockSource, EffectControl, EuclideanRhythm, Facehugger, Maddy, Multiverse,
        Ovomorph, Pinpple, Pyramid, Runner, StereoCore, Twnc,
    };

    // Timing and Sequencing
    pub use crate::clock::{ClockDivMult, ClockPeriod, DivMult, IntervalClock, SwingClock};
    pub use crate::euclid::Pattern;
    pub use crate::sequencer::{ChainedSequence, KnobSequencer, SequenceMode, TrackState};
    pub use crate::trigger::{sanitize, PulseGenerator, RisingEdge, SchmittTrigger, SlewLimiter};

    // Envelopes and Filters
    pub use crate::envelope::{
        DecayShape, Envelope, EnvelopeStage, LatchedCurveEnvelope, SimpleLpg, UnifiedEnvelope,
    };
    pub use crate::filter::{AntiAliasFilter, Biquad, RcFilter, SosFilter, SweepFilter, SweepMode};

    // Analog Modeling
    pub use crate::analog::{noise, OversampledSineVco, RipplesBpfEngine};

    // Effects
    pub use crate::effects::{
        ChaosFrame, ChaosSource, DelayLine, GrainProcessor, ReverbProcessor, ReverbSide,
    };

    // Panning and Display
    pub use crate::panner::{cube_gains, Speaker, SPEAKERS};
    pub use crate::scope::{ChannelParams, DisplaySink, MixMode, ScopeChannel};

    // Persistence and Errors
    pub use crate::error::ModuleError;
    pub use crate::rng::Rng;
    pub use crate::serialize::{MaddyState, PanelState, StateBlob};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
