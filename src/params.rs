use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::{
    chords::{discretize, ChordArchetype, ChordSpec, Key, Scale, CHORD_NUM_VOICES},
    pitch_shift::clamp_ratio,
    smoothing::ParamHandle,
};

/// Normalized host values keyed by `ParamIndex as u32`.
pub type ParamMap = HashMap<u32, f32>;

pub const PARAM_COUNT: usize = 10;

pub const MAX_TRANSPOSE_OCTAVES: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ParamIndex {
    Voices = 0,
    ChordType = 1,
    RootKey = 2,
    Scale = 3,
    MasterMix = 4,
    Voice1Volume = 5,
    Voice2Volume = 6,
    Voice3Volume = 7,
    Quality = 8,
    Transpose = 9,
}

impl ParamIndex {
    pub const ALL: [ParamIndex; PARAM_COUNT] = [
        ParamIndex::Voices,
        ParamIndex::ChordType,
        ParamIndex::RootKey,
        ParamIndex::Scale,
        ParamIndex::MasterMix,
        ParamIndex::Voice1Volume,
        ParamIndex::Voice2Volume,
        ParamIndex::Voice3Volume,
        ParamIndex::Quality,
        ParamIndex::Transpose,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamIndex::Voices => "Voices",
            ParamIndex::ChordType => "Chord",
            ParamIndex::RootKey => "Key",
            ParamIndex::Scale => "Scale",
            ParamIndex::MasterMix => "Mix",
            ParamIndex::Voice1Volume => "Voice 1",
            ParamIndex::Voice2Volume => "Voice 2",
            ParamIndex::Voice3Volume => "Voice 3",
            ParamIndex::Quality => "Quality",
            ParamIndex::Transpose => "Transpose",
        }
    }

    pub fn default_normalized(self) -> f32 {
        match self {
            ParamIndex::Voices => 1.0,
            ParamIndex::ChordType => ChordArchetype::MajorTriad.to_normalized(),
            ParamIndex::RootKey => Key::C.to_normalized(),
            ParamIndex::Scale => Scale::Chromatic.to_normalized(),
            ParamIndex::MasterMix => 0.5,
            ParamIndex::Voice1Volume => 1.0,
            ParamIndex::Voice2Volume | ParamIndex::Voice3Volume => 0.6,
            ParamIndex::Quality => 1.0,
            ParamIndex::Transpose => 0.5,
        }
    }
}

/// Decoded from one snapshot of normalized values.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub num_voices: usize,
    pub chord: ChordArchetype,
    pub key: Key,
    pub scale: Scale,
    pub octave_offset: i32,
    pub intervals: [i32; CHORD_NUM_VOICES],
    pub ratios: [f32; CHORD_NUM_VOICES],
    pub volumes: [f32; CHORD_NUM_VOICES],
    pub master_mix: f32,
    pub phase_locking: bool,
}

impl VoiceSettings {
    pub fn decode(normalized: &[f32; PARAM_COUNT]) -> Self {
        let value = |index: ParamIndex| {
            let x = normalized[index as usize];
            if x.is_finite() {
                x.clamp(0.0, 1.0)
            } else {
                index.default_normalized()
            }
        };

        let chord = ChordArchetype::from_normalized(value(ParamIndex::ChordType));
        let key = Key::from_normalized(value(ParamIndex::RootKey));
        let scale = Scale::from_normalized(value(ParamIndex::Scale));
        let octave_offset = discretize(
            value(ParamIndex::Transpose),
            (2 * MAX_TRANSPOSE_OCTAVES + 1) as usize,
        ) as i32
            - MAX_TRANSPOSE_OCTAVES;

        let spec = ChordSpec::resolve(chord, key, scale);
        let ratios = spec.ratios(octave_offset).map(clamp_ratio);

        Self {
            num_voices: 1 + discretize(value(ParamIndex::Voices), CHORD_NUM_VOICES),
            chord,
            key,
            scale,
            octave_offset,
            intervals: spec.intervals,
            ratios,
            volumes: [
                value(ParamIndex::Voice1Volume),
                value(ParamIndex::Voice2Volume),
                value(ParamIndex::Voice3Volume),
            ],
            master_mix: value(ParamIndex::MasterMix),
            phase_locking: value(ParamIndex::Quality) >= 0.5,
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::decode(&ParamIndex::ALL.map(ParamIndex::default_normalized))
    }
}

/// Selector fields shared with the audio thread, read once per block.
#[derive(Debug)]
pub(crate) struct ControlState {
    normalized: [AtomicF32; PARAM_COUNT],
    pub(crate) num_voices: AtomicUsize,
    pub(crate) phase_locking: AtomicBool,
}

impl ControlState {
    pub(crate) fn new() -> Self {
        let defaults = VoiceSettings::default();
        Self {
            normalized: ParamIndex::ALL.map(|p| AtomicF32::new(p.default_normalized())),
            num_voices: AtomicUsize::new(defaults.num_voices),
            phase_locking: AtomicBool::new(defaults.phase_locking),
        }
    }

    fn snapshot(&self) -> [f32; PARAM_COUNT] {
        let mut values = [0.0; PARAM_COUNT];
        for (v, a) in values.iter_mut().zip(self.normalized.iter()) {
            *v = a.load(Ordering::Relaxed);
        }
        values
    }
}

/// Control-thread handle to a harmonizer. Cheap to clone, `Send + Sync`, and
/// never blocks the audio thread.
#[derive(Debug, Clone)]
pub struct HarmonizerController {
    state: Arc<ControlState>,
    ratios: [ParamHandle; CHORD_NUM_VOICES],
    volumes: [ParamHandle; CHORD_NUM_VOICES],
    master_mix: ParamHandle,
    bypass_threshold: f32,
}

impl HarmonizerController {
    pub(crate) fn new(
        state: Arc<ControlState>,
        ratios: [ParamHandle; CHORD_NUM_VOICES],
        volumes: [ParamHandle; CHORD_NUM_VOICES],
        master_mix: ParamHandle,
        bypass_threshold: f32,
    ) -> Self {
        Self {
            state,
            ratios,
            volumes,
            master_mix,
            bypass_threshold,
        }
    }

    /// Applies a batch of normalized host values. Unknown indices and
    /// non-finite values are ignored.
    pub fn update_parameters(&self, params: &ParamMap) {
        for (&index, &value) in params {
            match ParamIndex::from_index(index) {
                Some(param) => self.store(param, value),
                None => log::debug!("ignoring unknown parameter index {}", index),
            }
        }
        self.apply();
    }

    /// Like [`update_parameters`](Self::update_parameters) without the map.
    /// Does not allocate, so it may be called from the audio thread.
    pub fn set_parameters(&self, params: &[(ParamIndex, f32)]) {
        for &(param, value) in params {
            self.store(param, value);
        }
        self.apply();
    }

    pub fn set_parameter(&self, param: ParamIndex, value: f32) {
        self.set_parameters(&[(param, value)]);
    }

    pub fn normalized(&self, param: ParamIndex) -> f32 {
        self.state.normalized[param as usize].load(Ordering::Relaxed)
    }

    /// Settings decoded from the current normalized values.
    pub fn settings(&self) -> VoiceSettings {
        VoiceSettings::decode(&self.state.snapshot())
    }

    fn store(&self, param: ParamIndex, value: f32) {
        if !value.is_finite() {
            log::debug!("ignoring non-finite value for {}", param.name());
            return;
        }
        self.state.normalized[param as usize].store(value.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    fn apply(&self) {
        // Decode fully before writing anything.
        let settings = self.settings();

        for (handle, &ratio) in self.ratios.iter().zip(settings.ratios.iter()) {
            handle.set(ratio);
        }
        for (handle, &volume) in self.volumes.iter().zip(settings.volumes.iter()) {
            handle.set(volume);
        }
        if settings.master_mix < self.bypass_threshold {
            self.master_mix.snap(0.0);
        } else {
            self.master_mix.set(settings.master_mix);
        }
        self.state
            .num_voices
            .store(settings.num_voices, Ordering::Relaxed);
        self.state
            .phase_locking
            .store(settings.phase_locking, Ordering::Relaxed);
    }
}
