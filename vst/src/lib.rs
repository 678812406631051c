use nih_plug::prelude::*;
use nih_plug_egui::{create_egui_editor, egui, widgets, EguiState};
use std::sync::Arc;
use voiche_harmonizer::{
    chords::{ChordArchetype, Scale},
    params::PARAM_COUNT,
    Engine, HarmonizerEngine, ParamIndex,
};

struct HarmonizerPlugin {
    params: Arc<HarmonizerParams>,
    engine: Option<HarmonizerEngine>,
    last_values: [f32; PARAM_COUNT],
}

#[derive(Params)]
struct HarmonizerParams {
    #[persist = "editor-state"]
    editor_state: Arc<EguiState>,

    #[id = "voices"]
    voices: IntParam,
    #[id = "chord"]
    chord: IntParam,
    #[id = "key"]
    key: IntParam,
    #[id = "scale"]
    scale: IntParam,
    #[id = "mix"]
    mix: FloatParam,
    #[id = "voice1"]
    voice1: FloatParam,
    #[id = "voice2"]
    voice2: FloatParam,
    #[id = "voice3"]
    voice3: FloatParam,
    #[id = "quality"]
    quality: BoolParam,
    #[id = "transpose"]
    transpose: IntParam,
}

impl HarmonizerParams {
    /// Normalized values in `ParamIndex` order.
    fn normalized(&self) -> [f32; PARAM_COUNT] {
        [
            self.voices.modulated_normalized_value(),
            self.chord.modulated_normalized_value(),
            self.key.modulated_normalized_value(),
            self.scale.modulated_normalized_value(),
            self.mix.modulated_normalized_value(),
            self.voice1.modulated_normalized_value(),
            self.voice2.modulated_normalized_value(),
            self.voice3.modulated_normalized_value(),
            self.quality.modulated_normalized_value(),
            self.transpose.modulated_normalized_value(),
        ]
    }
}

impl Default for HarmonizerPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(HarmonizerParams::default()),
            engine: None,
            last_values: [f32::NAN; PARAM_COUNT],
        }
    }
}

fn volume_param(name: &str, default: f32) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min: 0.0, max: 1.0 })
        .with_unit(" %")
        .with_value_to_string(formatters::v2s_f32_percentage(0))
        .with_string_to_value(formatters::s2v_f32_percentage())
}

impl Default for HarmonizerParams {
    fn default() -> Self {
        let chords = ChordArchetype::all();
        let scales = Scale::all();
        Self {
            editor_state: EguiState::from_size(320, 420),

            voices: IntParam::new("Voices", 3, IntRange::Linear { min: 1, max: 3 }),
            chord: IntParam::new(
                "Chord",
                3,
                IntRange::Linear {
                    min: 0,
                    max: chords.len() as i32 - 1,
                },
            )
            .with_value_to_string(Arc::new(move |i| {
                chords[i.clamp(0, chords.len() as i32 - 1) as usize]
                    .name()
                    .to_string()
            })),
            key: IntParam::new("Key", 0, IntRange::Linear { min: 0, max: 11 }).with_value_to_string(
                Arc::new(|i| voiche_harmonizer::chords::Key::new(i).name().to_string()),
            ),
            scale: IntParam::new(
                "Scale",
                0,
                IntRange::Linear {
                    min: 0,
                    max: scales.len() as i32 - 1,
                },
            )
            .with_value_to_string(Arc::new(move |i| {
                format!("{:?}", scales[i.clamp(0, scales.len() as i32 - 1) as usize])
            })),
            mix: volume_param("Mix", 0.5),
            voice1: volume_param("Voice 1", 1.0),
            voice2: volume_param("Voice 2", 0.6),
            voice3: volume_param("Voice 3", 0.6),
            quality: BoolParam::new("Phase Lock", true),
            transpose: IntParam::new("Transpose", 0, IntRange::Linear { min: -2, max: 2 })
                .with_unit(" oct"),
        }
    }
}

impl HarmonizerPlugin {
    fn sync_parameters(&mut self) {
        let values = self.params.normalized();
        if values == self.last_values {
            return;
        }
        self.last_values = values;
        if let Some(engine) = self.engine.as_ref() {
            let updates = ParamIndex::ALL.map(|p| (p, values[p as usize]));
            engine.controller().set_parameters(&updates);
        }
    }
}

impl Plugin for HarmonizerPlugin {
    const NAME: &'static str = "Voiche Harmonizer";
    const VENDOR: &'static str = "carrotflakes";
    const URL: &'static str = env!("CARGO_PKG_HOMEPAGE");
    const EMAIL: &'static str = "carrotflakes@gmail.com";

    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(1),
        main_output_channels: NonZeroU32::new(1),

        aux_input_ports: &[],
        aux_output_ports: &[],

        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const MIDI_OUTPUT: MidiConfig = MidiConfig::None;

    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn editor(&mut self, _async_executor: AsyncExecutor<Self>) -> Option<Box<dyn Editor>> {
        let params = self.params.clone();
        create_egui_editor(
            self.params.editor_state.clone(),
            self.params.clone(),
            |ctx, _| {
                let mut style = (*ctx.style()).clone();
                style.spacing.interact_size = nih_plug_egui::egui::vec2(32.0, 16.0);
                ctx.set_style(style);
            },
            move |egui_ctx, setter, _state| {
                egui::CentralPanel::default().show(egui_ctx, |ui| {
                    ui.label("Voices");
                    ui.add(widgets::ParamSlider::for_param(&params.voices, setter));
                    ui.label("Chord");
                    ui.add(widgets::ParamSlider::for_param(&params.chord, setter));
                    ui.label("Key");
                    ui.add(widgets::ParamSlider::for_param(&params.key, setter));
                    ui.label("Scale");
                    ui.add(widgets::ParamSlider::for_param(&params.scale, setter));
                    ui.label("Transpose");
                    ui.add(widgets::ParamSlider::for_param(&params.transpose, setter));
                    ui.separator();
                    ui.label("Voice 1");
                    ui.add(widgets::ParamSlider::for_param(&params.voice1, setter));
                    ui.label("Voice 2");
                    ui.add(widgets::ParamSlider::for_param(&params.voice2, setter));
                    ui.label("Voice 3");
                    ui.add(widgets::ParamSlider::for_param(&params.voice3, setter));
                    ui.label("Mix");
                    ui.add(widgets::ParamSlider::for_param(&params.mix, setter));
                    ui.label("Phase Lock");
                    ui.add(widgets::ParamSlider::for_param(&params.quality, setter));
                });
            },
        )
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        let mut engine = match self.engine.take() {
            Some(engine) => engine,
            None => match HarmonizerEngine::new() {
                Ok(engine) => engine,
                Err(err) => {
                    nih_error!("failed to create harmonizer: {}", err);
                    return false;
                }
            },
        };

        if let Err(err) = engine.prepare(
            buffer_config.sample_rate as f64,
            buffer_config.max_buffer_size as usize,
        ) {
            nih_error!("failed to prepare harmonizer: {}", err);
            return false;
        }
        context.set_latency_samples(engine.latency_samples() as u32);

        self.engine = Some(engine);
        self.last_values = [f32::NAN; PARAM_COUNT];
        self.sync_parameters();
        true
    }

    fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.sync_parameters();

        if let Some(engine) = self.engine.as_mut() {
            for channel in buffer.as_slice() {
                engine.harmonizer_mut().process_in_place(channel);
            }
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for HarmonizerPlugin {
    const CLAP_ID: &'static str = "voiche-harmonizer";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Three-voice chord harmonizer");
    const CLAP_MANUAL_URL: Option<&'static str> = Some(Self::URL);
    const CLAP_SUPPORT_URL: Option<&'static str> = None;

    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::PitchShifter,
    ];
}

impl Vst3Plugin for HarmonizerPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"voicheHarmonizer";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::PitchShift];
}

nih_export_vst3!(HarmonizerPlugin);
