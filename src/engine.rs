use crate::{
    config::HarmonizerConfig,
    diagnostics::DiagnosticsDrain,
    harmonizer::Harmonizer,
    params::{HarmonizerController, ParamMap},
    Error, Result,
};

/// `prepare` may allocate. `process_block` and `reset` never allocate or lock.
pub trait Engine: Send {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, sample_rate: f64, max_block_samples: usize) -> Result<()>;

    fn process_block(&mut self, input: &[f32], output: &mut [f32]);

    fn reset(&mut self);

    fn update_parameters(&self, params: &ParamMap);

    fn latency_samples(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EngineKind {
    Harmonizer = 0,
}

impl EngineKind {
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(EngineKind::Harmonizer),
            _ => Err(Error::UnknownEngine(id)),
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn create(self) -> Result<Box<dyn Engine>> {
        match self {
            EngineKind::Harmonizer => Ok(Box::new(HarmonizerEngine::new()?)),
        }
    }
}

pub fn create_engine(id: u32) -> Result<Box<dyn Engine>> {
    let engine = EngineKind::from_id(id)?.create()?;
    log::debug!("created engine {} ({})", id, engine.name());
    Ok(engine)
}

pub struct HarmonizerEngine {
    harmonizer: Harmonizer,
}

impl HarmonizerEngine {
    pub fn new() -> Result<Self> {
        Self::with_config(HarmonizerConfig::default())
    }

    pub fn with_config(config: HarmonizerConfig) -> Result<Self> {
        Ok(Self {
            harmonizer: Harmonizer::new(config)?,
        })
    }

    pub fn controller(&self) -> HarmonizerController {
        self.harmonizer.controller()
    }

    pub fn take_diagnostics(&mut self) -> Option<DiagnosticsDrain> {
        self.harmonizer.take_diagnostics()
    }

    pub fn harmonizer(&self) -> &Harmonizer {
        &self.harmonizer
    }

    pub fn harmonizer_mut(&mut self) -> &mut Harmonizer {
        &mut self.harmonizer
    }
}

impl Engine for HarmonizerEngine {
    fn name(&self) -> &'static str {
        "harmonizer"
    }

    fn prepare(&mut self, sample_rate: f64, max_block_samples: usize) -> Result<()> {
        self.harmonizer.prepare(sample_rate, max_block_samples)
    }

    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        self.harmonizer.process_block(input, output);
    }

    fn reset(&mut self) {
        self.harmonizer.reset();
    }

    fn update_parameters(&self, params: &ParamMap) {
        self.harmonizer.update_parameters(params);
    }

    fn latency_samples(&self) -> usize {
        self.harmonizer.latency_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        let engine = create_engine(EngineKind::Harmonizer.id()).unwrap();
        assert_eq!(engine.name(), "harmonizer");
        assert!(matches!(create_engine(7), Err(Error::UnknownEngine(7))));
    }

    #[test]
    fn test_boxed_engine_processes() {
        let mut engine = create_engine(0).unwrap();
        engine.prepare(48000.0, 128).unwrap();
        assert_eq!(engine.latency_samples(), 2047);

        let input = vec![0.25; 128];
        let mut output = vec![0.0; 128];
        engine.process_block(&input, &mut output);
        assert!(output.iter().all(|y| y.is_finite()));
    }
}
