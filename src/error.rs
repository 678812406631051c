use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid sample rate: {0} Hz (expected 8000-384000 Hz)")]
    InvalidSampleRate(f64),

    #[error("Invalid maximum block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown engine id: {0}")]
    UnknownEngine(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
