//! Error types for trace handling and RFI detection.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid sample count: got {0} samples, time traces must have an even number of samples")]
    InvalidSampleCount(usize),

    #[error("incompatible traces: {0}")]
    IncompatibleTrace(String),

    #[error("insufficient good blocks in station {station}: need {required}, best antenna has {available}")]
    InsufficientGoodBlocks {
        station: String,
        required: usize,
        available: usize,
    },

    #[error("station {station} has no reference antenna: best candidate reaches {best} other antennas, need at least 2")]
    NoReferenceAntenna { station: String, best: usize },

    #[error("block size mismatch: trace length {trace_length} is not a multiple of block size {block_size}")]
    BlockSizeMismatch {
        trace_length: usize,
        block_size: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("waveform source error: {0}")]
    Source(String),

    #[error("FFT error: {0}")]
    Fft(String),
}

impl From<realfft::FftError> for Error {
    fn from(err: realfft::FftError) -> Self {
        Error::Fft(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
