//! Radio antenna trace handling and narrowband RFI detection.
//!
//! - [`trace`]: a signal container that holds either a time series or its spectrum.
//! - [`aligner`]: adds traces with different start times and sampling rates.
//! - [`rfi`]: finds channels contaminated by continuous narrowband transmitters using the
//!   phase coherence between the antennas of a station, and removes them from channel traces.

pub mod aligner;
pub mod config;
pub mod error;
pub mod fft;
pub mod math_tools;
pub mod rfi;
pub mod source;
pub mod trace;

pub use aligner::combine;
pub use config::{RfiConfig, StationFilterConfig};
pub use error::{Error, Result};
pub use rfi::analysis::{analyze, RfiResult};
pub use rfi::station_filter::{find_rfi_for_trace_length, StationRfiFilter, StationRfiSummary};
pub use source::{AntennaBlockSet, StationWaveforms, WaveformSource};
pub use trace::{ChannelLayout, Trace, TraceRecord};
