// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod ads1299;
pub mod bands;
pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;
pub mod frame;
pub mod pipeline;
pub mod plot;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use bands::{Band, BandEdges, BandPower, FilterBank, FilterBankSettings, PowerWindow};
pub use buffer::{SignalBuffer, WindowFrame};
pub use error::{DriverError, ErrorKind};
pub use fft::{FrequencySpectrum, SpectrumBuilder};
pub use filter::{ButterworthFilter, FilterKind, FilterSpec, Phase};
pub use frame::{decode_tick, RawFrame};
pub use pipeline::{BandPipeline, PowerSettings, Representative};
pub use plot::{render_spectrum_png, render_waveform_png, PlotStyle};
pub use source::{AcquisitionBoard, ManualBoard, SimulatedBoard, SimulationSettings};
