// src/processing/mod.rs
// 窗口切分、滤波、特征提取与数据集构建
pub mod cleaners;
pub mod dataset;
pub mod features;
pub mod filter;
pub mod pipeline;
pub mod table;
pub mod windowing;
// 公开导出常用类型
pub use cleaners::{BandpassNotch, PassThrough, SignalCleaner};
pub use dataset::{build_dataset, Dataset, LabelMapping};
pub use features::{FeatureExtractor, FeatureSet, WindowFeatures};
pub use pipeline::{ChannelConfig, SignalProcessor};
pub use table::SampleTable;
pub use windowing::{center_align, window_bounds, WindowSpec};
