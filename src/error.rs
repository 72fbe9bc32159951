use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sampling rate must be greater than zero, got {0}")]
    InvalidSampleRate(f64),
    #[error("step of {step_size}s at {sampling_rate} Hz is shorter than one sample")]
    EmptyStep { step_size: f64, sampling_rate: f64 },
    #[error("window ({window_samples} samples) is shorter than step ({step_samples} samples)")]
    WindowShorterThanStep {
        window_samples: usize,
        step_samples: usize,
    },
    #[error("at least one signal group (emg or eeg) must be configured")]
    NoSignalGroup,
    #[error("emg_columns is required when both emg and eeg groups are configured")]
    MissingChannelPartition,
    #[error("need at least one signal channel plus the timestamp, got {0} columns")]
    TooFewColumns(usize),
    #[error("cross-validation needs at least 2 splits, got {0}")]
    InvalidSplits(usize),
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("channel index {index} out of range for {channels} channels")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error("no channels selected for the {group} group")]
    NoChannels { group: &'static str },
    #[error("channel blocks disagree on window count: expected {expected}, got {actual}")]
    WindowCountMismatch { expected: usize, actual: usize },
    #[error("cannot build a dataset from an empty sample table")]
    EmptyTable,
    #[error("feature matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier has not been fitted")]
    NotFitted,
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("training set has {rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("need at least 2 distinct classes to fit, got {0}")]
    TooFewClasses(usize),
    #[error("expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
    #[error("feature row {row} holds a non-finite value")]
    NonFinite { row: usize },
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("rows need at least one channel plus a timestamp, got {0} columns")]
    TooFewColumns(usize),
    #[error("row width mismatch: table has {expected} columns, got {actual}")]
    ColumnMismatch { expected: usize, actual: usize },
    #[error("table columns disagree on length ({rows} timestamps)")]
    Corrupt { rows: usize },
    #[error("group ids decrease at row {row}")]
    GroupOrder { row: usize },
}

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("trainer is not in training mode")]
    NotTraining,
    #[error("label cannot be empty")]
    EmptyLabel,
    #[error("no data has been collected")]
    NoData,
    #[error("sample table too short to produce a single window")]
    NoWindows,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("row must hold at least one reading plus a timestamp, got {0} values")]
    MalformedRow(usize),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("pipeline produced {0} windows for a full buffer, expected 1")]
    UnexpectedWindows(usize),
    #[error("feature column {index} missing from a {width}-wide feature row")]
    MissingFeature { index: usize, width: usize },
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot window config is invalid: {0}")]
    Incompatible(#[from] ConfigError),
    #[error("snapshot is marked as trained but holds no fitted model")]
    MissingModel,
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("label cannot be empty")]
    EmptyLabel,
    #[error("action cancelled")]
    Cancelled,
    #[error("mode changed from {expected} to {actual} before the command ran")]
    ModeChanged {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("no trained model available for prediction")]
    NoModel,
    #[error("no serial communicator configured")]
    NoCommunicator,
    #[error("prediction code {0} has no label")]
    UnknownCode(usize),
    #[error("failed to render metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Trainer(#[from] TrainerError),
    #[error(transparent)]
    Predictor(#[from] PredictorError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Transport(#[from] crate::drivers::TransportError),
}
