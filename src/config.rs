//! Runtime settings.
//!
//! One `Settings` value is built at start-up (defaults, optionally overridden by a
//! TOML file) and handed to every constructor that needs it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drivers::SerialCommunicator;
use crate::error::ConfigError;
use crate::ml::{ExperimentStore, GaussianNb, NbParams, StratifiedGroupKFold, TrainerOptions};
use crate::processing::{
    BandpassNotch, ChannelConfig, PassThrough, SignalProcessor, WindowFeatures, WindowSpec,
};
use crate::types::Label;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub udp_ip: String,
    pub udp_port: u16,
    /// Columns per incoming row, timestamp included.
    pub n_channels: usize,
    pub window_size: f64,
    pub step_size: f64,
    pub sampling_rate: f64,
    pub cross_validate: bool,
    pub cv_splits: usize,
    pub cv_seed: u64,
    pub should_save: bool,
    pub base_dir: PathBuf,
    pub log_level: String,
    pub show_probs: bool,
    pub ignore_labels: Vec<Label>,
    pub transport: TransportSettings,
    pub signals: SignalSettings,
    pub model: ModelSettings,
    pub output: Option<OutputSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            udp_ip: "0.0.0.0".to_owned(),
            udp_port: 8000,
            n_channels: 5,
            window_size: 1.0,
            step_size: 0.05,
            sampling_rate: 1200.0,
            cross_validate: true,
            cv_splits: 5,
            cv_seed: 1,
            should_save: true,
            base_dir: PathBuf::from("./experiments"),
            log_level: "info".to_owned(),
            show_probs: true,
            ignore_labels: Vec::new(),
            transport: TransportSettings::default(),
            signals: SignalSettings::default(),
            model: ModelSettings::default(),
            output: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportSettings {
    #[default]
    Udp,
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanerKind {
    None,
    Bandpass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Simple,
    Advanced,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub enabled: bool,
    pub cleaner: CleanerKind,
    pub features: FeatureKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub emg: GroupSettings,
    pub eeg: GroupSettings,
    /// Signal columns belonging to the EMG group; the rest are EEG.
    pub emg_columns: Option<Vec<usize>>,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            emg: GroupSettings {
                enabled: true,
                cleaner: CleanerKind::Bandpass,
                features: FeatureKind::Simple,
            },
            eeg: GroupSettings {
                enabled: false,
                cleaner: CleanerKind::Bandpass,
                features: FeatureKind::Simple,
            },
            emg_columns: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub var_smoothing: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            var_smoothing: NbParams::default().var_smoothing,
        }
    }
}

/// Serial port receiving predicted labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub message_mapping: HashMap<String, String>,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_chunk_size() -> usize {
    1
}

fn channel_config(group: &GroupSettings, preset: BandpassNotch) -> ChannelConfig {
    let features = match group.features {
        FeatureKind::Simple => WindowFeatures::simple(),
        FeatureKind::Advanced => WindowFeatures::advanced(),
    };
    match group.cleaner {
        CleanerKind::None => ChannelConfig::new(PassThrough, features),
        CleanerKind::Bandpass => ChannelConfig::new(preset, features),
    }
}

impl Settings {
    /// Reads and validates a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_spec()?;
        if self.n_channels < 2 {
            return Err(ConfigError::TooFewColumns(self.n_channels));
        }
        self.build_processor()?;
        if self.cross_validate && self.cv_splits < 2 {
            return Err(ConfigError::InvalidSplits(self.cv_splits));
        }
        Ok(())
    }

    pub fn window_spec(&self) -> Result<WindowSpec, ConfigError> {
        WindowSpec::new(self.window_size, self.step_size, self.sampling_rate)
    }

    pub fn build_processor(&self) -> Result<SignalProcessor, ConfigError> {
        let signals = &self.signals;
        let emg = signals
            .emg
            .enabled
            .then(|| channel_config(&signals.emg, BandpassNotch::emg()));
        let eeg = signals
            .eeg
            .enabled
            .then(|| channel_config(&signals.eeg, BandpassNotch::eeg()));
        SignalProcessor::new(emg, eeg, signals.emg_columns.clone())
    }

    pub fn classifier(&self) -> GaussianNb {
        GaussianNb::new(NbParams {
            var_smoothing: self.model.var_smoothing,
        })
    }

    pub fn trainer_options(&self) -> Result<TrainerOptions, ConfigError> {
        let cross_validation = if self.cross_validate {
            Some(StratifiedGroupKFold::new(self.cv_splits, self.cv_seed)?)
        } else {
            None
        };
        Ok(TrainerOptions {
            cross_validation,
            ignore_labels: self.ignore_labels.clone(),
            store: ExperimentStore::new(self.base_dir.clone()),
            save_after_training: self.should_save,
        })
    }

    /// The prediction communicator, if an output port is configured.
    pub fn communicator(&self) -> Option<SerialCommunicator> {
        self.output.as_ref().map(|output| {
            SerialCommunicator::new(
                output.port.clone(),
                output.baud_rate,
                output.chunk_size,
                output.message_mapping.clone(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        let spec = settings.window_spec().unwrap();
        assert_eq!(spec.window_samples(), 1200);
        assert_eq!(spec.step_samples(), 60);
        assert!(settings.trainer_options().unwrap().cross_validation.is_some());
        assert!(settings.communicator().is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            udp_port = 9000
            ignore_labels = [0, "noise"]

            [transport]
            kind = "serial"
            port = "/dev/ttyUSB0"

            [signals]
            emg_columns = [0, 1]

            [signals.eeg]
            enabled = true
            cleaner = "none"
            features = "advanced"

            [output]
            port = "/dev/ttyACM0"
            message_mapping = {{ fist = "F" }}
            "#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.udp_port, 9000);
        assert_eq!(settings.n_channels, 5);
        assert_eq!(settings.ignore_labels, vec![Label::from(0), Label::from("noise")]);
        assert_eq!(
            settings.transport,
            TransportSettings::Serial {
                port: "/dev/ttyUSB0".to_owned(),
                baud_rate: 115_200
            }
        );
        assert!(settings.signals.emg.enabled);
        assert_eq!(settings.signals.eeg.features, FeatureKind::Advanced);
        let output = settings.output.as_ref().unwrap();
        assert_eq!(output.chunk_size, 1);
        assert_eq!(output.message_mapping["fist"], "F");
        assert_eq!(settings.communicator().unwrap().port_name(), "/dev/ttyACM0");
    }

    #[test]
    fn two_groups_need_a_partition() {
        let mut settings = Settings::default();
        settings.signals.eeg.enabled = true;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingChannelPartition)
        ));
        settings.signals.emg_columns = Some(vec![0, 1]);
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_values() {
        let settings = Settings {
            step_size: 0.0001,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::EmptyStep { .. })));

        let settings = Settings {
            n_channels: 1,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::TooFewColumns(1))));

        let settings = Settings {
            cv_splits: 1,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidSplits(1))));

        let mut settings = Settings::default();
        settings.signals.emg.enabled = false;
        assert!(matches!(settings.validate(), Err(ConfigError::NoSignalGroup)));
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_size = \"one second\"").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
