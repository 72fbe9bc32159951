use std::fmt;

/// Operating mode of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Main,
    DataCollection,
    Prediction,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Main => "MAIN",
            Mode::DataCollection => "DATA_COLLECTION",
            Mode::Prediction => "PREDICTION",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Mode::Main => "Main Mode",
            Mode::DataCollection => "Data Collection Mode",
            Mode::Prediction => "Prediction Mode",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::Main => "Default mode. Incoming data is ignored until you collect or train.",
            Mode::DataCollection => "Collects training samples under the current label.",
            Mode::Prediction => "Predicts the label of the incoming signal.",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
