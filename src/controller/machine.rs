use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use ndarray::ArrayView2;

use crate::controller::commands::{self, Command, CommandAction, Prompt};
use crate::controller::Mode;
use crate::drivers::Communicator;
use crate::error::ControllerError;
use crate::ml::{PersistentClassifier, Predictor, Trainer};
use crate::types::{ControllerEvent, Label};

/// The human side of the controller: answers prompts and receives events.
///
/// Prompts are always issued without the mode guard held.
pub trait Operator: Send + Sync {
    fn request_label(&self) -> Option<String>;

    fn request_confirmation(&self, message: &str) -> bool;

    fn handle_event(&self, event: ControllerEvent);
}

/// Result of [`ModeController::execute_command`].
#[derive(Debug)]
pub enum CommandOutcome {
    NotFound,
    Failed(ControllerError),
    Executed { next: Option<Mode> },
}

enum OperatorInput {
    Nothing,
    Label(Label),
}

struct ControllerState<C> {
    mode: Mode,
    trainer: Trainer<C>,
    predictor: Option<Predictor<C>>,
    current_label: Option<Label>,
    communicator: Option<Box<dyn Communicator>>,
}

/// MAIN / DATA_COLLECTION / PREDICTION state machine.
///
/// One mutex guards the mode together with everything it dispatches to, so a
/// streaming update always sees one mode and never interleaves with a transition.
pub struct ModeController<C, O> {
    state: Mutex<ControllerState<C>>,
    operator: O,
    show_probs: bool,
}

impl<C: PersistentClassifier, O: Operator> ModeController<C, O> {
    /// Starts in MAIN for a trainer still collecting, in PREDICTION for a trained one.
    pub fn new(
        trainer: Trainer<C>,
        communicator: Option<Box<dyn Communicator>>,
        operator: O,
        show_probs: bool,
    ) -> Self {
        let mode = if trainer.is_training() {
            Mode::Main
        } else {
            Mode::Prediction
        };
        let predictor = trainer
            .model()
            .map(|model| Predictor::new(*trainer.spec(), trainer.processor().clone(), model));
        Self {
            state: Mutex::new(ControllerState {
                mode,
                trainer,
                predictor,
                current_label: None,
                communicator,
            }),
            operator,
            show_probs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn current_label(&self) -> Option<Label> {
        self.lock().current_label.clone()
    }

    /// Runs `f` against the trainer under the mode guard.
    pub fn with_trainer<R>(&self, f: impl FnOnce(&Trainer<C>) -> R) -> R {
        f(&self.lock().trainer)
    }

    /// Announces the initial mode.
    pub fn start(&self) {
        let mode = self.mode();
        self.operator.handle_event(ControllerEvent::ModeSwitched(mode));
        self.operator.handle_event(ControllerEvent::Help {
            mode,
            commands: commands::help(mode),
        });
    }

    /// Looks up `input` in the current mode's table and runs it.
    ///
    /// A failed action never applies its transition.
    pub fn execute_command(&self, input: &str) -> CommandOutcome {
        let mode = self.mode();
        let Some(command) = commands::normalize_key(input).and_then(|key| commands::find(mode, key)) else {
            self.operator
                .handle_event(ControllerEvent::CommandNotFound(input.trim().to_owned()));
            return CommandOutcome::NotFound;
        };

        let result = self
            .gather_input(command)
            .and_then(|input| self.run_guarded(mode, command, input));
        match result {
            Ok(events) => {
                info!("Executed command '{}'", command.key);
                self.operator.handle_event(ControllerEvent::CommandExecuted {
                    key: command.key,
                    summary: command.description,
                });
                for event in events {
                    self.operator.handle_event(event);
                }
                if let Some(next) = command.next {
                    info!("Switched to {next} mode");
                    self.operator.handle_event(ControllerEvent::ModeSwitched(next));
                    self.operator.handle_event(ControllerEvent::Help {
                        mode: next,
                        commands: commands::help(next),
                    });
                }
                CommandOutcome::Executed { next: command.next }
            }
            Err(err) => {
                warn!("Command '{}' failed: {err}", command.key);
                self.operator.handle_event(ControllerEvent::CommandFailed {
                    key: command.key,
                    error: err.to_string(),
                });
                CommandOutcome::Failed(err)
            }
        }
    }

    fn gather_input(&self, command: &Command) -> Result<OperatorInput, ControllerError> {
        match command.action.prompt() {
            Prompt::None => Ok(OperatorInput::Nothing),
            Prompt::Label => self
                .operator
                .request_label()
                .as_deref()
                .and_then(Label::parse)
                .map(OperatorInput::Label)
                .ok_or(ControllerError::EmptyLabel),
            Prompt::Confirm(message) => {
                if self.operator.request_confirmation(message) {
                    Ok(OperatorInput::Nothing)
                } else {
                    Err(ControllerError::Cancelled)
                }
            }
        }
    }

    fn run_guarded(
        &self,
        expected: Mode,
        command: &Command,
        input: OperatorInput,
    ) -> Result<Vec<ControllerEvent>, ControllerError> {
        let mut state = self.lock();
        if state.mode != expected {
            return Err(ControllerError::ModeChanged {
                expected: expected.name(),
                actual: state.mode.name(),
            });
        }
        let events = self.run_action(&mut state, command.action, input)?;
        if let Some(next) = command.next {
            state.mode = next;
        }
        Ok(events)
    }

    fn run_action(
        &self,
        state: &mut ControllerState<C>,
        action: CommandAction,
        input: OperatorInput,
    ) -> Result<Vec<ControllerEvent>, ControllerError> {
        let mut events = Vec::new();
        match action {
            CommandAction::SetLabel => {
                if let OperatorInput::Label(label) = input {
                    state.current_label = Some(label);
                }
            }
            CommandAction::Train => {
                let model = state.trainer.train()?;
                let trainer = &state.trainer;
                state.predictor = Some(Predictor::new(*trainer.spec(), trainer.processor().clone(), model));
            }
            CommandAction::ShowMetadata => {
                let metadata = serde_json::to_string_pretty(&state.trainer.metadata())?;
                events.push(ControllerEvent::Metadata(metadata));
            }
            CommandAction::Save => {
                state.trainer.save()?;
            }
            CommandAction::ResetAll => {
                state.trainer.reset();
                state.predictor = None;
                state.current_label = None;
            }
            CommandAction::ResetModel => {
                state.trainer.reset_model();
                state.predictor = None;
            }
            CommandAction::QuitCollection => {
                state.trainer.switch_group();
                state.current_label = None;
            }
            CommandAction::ToggleSerial => {
                let communicator = state
                    .communicator
                    .as_mut()
                    .ok_or(ControllerError::NoCommunicator)?;
                if communicator.is_active() {
                    communicator.close();
                } else {
                    communicator.open()?;
                }
            }
            CommandAction::ClearScreen => events.push(ControllerEvent::ClearScreen),
            CommandAction::Help => events.push(ControllerEvent::Help {
                mode: state.mode,
                commands: commands::help(state.mode),
            }),
        }
        Ok(events)
    }

    /// Routes a batch of rows to the trainer or the predictor depending on the mode.
    ///
    /// Returns the last label predicted from this batch, if any.
    pub fn update(&self, data: ArrayView2<f64>) -> Result<Option<Label>, ControllerError> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock();
            match state.mode {
                Mode::Main => Ok(None),
                Mode::DataCollection => Self::update_collection(&mut state, data, &mut events),
                Mode::Prediction => self.update_prediction(&mut state, data, &mut events),
            }
        };
        for event in events {
            self.operator.handle_event(event);
        }
        result
    }

    fn update_collection(
        state: &mut ControllerState<C>,
        data: ArrayView2<f64>,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<Option<Label>, ControllerError> {
        let label = state.current_label.clone().ok_or(ControllerError::EmptyLabel)?;
        state.trainer.update(data, &label)?;
        events.push(ControllerEvent::CollectionStatus {
            label: Some(label),
            steps: state.trainer.steps(),
        });
        Ok(None)
    }

    fn update_prediction(
        &self,
        state: &mut ControllerState<C>,
        data: ArrayView2<f64>,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<Option<Label>, ControllerError> {
        let ControllerState {
            predictor,
            communicator,
            ..
        } = state;
        let predictor = predictor.as_mut().ok_or(ControllerError::NoModel)?;
        let mut last = None;
        // a rejected window is reported once the whole batch has been buffered
        let mut failure = None;
        for row in data.rows() {
            let values = row.to_vec();
            let prediction = match predictor.update(&values) {
                Ok(Some(prediction)) => prediction,
                Ok(None) => continue,
                Err(err) => {
                    failure.get_or_insert(err);
                    continue;
                }
            };
            let mapping = &predictor.model().label_mapping;
            let label = mapping
                .label(prediction.code)
                .cloned()
                .ok_or(ControllerError::UnknownCode(prediction.code))?;
            let probabilities = self.show_probs.then(|| {
                mapping
                    .iter()
                    .map(|(code, label)| {
                        let p = prediction.probabilities.get(code).copied().unwrap_or(f64::NAN);
                        (label.clone(), p)
                    })
                    .collect()
            });
            events.push(ControllerEvent::PredictionStatus {
                index: predictor.n_predictions(),
                label: label.clone(),
                probabilities,
            });
            if let Some(communicator) = communicator.as_mut() {
                if communicator.is_active() {
                    // output failures never stop ingestion of the rest of the batch
                    if let Err(err) = communicator.send(&label.to_string()) {
                        warn!("Failed to send prediction {label}: {err}");
                    }
                }
            }
            last = Some(label);
        }
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::TransportError;
    use crate::ml::{GaussianNb, TrainerOptions};
    use crate::processing::{ChannelConfig, PassThrough, SignalProcessor, WindowFeatures, WindowSpec};
    use crossbeam_channel::{bounded, Receiver, Sender};
    use ndarray::Array2;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct ScriptedOperator {
        labels: Mutex<VecDeque<String>>,
        confirmations: Mutex<VecDeque<bool>>,
        events: Mutex<Vec<ControllerEvent>>,
        // (entered, release) handshake around request_label
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    impl ScriptedOperator {
        fn with_labels(labels: &[&str]) -> Self {
            Self {
                labels: Mutex::new(labels.iter().map(|label| label.to_string()).collect()),
                ..Self::default()
            }
        }

        fn confirm(self, answers: &[bool]) -> Self {
            *self.confirmations.lock().unwrap() = answers.iter().copied().collect();
            self
        }

        fn events(&self) -> Vec<ControllerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Operator for ScriptedOperator {
        fn request_label(&self) -> Option<String> {
            if let Some((entered, release)) = &self.gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.labels.lock().unwrap().pop_front()
        }

        fn request_confirmation(&self, _message: &str) -> bool {
            self.confirmations.lock().unwrap().pop_front().unwrap_or(false)
        }

        fn handle_event(&self, event: ControllerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct FakeCommunicator {
        active: bool,
        broken: bool,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Communicator for FakeCommunicator {
        fn is_active(&self) -> bool {
            self.active
        }

        fn open(&mut self) -> Result<(), TransportError> {
            self.active = true;
            Ok(())
        }

        fn close(&mut self) {
            self.active = false;
        }

        fn send(&mut self, message: &str) -> Result<(), TransportError> {
            if self.broken {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "port unplugged",
                )));
            }
            self.sent.lock().unwrap().push(message.to_owned());
            Ok(())
        }
    }

    fn trainer() -> Trainer<GaussianNb> {
        Trainer::new(
            WindowSpec::new(0.1, 0.05, 100.0).unwrap(),
            SignalProcessor::emg_only(ChannelConfig::new(PassThrough, WindowFeatures::simple())),
            GaussianNb::default(),
            TrainerOptions::default(),
        )
    }

    fn controller(operator: ScriptedOperator) -> ModeController<GaussianNb, ScriptedOperator> {
        ModeController::new(trainer(), None, operator, true)
    }

    /// Alternating-sign rows of the given amplitude, plus timestamps.
    fn rows(n: usize, amplitude: f64) -> Array2<f64> {
        Array2::from_shape_fn((n, 2), |(row, col)| {
            if col == 1 {
                row as f64
            } else if row % 2 == 0 {
                amplitude * (1.0 + (row % 5) as f64 * 0.1)
            } else {
                -amplitude
            }
        })
    }

    fn collect(controller: &ModeController<GaussianNb, ScriptedOperator>, amplitude: f64) {
        assert!(matches!(
            controller.execute_command("a"),
            CommandOutcome::Executed {
                next: Some(Mode::DataCollection)
            }
        ));
        controller.update(rows(100, amplitude).view()).unwrap();
        controller.execute_command("q");
    }

    #[test]
    fn starts_in_main_for_untrained_trainer() {
        let controller = controller(ScriptedOperator::default());
        assert_eq!(controller.mode(), Mode::Main);
        controller.start();
        assert!(matches!(
            controller.operator().events()[0],
            ControllerEvent::ModeSwitched(Mode::Main)
        ));
    }

    #[test]
    fn unknown_key_keeps_mode() {
        let controller = controller(ScriptedOperator::default());
        assert!(matches!(controller.execute_command("z"), CommandOutcome::NotFound));
        assert!(matches!(controller.execute_command("q"), CommandOutcome::NotFound));
        assert_eq!(controller.mode(), Mode::Main);
        assert!(matches!(
            controller.operator().events().last(),
            Some(ControllerEvent::CommandNotFound(key)) if key == "q"
        ));
    }

    #[test]
    fn failing_train_skips_transition() {
        let controller = controller(ScriptedOperator::default());
        let outcome = controller.execute_command("t");
        assert!(matches!(outcome, CommandOutcome::Failed(ControllerError::Trainer(_))));
        assert_eq!(controller.mode(), Mode::Main);
        assert!(matches!(
            controller.operator().events().last(),
            Some(ControllerEvent::CommandFailed { key: 't', .. })
        ));
    }

    #[test]
    fn empty_label_is_a_command_error() {
        let controller = controller(ScriptedOperator::with_labels(&["   "]));
        assert!(matches!(
            controller.execute_command("A"),
            CommandOutcome::Failed(ControllerError::EmptyLabel)
        ));
        assert_eq!(controller.mode(), Mode::Main);
    }

    #[test]
    fn collection_tags_rows_with_the_current_label() {
        let controller = controller(ScriptedOperator::with_labels(&["rest", "fist"]));
        collect(&controller, 0.1);
        collect(&controller, 5.0);
        assert_eq!(controller.mode(), Mode::Main);
        assert_eq!(controller.current_label(), None);
        controller.with_trainer(|trainer| {
            assert_eq!(trainer.table().len(), 200);
            assert_eq!(trainer.group(), 2);
            assert_eq!(trainer.table().labels()[150], Label::from("fist"));
        });
        let steps: Vec<usize> = controller
            .operator()
            .events()
            .iter()
            .filter_map(|event| match event {
                ControllerEvent::CollectionStatus { steps, .. } => Some(*steps),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![100, 100]);
    }

    #[test]
    fn main_mode_ignores_data() {
        let controller = controller(ScriptedOperator::default());
        assert_eq!(controller.update(rows(10, 1.0).view()).unwrap(), None);
        controller.with_trainer(|trainer| assert!(trainer.table().is_empty()));
    }

    #[test]
    fn train_predict_and_reset_cycle() {
        let operator = ScriptedOperator::with_labels(&["rest", "fist"]).confirm(&[false, true, true]);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let communicator = FakeCommunicator {
            active: false,
            broken: false,
            sent: Arc::clone(&sent),
        };
        let controller = ModeController::new(trainer(), Some(Box::new(communicator)), operator, true);
        collect(&controller, 0.1);
        collect(&controller, 5.0);

        assert!(matches!(
            controller.execute_command("t"),
            CommandOutcome::Executed {
                next: Some(Mode::Prediction)
            }
        ));
        assert_eq!(controller.mode(), Mode::Prediction);

        assert!(matches!(controller.execute_command("x"), CommandOutcome::Executed { next: None }));
        let predicted = controller.update(rows(40, 5.0).view()).unwrap();
        assert_eq!(predicted, Some(Label::from("fist")));
        assert!(!sent.lock().unwrap().is_empty());
        assert!(sent.lock().unwrap().iter().all(|label| label == "fist"));

        let status = controller
            .operator()
            .events()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                ControllerEvent::PredictionStatus { probabilities, .. } => probabilities,
                _ => None,
            })
            .unwrap();
        assert_eq!(status.len(), 2);

        // declined confirmation keeps the mode
        assert!(matches!(
            controller.execute_command("m"),
            CommandOutcome::Failed(ControllerError::Cancelled)
        ));
        assert_eq!(controller.mode(), Mode::Prediction);

        assert!(matches!(
            controller.execute_command("m"),
            CommandOutcome::Executed { next: Some(Mode::Main) }
        ));
        controller.with_trainer(|trainer| {
            assert!(trainer.is_training());
            assert_eq!(trainer.table().len(), 200);
        });

        controller.execute_command("t");
        assert_eq!(controller.mode(), Mode::Prediction);
        assert!(matches!(
            controller.execute_command("r"),
            CommandOutcome::Executed { next: Some(Mode::Main) }
        ));
        controller.with_trainer(|trainer| assert!(trainer.table().is_empty()));
    }

    #[test]
    fn send_failures_do_not_drop_rows() {
        let operator = ScriptedOperator::with_labels(&["rest", "fist"]);
        let communicator = FakeCommunicator {
            active: true,
            broken: true,
            sent: Arc::default(),
        };
        let controller = ModeController::new(trainer(), Some(Box::new(communicator)), operator, false);
        collect(&controller, 0.1);
        collect(&controller, 5.0);
        assert!(matches!(
            controller.execute_command("t"),
            CommandOutcome::Executed {
                next: Some(Mode::Prediction)
            }
        ));

        // window 10, step 5: rows 10, 15, ..., 40
        let predicted = controller.update(rows(40, 5.0).view()).unwrap();
        assert_eq!(predicted, Some(Label::from("fist")));
        let predictions = controller
            .operator()
            .events()
            .iter()
            .filter(|event| matches!(event, ControllerEvent::PredictionStatus { .. }))
            .count();
        assert_eq!(predictions, 7);
    }

    #[test]
    fn toggle_without_communicator_fails() {
        let operator = ScriptedOperator::with_labels(&["rest", "fist"]);
        let controller = controller(operator);
        collect(&controller, 0.1);
        collect(&controller, 5.0);
        controller.execute_command("t");
        assert!(matches!(
            controller.execute_command("x"),
            CommandOutcome::Failed(ControllerError::NoCommunicator)
        ));
        assert_eq!(controller.mode(), Mode::Prediction);
    }

    #[test]
    fn trained_trainer_resumes_in_prediction() {
        let controller = controller(ScriptedOperator::with_labels(&["rest", "fist"]));
        collect(&controller, 0.1);
        collect(&controller, 5.0);
        controller.execute_command("t");
        let model = controller.with_trainer(|trainer| trainer.model()).unwrap();

        let mut trainer = trainer();
        trainer.update(rows(100, 0.1).view(), &Label::from("rest")).unwrap();
        trainer.switch_group();
        trainer.update(rows(100, 5.0).view(), &Label::from("fist")).unwrap();
        trainer.train().unwrap();
        let resumed = ModeController::new(trainer, None, ScriptedOperator::default(), false);
        assert_eq!(resumed.mode(), Mode::Prediction);
        assert_eq!(
            resumed.update(rows(40, 0.1).view()).unwrap(),
            Some(Label::from("rest"))
        );
        assert_eq!(model.label_mapping.len(), 2);
    }

    #[test]
    fn prompts_run_outside_the_guard() {
        let (entered_tx, entered_rx) = bounded(0);
        let (release_tx, release_rx) = bounded(0);
        let operator = ScriptedOperator {
            labels: Mutex::new(VecDeque::from(["rest".to_owned()])),
            gate: Some((entered_tx, release_rx)),
            ..ScriptedOperator::default()
        };
        let controller = Arc::new(controller(operator));

        let worker = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.execute_command("a"))
        };
        entered_rx.recv().unwrap();
        // the guard is free while the operator is typing
        assert_eq!(controller.update(rows(5, 1.0).view()).unwrap(), None);
        assert!(matches!(controller.execute_command("h"), CommandOutcome::Executed { next: None }));
        release_tx.send(()).unwrap();

        let outcome = worker.join().unwrap();
        assert!(matches!(
            outcome,
            CommandOutcome::Executed {
                next: Some(Mode::DataCollection)
            }
        ));
        assert_eq!(controller.current_label(), Some(Label::from("rest")));
    }

    #[test]
    fn mode_change_during_prompt_aborts_the_command() {
        let (entered_tx, entered_rx) = bounded(0);
        let (release_tx, release_rx) = bounded(0);
        let mut trainer = trainer();
        trainer.update(rows(100, 0.1).view(), &Label::from("rest")).unwrap();
        trainer.switch_group();
        trainer.update(rows(100, 5.0).view(), &Label::from("fist")).unwrap();
        let operator = ScriptedOperator {
            labels: Mutex::new(VecDeque::from(["late".to_owned()])),
            gate: Some((entered_tx, release_rx)),
            ..ScriptedOperator::default()
        };
        let controller = Arc::new(ModeController::new(trainer, None, operator, false));

        let worker = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.execute_command("a"))
        };
        entered_rx.recv().unwrap();
        assert!(matches!(
            controller.execute_command("t"),
            CommandOutcome::Executed {
                next: Some(Mode::Prediction)
            }
        ));
        release_tx.send(()).unwrap();

        assert!(matches!(
            worker.join().unwrap(),
            CommandOutcome::Failed(ControllerError::ModeChanged {
                expected: "MAIN",
                actual: "PREDICTION"
            })
        ));
        assert_eq!(controller.mode(), Mode::Prediction);
        assert_eq!(controller.current_label(), None);
    }

    #[test]
    fn concurrent_updates_and_commands_stay_consistent() {
        let labels: Vec<String> = (0..20).map(|i| format!("label{i}")).collect();
        let operator = ScriptedOperator {
            labels: Mutex::new(labels.into_iter().collect()),
            ..ScriptedOperator::default()
        };
        let controller = Arc::new(controller(operator));

        let feeder = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                for _ in 0..200 {
                    controller.update(rows(3, 1.0).view()).unwrap();
                }
            })
        };
        for _ in 0..20 {
            controller.execute_command("a");
            controller.execute_command("q");
        }
        feeder.join().unwrap();

        assert_eq!(controller.mode(), Mode::Main);
        controller.with_trainer(|trainer| {
            let table = trainer.table();
            assert_eq!(table.len() % 3, 0);
            // every collected row carries a real label and a group that was open at the time
            assert!(table.labels().iter().all(|label| !label.is_empty()));
            assert!(table.groups().windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(trainer.group(), 20);
        });
    }
}
