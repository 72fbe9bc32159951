//! Per-mode command tables: key -> action plus optional next mode.
use crate::controller::Mode;
use crate::types::CommandHelp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandAction {
    SetLabel,
    Train,
    ShowMetadata,
    Save,
    ResetAll,
    ResetModel,
    QuitCollection,
    ToggleSerial,
    ClearScreen,
    Help,
}

/// Operator input an action needs before it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    None,
    Label,
    Confirm(&'static str),
}

impl CommandAction {
    pub fn prompt(&self) -> Prompt {
        match self {
            CommandAction::SetLabel => Prompt::Label,
            CommandAction::ResetAll => {
                Prompt::Confirm("Are you sure you want to reset all data and the model?")
            }
            CommandAction::ResetModel => Prompt::Confirm("Are you sure you want to reset the model?"),
            _ => Prompt::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub key: char,
    pub description: &'static str,
    pub action: CommandAction,
    pub next: Option<Mode>,
}

const fn command(key: char, description: &'static str, action: CommandAction, next: Option<Mode>) -> Command {
    Command {
        key,
        description,
        action,
        next,
    }
}

const CLEAR: Command = command('d', "Clear the screen", CommandAction::ClearScreen, None);
const HELP: Command = command('h', "Show this help", CommandAction::Help, None);

const MAIN: &[Command] = &[
    command(
        'a',
        "Request label and start data collection  -> Data Collection Mode",
        CommandAction::SetLabel,
        Some(Mode::DataCollection),
    ),
    command(
        't',
        "Train the model                          -> Prediction Mode",
        CommandAction::Train,
        Some(Mode::Prediction),
    ),
    command('m', "Show trainer metadata", CommandAction::ShowMetadata, None),
    command('s', "Save trainer information", CommandAction::Save, None),
    command('r', "Reset data and trainer to initial state", CommandAction::ResetAll, None),
    CLEAR,
    HELP,
];

const DATA_COLLECTION: &[Command] = &[
    command(
        'q',
        "Quit sample collection                   -> Main Mode",
        CommandAction::QuitCollection,
        Some(Mode::Main),
    ),
    CLEAR,
    HELP,
];

const PREDICTION: &[Command] = &[
    command('s', "Save trainer information", CommandAction::Save, None),
    command(
        'r',
        "Reset all data and the model             -> Main Mode",
        CommandAction::ResetAll,
        Some(Mode::Main),
    ),
    command(
        'm',
        "Reset the model only                     -> Main Mode",
        CommandAction::ResetModel,
        Some(Mode::Main),
    ),
    command('x', "Toggle serial output", CommandAction::ToggleSerial, None),
    CLEAR,
    HELP,
];

pub fn commands_for(mode: Mode) -> &'static [Command] {
    match mode {
        Mode::Main => MAIN,
        Mode::DataCollection => DATA_COLLECTION,
        Mode::Prediction => PREDICTION,
    }
}

pub fn find(mode: Mode, key: char) -> Option<&'static Command> {
    commands_for(mode).iter().find(|command| command.key == key)
}

pub fn help(mode: Mode) -> Vec<CommandHelp> {
    commands_for(mode)
        .iter()
        .map(|command| CommandHelp {
            key: command.key,
            description: command.description,
        })
        .collect()
}

/// Single-character, lower-cased command key from a raw input line.
pub fn normalize_key(input: &str) -> Option<char> {
    let mut chars = input.trim().chars();
    let key = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    key.to_lowercase().next()
}
