use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::warn;

use crate::controller::Operator;
use crate::types::{CommandHelp, ControllerEvent};

// 状态行刷新间隔 (~30 fps)
const STATUS_INTERVAL: Duration = Duration::from_millis(33);

/// Terminal operator: reads answers from `reader`, renders events to `writer`.
pub struct CliOperator<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    last_status: Mutex<Option<Instant>>,
}

impl CliOperator<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead + Send, W: Write + Send> CliOperator<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            last_status: Mutex::new(None),
        }
    }

    /// Next input line without its line ending; `None` at end of input.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn ask(&self, question: &str) -> Option<String> {
        if let Err(err) = self.write_str(question) {
            warn!("Failed to write prompt: {err}");
        }
        match self.read_line() {
            Ok(answer) => answer,
            Err(err) => {
                warn!("Failed to read answer: {err}");
                None
            }
        }
    }

    fn write_str(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(text.as_bytes())?;
        writer.flush()
    }

    fn status_due(&self) -> bool {
        let mut last = self.last_status.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < STATUS_INTERVAL => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn render(&self, event: &ControllerEvent) -> Option<String> {
        let text = match event {
            ControllerEvent::ModeSwitched(mode) => {
                format!("\n=== {} ===\n{}\n", mode.title(), mode.description())
            }
            ControllerEvent::CommandExecuted { key, summary } => format!("[{key}] {summary}: done\n"),
            ControllerEvent::CommandNotFound(input) => {
                format!("Unknown command '{input}'. Press 'h' for help.\n")
            }
            ControllerEvent::CommandFailed { key, error } => format!("[{key}] failed: {error}\n"),
            ControllerEvent::CollectionStatus { label, steps } => {
                if !self.status_due() {
                    return None;
                }
                let label = label.as_ref().map(ToString::to_string).unwrap_or_default();
                format!("\rCollecting '{label}': {steps} samples")
            }
            ControllerEvent::PredictionStatus {
                index,
                label,
                probabilities,
            } => {
                if !self.status_due() {
                    return None;
                }
                let mut line = format!("\rPrediction #{index}: {label}");
                if let Some(probabilities) = probabilities {
                    let shown: Vec<String> = probabilities
                        .iter()
                        .map(|(label, p)| format!("{label}={p:.3}"))
                        .collect();
                    line.push_str(&format!(" [{}]", shown.join(", ")));
                }
                line
            }
            ControllerEvent::Help { mode, commands } => render_help(mode.title(), commands),
            ControllerEvent::Metadata(json) => format!("{json}\n"),
            // ANSI: 清屏并回到左上角
            ControllerEvent::ClearScreen => "\x1b[2J\x1b[H".to_owned(),
        };
        Some(text)
    }
}

fn render_help(title: &str, commands: &[CommandHelp]) -> String {
    let mut out = format!("{title} commands:\n");
    for command in commands {
        out.push_str(&format!("  {}  {}\n", command.key, command.description));
    }
    out
}

impl<R: BufRead + Send, W: Write + Send> Operator for CliOperator<R, W> {
    fn request_label(&self) -> Option<String> {
        self.ask("Enter label: ")
    }

    fn request_confirmation(&self, message: &str) -> bool {
        self.ask(&format!("{message} (y/n): "))
            .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }

    fn handle_event(&self, event: ControllerEvent) {
        if let Some(text) = self.render(&event) {
            if let Err(err) = self.write_str(&text) {
                warn!("Failed to write to terminal: {err}");
            }
        }
    }
}
