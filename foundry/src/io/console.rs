//! Operator input from the terminal.
//!
//! Lines are read on a background thread so that waiting for input stays
//! interruptible: the reader polls the [`InterruptController`] between lines.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use crate::interrupt::InterruptController;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of waiting for a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRead {
    Message(String),
    /// A shutdown was requested while waiting.
    Interrupted,
}

/// Source of human answers for the agent loop.
pub trait HumanInput {
    /// Read one (possibly multi-line) message, terminated by an empty line.
    fn read_message(&mut self, interrupt: &InterruptController) -> Result<InputRead>;

    /// Ask a yes/no question; anything other than `y`/`yes` is no.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Console reading lines from stdin (or any reader) and prompting on a writer.
pub struct TerminalConsole<W: Write = io::Stdout> {
    lines: Receiver<Option<String>>,
    out: W,
    closed: bool,
}

impl TerminalConsole<io::Stdout> {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<W: Write> TerminalConsole<W> {
    pub fn from_reader<R>(reader: R, out: W) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Some(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(err = %err, "failed to read console input");
                        break;
                    }
                }
            }
            let _ = tx.send(None);
        });
        Self {
            lines: rx,
            out,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn prompt(&mut self, text: &str, newline: bool) {
        let written = if newline {
            writeln!(self.out, "{text}")
        } else {
            write!(self.out, "{text}")
        };
        if let Err(err) = written.and_then(|()| self.out.flush()) {
            warn!(err = %err, "failed to write console prompt");
        }
    }

    /// Next line, `None` on end of input.
    fn next_line(&mut self, interrupt: Option<&InterruptController>) -> Option<LineRead> {
        if self.closed {
            return None;
        }
        loop {
            if interrupt.is_some_and(InterruptController::shutdown_requested) {
                return Some(LineRead::Interrupted);
            }
            match self.lines.recv_timeout(POLL_INTERVAL) {
                Ok(Some(line)) => return Some(LineRead::Line(line)),
                Ok(None) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("console input closed");
                    self.closed = true;
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

enum LineRead {
    Line(String),
    Interrupted,
}

impl<W: Write> HumanInput for TerminalConsole<W> {
    fn read_message(&mut self, interrupt: &InterruptController) -> Result<InputRead> {
        self.prompt("> (Enter an empty line to submit)", true);
        let mut lines = Vec::new();
        loop {
            match self.next_line(Some(interrupt)) {
                Some(LineRead::Line(line)) if line.is_empty() => break,
                Some(LineRead::Line(line)) => lines.push(line),
                Some(LineRead::Interrupted) => return Ok(InputRead::Interrupted),
                None if lines.is_empty() => {
                    bail!("console input closed while waiting for a response")
                }
                None => break,
            }
        }
        Ok(InputRead::Message(lines.join("\n")))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.prompt(&format!("{question} [y/N]: "), false);
        match self.next_line(None) {
            Some(LineRead::Line(answer)) => {
                let answer = answer.trim().to_ascii_lowercase();
                Ok(answer == "y" || answer == "yes")
            }
            Some(LineRead::Interrupted) | None => Ok(false),
        }
    }
}
