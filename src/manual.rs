//! Human operator fallback
//!
//! Terminal strategy: shows the captcha to whoever runs the login and reads
//! their answer. Never delegates further and never re-prompts.

use crate::config::Config;
use crate::error::CaptchaError;
use crate::voting::is_valid_answer;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

/// The interactive channel to a human
pub trait Operator: Send + Sync {
    /// Display the image; best effort
    fn show(&self, image_path: &Path) -> Result<(), CaptchaError>;

    /// Ask one question and return the raw line typed back
    fn ask(&self, prompt: &str) -> Result<String, CaptchaError>;
}

pub struct ManualFallback {
    operator: Box<dyn Operator>,
}

impl ManualFallback {
    pub fn new(operator: Box<dyn Operator>) -> Self {
        Self { operator }
    }

    pub fn console(config: &Config) -> Self {
        Self::new(Box::new(ConsoleOperator::new(config)))
    }

    pub fn recognize_manually(&self, image_path: &Path) -> Result<String, CaptchaError> {
        if let Err(e) = self.operator.show(image_path) {
            tracing::warn!("Could not display {}: {}", image_path.display(), e);
        }

        let answer = self.operator.ask(&prompt_for(image_path))?;
        validate_answer(&answer)
    }
}

pub fn prompt_for(image_path: &Path) -> String {
    format!(
        "image path: {}, input verify code answer (4 digits): ",
        image_path.display()
    )
}

/// Accept exactly four digits, ignoring surrounding whitespace
pub fn validate_answer(answer: &str) -> Result<String, CaptchaError> {
    let trimmed = answer.trim();
    if is_valid_answer(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(CaptchaError::InvalidManualInput(trimmed.to_string()))
    }
}

/// Opens the image in an external viewer and reads the answer from stdin
pub struct ConsoleOperator {
    viewer: Option<String>,
    timeout: Option<Duration>,
}

impl ConsoleOperator {
    pub fn new(config: &Config) -> Self {
        Self {
            viewer: config.viewer.clone(),
            timeout: config.manual_timeout,
        }
    }

    fn viewer_command(&self, image_path: &Path) -> Command {
        match &self.viewer {
            Some(viewer) => {
                let mut parts = viewer.split_whitespace();
                let mut command = Command::new(parts.next().unwrap_or(viewer.as_str()));
                command.args(parts);
                command.arg(image_path);
                command
            }
            None => platform_opener(image_path),
        }
    }
}

#[cfg(target_os = "macos")]
fn platform_opener(image_path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(image_path);
    command
}

#[cfg(target_os = "windows")]
fn platform_opener(image_path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(image_path);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_opener(image_path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(image_path);
    command
}

impl Operator for ConsoleOperator {
    fn show(&self, image_path: &Path) -> Result<(), CaptchaError> {
        // The viewer outlives the prompt; it is not waited on
        self.viewer_command(image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| CaptchaError::Internal(format!("failed to launch image viewer: {}", e)))
    }

    fn ask(&self, prompt: &str) -> Result<String, CaptchaError> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}", prompt)
            .and_then(|_| stdout.flush())
            .map_err(|e| CaptchaError::Internal(format!("failed to write prompt: {}", e)))?;

        match self.timeout {
            None => read_line(&mut std::io::stdin().lock()),
            Some(timeout) => {
                let (tx, rx) = mpsc::channel();
                // The reader thread stays blocked on stdin after a timeout
                std::thread::spawn(move || {
                    let _ = tx.send(read_line(&mut std::io::stdin().lock()));
                });
                rx.recv_timeout(timeout)
                    .map_err(|_| CaptchaError::ManualInputTimeout(timeout))?
            }
        }
    }
}

fn read_line(reader: &mut impl BufRead) -> Result<String, CaptchaError> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| CaptchaError::Internal(format!("failed to read answer: {}", e)))?;
    Ok(line)
}
