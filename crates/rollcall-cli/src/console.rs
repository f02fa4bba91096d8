//! Operator interaction: the main menu and in-loop key signals.

use anyhow::{Context, Result};
use dialoguer::Input;
use rollcall_core::{OperatorInput, Signal};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Main menu entry chosen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    TakeAttendance,
    RegisterFace,
    Exit,
    Invalid,
}

impl MenuChoice {
    /// Map the operator's typed answer; anything but 1, 2 or 3 is invalid.
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<i64>() {
            Ok(1) => MenuChoice::TakeAttendance,
            Ok(2) => MenuChoice::RegisterFace,
            Ok(3) => MenuChoice::Exit,
            _ => MenuChoice::Invalid,
        }
    }
}

/// Show the menu and read one choice.
pub fn prompt_menu() -> Result<MenuChoice> {
    println!();
    println!("===== Smart Attendance System =====");
    println!("1. Take Attendance");
    println!("2. Register New Face");
    println!("3. Exit");

    let answer: String = Input::new()
        .with_prompt("Enter choice")
        .allow_empty(true)
        .interact_text()
        .context("reading menu choice")?;
    Ok(MenuChoice::parse(&answer))
}

/// Ask for the name of the person being enrolled.
pub fn prompt_name() -> Result<String> {
    let name: String = Input::new()
        .with_prompt("Enter name for new face (no spaces)")
        .validate_with(|input: &String| -> Result<(), &'static str> {
            if input.trim().is_empty() || input.trim().contains(char::is_whitespace) {
                Err("name must be a single word")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("reading name")?;
    Ok(name.trim().to_string())
}

/// Operator keys read from a line-buffered channel.
///
/// The terminal delivers input a line at a time, so the operator types
/// `q` or `c` and presses Enter. Each poll waits at most `timeout`.
pub struct KeyChannel {
    rx: Receiver<char>,
    timeout: Duration,
}

impl KeyChannel {
    pub fn new(rx: Receiver<char>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }

    /// Start a reader thread forwarding every character typed on stdin.
    pub fn stdin(timeout: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("rollcall-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    for key in line.chars() {
                        if tx.send(key).is_err() {
                            return;
                        }
                    }
                }
                tracing::debug!("stdin closed");
            })
            .context("spawning key reader thread")?;
        Ok(Self::new(rx, timeout))
    }
}

impl OperatorInput for KeyChannel {
    fn poll(&mut self) -> Option<Signal> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(key) => Signal::from_key(key),
            Err(RecvTimeoutError::Timeout) => None,
            // Stdin is gone; keep pacing the loop as if nothing was pressed.
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(self.timeout);
                None
            }
        }
    }
}
