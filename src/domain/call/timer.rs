//! Presentation clock for the active call

use serde::{Deserialize, Serialize};

/// Elapsed-time counter shown next to the call controls.
///
/// The value is presentation-only: `stop()` discards it and the next
/// `start()` always begins at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTimer {
    elapsed_secs: u64,
    running: bool,
}

impl CallTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.elapsed_secs = 0;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.elapsed_secs = 0;
        self.running = false;
    }

    /// Advance by one second; ignored while stopped
    pub fn tick(&mut self) {
        if self.running {
            self.elapsed_secs += 1;
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `mm:ss`, zero-padded. Minutes keep counting past 59.
    pub fn formatted(&self) -> String {
        format_elapsed(self.elapsed_secs)
    }
}

pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
