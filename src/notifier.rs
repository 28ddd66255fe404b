//! End-of-run notification.

use crate::config::Config;
use crate::progress::RunSummary;
use std::io::Write;

/// Receives a single signal once a run's summary is final
pub trait CompletionNotifier: Send + Sync {
    fn notify(&self, summary: &RunSummary);
}

/// Stream the bell is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BellTarget {
    Stdout,
    /// Used when stdout carries JSON events
    Stderr,
}

/// Audible cue on the controlling terminal
#[derive(Debug, Clone, Copy)]
pub struct TerminalBell {
    target: BellTarget,
}

impl TerminalBell {
    pub fn new(target: BellTarget) -> Self {
        Self { target }
    }

    /// Bell che non interferisce con l'output JSON
    pub fn for_config(config: &Config) -> Self {
        if config.json_output {
            Self::new(BellTarget::Stderr)
        } else {
            Self::new(BellTarget::Stdout)
        }
    }

    pub fn target(&self) -> BellTarget {
        self.target
    }

    fn ring(out: &mut impl Write) {
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

impl Default for TerminalBell {
    fn default() -> Self {
        Self::new(BellTarget::Stdout)
    }
}

impl CompletionNotifier for TerminalBell {
    fn notify(&self, _summary: &RunSummary) {
        match self.target {
            BellTarget::Stdout => Self::ring(&mut std::io::stdout()),
            BellTarget::Stderr => Self::ring(&mut std::io::stderr()),
        }
    }
}
