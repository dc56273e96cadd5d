//! Remote-control session - owns the connection, the mirror and the timer tasks

mod commands;
mod engine;

pub use engine::Session;

use std::collections::BTreeSet;

use crate::mirror::Channel;

/// Commands the operator can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// (Re)connect to the server
    Connect,
    /// Switch the program scene
    SelectScene(String),
    /// Make exactly these source indices visible in the displayed scene
    SelectSources(BTreeSet<usize>),
    /// Set a channel volume in percent
    SetVolume(Channel, u8),
    ToggleMute(Channel),
    /// Transition preview to program with the current transition
    Transition,
    ToggleStreaming,
    ToggleRecording,
    /// Shut the session down and close the UI
    Quit,
}
