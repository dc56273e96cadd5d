//! Render commands sent from the engine to the UI

use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

use crate::mirror::{Channel, OutputState, StateMirror};

/// State of the stream or record button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ButtonState {
    Off,
    On,
    /// Output is transitioning; the button is disabled
    Wait,
}

impl From<OutputState> for ButtonState {
    fn from(state: OutputState) -> Self {
        match state {
            OutputState::Off => ButtonState::Off,
            OutputState::On => ButtonState::On,
            OutputState::Starting | OutputState::Stopping => ButtonState::Wait,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RenderCommand {
    SceneList {
        names: Vec<String>,
        selected: Option<usize>,
    },
    SourceList {
        names: Vec<String>,
        selected: BTreeSet<usize>,
    },
    CurrentScene(String),
    /// Volume in percent, 0 to 100
    ChannelVolume(Channel, u8),
    ChannelMute(Channel, bool),
    StreamButton(ButtonState),
    RecordButton(ButtonState),
    StatusText(String),
    /// Release UI resources and exit
    Close,
}

impl RenderCommand {
    pub fn scene_list(mirror: &StateMirror) -> Self {
        RenderCommand::SceneList {
            names: mirror.scenes().to_vec(),
            selected: mirror.displayed_scene_index(),
        }
    }

    pub fn source_list(mirror: &StateMirror) -> Self {
        RenderCommand::SourceList {
            names: mirror.source_names(),
            selected: mirror.selected_indices(),
        }
    }

    pub fn current_scene(mirror: &StateMirror) -> Self {
        RenderCommand::CurrentScene(mirror.current_scene().unwrap_or_default().to_string())
    }

    /// Volume slider and mute glyph for one channel
    pub fn channel(mirror: &StateMirror, channel: Channel) -> [Self; 2] {
        let audio = mirror.channel(channel);
        [
            RenderCommand::ChannelVolume(channel, volume_percent(audio.volume)),
            RenderCommand::ChannelMute(channel, audio.muted),
        ]
    }
}

/// Convert a linear volume in [0, 1] to a slider position
pub fn volume_percent(volume: f64) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Sending half of the render channel
#[derive(Debug, Clone)]
pub struct Ui {
    tx: mpsc::UnboundedSender<RenderCommand>,
}

impl Ui {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RenderCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, command: RenderCommand) {
        // The UI may already be gone during shutdown
        let _ = self.tx.send(command);
    }

    pub fn send_all(&self, commands: impl IntoIterator<Item = RenderCommand>) {
        for command in commands {
            self.send(command);
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(RenderCommand::StatusText(text.into()));
    }
}
