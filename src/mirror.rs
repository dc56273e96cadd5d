//! Local mirror of the server state
//!
//! The mirror is the only place scene, source, audio and output state lives.
//! Event handlers, the volume poller and operator commands all go through it.
//! Sources are keyed by name; list positions and the selected-index set are
//! derived from the ordered list on demand and never stored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::transport::{SceneItem, StreamStats, VolumeInfo};

/// The two well-known audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Mic,
    Desktop,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Mic, Channel::Desktop];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Mic => write!(f, "mic"),
            Channel::Desktop => write!(f, "desktop"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioChannel {
    /// Server input backing this channel, learned from the special sources
    pub input: Option<String>,
    pub volume: f64,
    pub muted: bool,
}

/// Streaming or recording output state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum OutputState {
    #[default]
    Off,
    Starting,
    On,
    Stopping,
}

impl OutputState {
    pub fn is_transitioning(self) -> bool {
        matches!(self, OutputState::Starting | OutputState::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub item_id: i64,
    pub visible: bool,
}

impl From<&SceneItem> for Source {
    fn from(item: &SceneItem) -> Self {
        Self {
            name: item.name.clone(),
            item_id: item.item_id,
            visible: item.visible,
        }
    }
}

/// Last heartbeat received from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub stats: StreamStats,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StateMirror {
    /// Scene names in server order
    scenes: Vec<String>,
    /// Program scene
    current_scene: Option<String>,
    /// Scene selected in the scene list and whose sources are shown
    displayed_scene: Option<String>,
    /// Sources of the displayed scene, in display order
    sources: Vec<Source>,
    studio_mode: bool,
    mic: AudioChannel,
    desktop: AudioChannel,
    streaming: OutputState,
    recording: OutputState,
    heartbeat: Option<Heartbeat>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    // --- scenes ---

    pub fn scenes(&self) -> &[String] {
        &self.scenes
    }

    pub fn set_scenes(&mut self, scenes: Vec<String>) {
        self.scenes = scenes;
    }

    /// Make sure `scene` is listed, appending it if the server never reported it
    ///
    /// Returns true if the scene had to be added.
    pub fn ensure_scene(&mut self, scene: &str) -> bool {
        if self.scenes.iter().any(|s| s == scene) {
            return false;
        }
        self.scenes.push(scene.to_string());
        true
    }

    pub fn current_scene(&self) -> Option<&str> {
        self.current_scene.as_deref()
    }

    pub fn set_current_scene(&mut self, scene: Option<String>) {
        self.current_scene = scene;
    }

    pub fn displayed_scene(&self) -> Option<&str> {
        self.displayed_scene.as_deref()
    }

    /// Position of the displayed scene in the scene list
    pub fn displayed_scene_index(&self) -> Option<usize> {
        let displayed = self.displayed_scene.as_deref()?;
        self.scenes.iter().position(|s| s == displayed)
    }

    /// Show `scene` in the scene list and replace the source list with `items`
    pub fn display_scene(&mut self, scene: &str, items: &[SceneItem]) {
        self.displayed_scene = Some(scene.to_string());
        self.sources = items.iter().map(Source::from).collect();
    }

    pub fn is_displayed(&self, scene: &str) -> bool {
        self.displayed_scene.as_deref() == Some(scene)
    }

    // --- sources ---

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Indices of visible sources, computed from the current list
    pub fn selected_indices(&self) -> BTreeSet<usize> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.visible)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Add a source to the displayed scene
    ///
    /// New sources land at the end of the list. Among the trailing sources the
    /// list is kept in item-id order, so additions that race each other settle
    /// in the same order whatever order they were delivered in. Returns false
    /// if a source with that name is already listed.
    pub fn insert_source(&mut self, item: &SceneItem) -> bool {
        if self.source(&item.name).is_some() {
            return false;
        }
        let mut position = self.sources.len();
        while position > 0 && self.sources[position - 1].item_id > item.item_id {
            position -= 1;
        }
        self.sources.insert(position, Source::from(item));
        true
    }

    /// Remove a source by name, returning it if it was listed
    pub fn remove_source(&mut self, name: &str) -> Option<Source> {
        let index = self.sources.iter().position(|s| s.name == name)?;
        Some(self.sources.remove(index))
    }

    /// Set a source's visibility
    ///
    /// Returns `None` if the source is unknown, otherwise whether the flag changed.
    pub fn set_source_visible(&mut self, name: &str, visible: bool) -> Option<bool> {
        let source = self.sources.iter_mut().find(|s| s.name == name)?;
        let changed = source.visible != visible;
        source.visible = visible;
        Some(changed)
    }

    /// Drop all scene and source state
    pub fn clear_scenes(&mut self) {
        self.scenes.clear();
        self.sources.clear();
        self.current_scene = None;
        self.displayed_scene = None;
    }

    // --- studio mode ---

    pub fn studio_mode(&self) -> bool {
        self.studio_mode
    }

    pub fn set_studio_mode(&mut self, enabled: bool) {
        self.studio_mode = enabled;
    }

    // --- audio ---

    pub fn channel(&self, channel: Channel) -> &AudioChannel {
        match channel {
            Channel::Mic => &self.mic,
            Channel::Desktop => &self.desktop,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut AudioChannel {
        match channel {
            Channel::Mic => &mut self.mic,
            Channel::Desktop => &mut self.desktop,
        }
    }

    pub fn set_channel_input(&mut self, channel: Channel, input: Option<String>) {
        self.channel_mut(channel).input = input;
    }

    pub fn apply_volume(&mut self, channel: Channel, info: VolumeInfo) {
        let audio = self.channel_mut(channel);
        audio.volume = info.volume.clamp(0.0, 1.0);
        audio.muted = info.muted;
    }

    // --- outputs ---

    pub fn streaming(&self) -> OutputState {
        self.streaming
    }

    pub fn set_streaming(&mut self, state: OutputState) {
        self.streaming = state;
    }

    pub fn recording(&self) -> OutputState {
        self.recording
    }

    pub fn set_recording(&mut self, state: OutputState) {
        self.recording = state;
    }

    pub fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_ref()
    }

    pub fn set_heartbeat(&mut self, stats: StreamStats) {
        self.heartbeat = Some(Heartbeat {
            stats,
            received_at: Utc::now(),
        });
    }
}
