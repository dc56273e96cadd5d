//! Logical request, response and event types of the control protocol

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One item (source) placed in a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItem {
    /// Source name, unique within its scene
    pub name: String,
    /// Server-assigned item id, increasing as items are created
    pub item_id: i64,
    /// Whether the item is rendered
    pub visible: bool,
}

impl SceneItem {
    pub fn new(name: impl Into<String>, item_id: i64, visible: bool) -> Self {
        Self {
            name: name.into(),
            item_id,
            visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub name: String,
    pub sources: Vec<SceneItem>,
}

/// Response to `GetSceneList`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneList {
    pub current_scene: String,
    pub scenes: Vec<SceneInfo>,
}

/// Input names of the server's well-known audio devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialSources {
    pub mic: Option<String>,
    pub desktop: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Linear volume in [0, 1]
    pub volume: f64,
    pub muted: bool,
}

/// Heartbeat payload sent while the server is live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub streaming: bool,
    pub recording: bool,
    pub fps: f64,
    pub kbits_per_sec: u64,
    pub num_dropped_frames: u64,
    /// Dropped frame share in percent
    pub strain: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetSpecialSources,
    GetSceneList,
    GetVolume { source: String },
    SetVolume { source: String, volume: f64 },
    ToggleMute { source: String },
    SetMute { source: String, muted: bool },
    SetCurrentScene { scene: String },
    SetSourceRender {
        scene: Option<String>,
        source: String,
        visible: bool,
    },
    GetCurrentTransition,
    TransitionToProgram { transition: Option<String> },
    GetStudioModeStatus,
    StartStopStreaming,
    StartStopRecording,
}

impl Request {
    /// Protocol name of the request, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetSpecialSources => "GetSpecialSources",
            Request::GetSceneList => "GetSceneList",
            Request::GetVolume { .. } => "GetVolume",
            Request::SetVolume { .. } => "SetVolume",
            Request::ToggleMute { .. } => "ToggleMute",
            Request::SetMute { .. } => "SetMute",
            Request::SetCurrentScene { .. } => "SetCurrentScene",
            Request::SetSourceRender { .. } => "SetSourceRender",
            Request::GetCurrentTransition => "GetCurrentTransition",
            Request::TransitionToProgram { .. } => "TransitionToProgram",
            Request::GetStudioModeStatus => "GetStudioModeStatus",
            Request::StartStopStreaming => "StartStopStreaming",
            Request::StartStopRecording => "StartStopRecording",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Request accepted, no payload
    Ok,
    SpecialSources(SpecialSources),
    SceneList(SceneList),
    Volume(VolumeInfo),
    /// Name of the current transition
    Transition(String),
    StudioMode(bool),
}

impl Response {
    fn unexpected(self, request: &'static str) -> TransportError {
        TransportError::Protocol {
            request,
            message: format!("unexpected response {:?}", self),
        }
    }

    pub fn into_special_sources(self) -> Result<SpecialSources, TransportError> {
        match self {
            Response::SpecialSources(sources) => Ok(sources),
            other => Err(other.unexpected("GetSpecialSources")),
        }
    }

    pub fn into_scene_list(self) -> Result<SceneList, TransportError> {
        match self {
            Response::SceneList(list) => Ok(list),
            other => Err(other.unexpected("GetSceneList")),
        }
    }

    pub fn into_volume(self) -> Result<VolumeInfo, TransportError> {
        match self {
            Response::Volume(volume) => Ok(volume),
            other => Err(other.unexpected("GetVolume")),
        }
    }

    pub fn into_transition(self) -> Result<String, TransportError> {
        match self {
            Response::Transition(name) => Ok(name),
            other => Err(other.unexpected("GetCurrentTransition")),
        }
    }

    pub fn into_studio_mode(self) -> Result<bool, TransportError> {
        match self {
            Response::StudioMode(enabled) => Ok(enabled),
            other => Err(other.unexpected("GetStudioModeStatus")),
        }
    }
}

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StudioModeSwitched { enabled: bool },
    /// Program scene changed
    SwitchScenes { scene: String, sources: Vec<SceneItem> },
    PreviewSceneChanged { scene: String, sources: Vec<SceneItem> },
    SceneItemAdded { scene: String, item: SceneItem },
    SceneItemRemoved { scene: String, item_name: String },
    SceneItemVisibilityChanged {
        scene: String,
        item_name: String,
        visible: bool,
    },
    SceneCollectionChanged,
    StreamStarting,
    StreamStarted,
    StreamStopping,
    StreamStopped,
    RecordingStarting,
    RecordingStarted,
    RecordingStopping,
    RecordingStopped,
    StreamStatus(StreamStats),
    Exiting,
}

/// Event discriminant, used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StudioModeSwitched,
    SwitchScenes,
    PreviewSceneChanged,
    SceneItemAdded,
    SceneItemRemoved,
    SceneItemVisibilityChanged,
    SceneCollectionChanged,
    StreamStarting,
    StreamStarted,
    StreamStopping,
    StreamStopped,
    RecordingStarting,
    RecordingStarted,
    RecordingStopping,
    RecordingStopped,
    StreamStatus,
    Exiting,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StudioModeSwitched { .. } => EventKind::StudioModeSwitched,
            Event::SwitchScenes { .. } => EventKind::SwitchScenes,
            Event::PreviewSceneChanged { .. } => EventKind::PreviewSceneChanged,
            Event::SceneItemAdded { .. } => EventKind::SceneItemAdded,
            Event::SceneItemRemoved { .. } => EventKind::SceneItemRemoved,
            Event::SceneItemVisibilityChanged { .. } => EventKind::SceneItemVisibilityChanged,
            Event::SceneCollectionChanged => EventKind::SceneCollectionChanged,
            Event::StreamStarting => EventKind::StreamStarting,
            Event::StreamStarted => EventKind::StreamStarted,
            Event::StreamStopping => EventKind::StreamStopping,
            Event::StreamStopped => EventKind::StreamStopped,
            Event::RecordingStarting => EventKind::RecordingStarting,
            Event::RecordingStarted => EventKind::RecordingStarted,
            Event::RecordingStopping => EventKind::RecordingStopping,
            Event::RecordingStopped => EventKind::RecordingStopped,
            Event::StreamStatus(_) => EventKind::StreamStatus,
            Event::Exiting => EventKind::Exiting,
        }
    }
}
