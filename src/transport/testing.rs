//! In-memory transport backed by a scripted server state

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    Event, EventKind, EventStream, Request, Response, SceneInfo, SceneItem, SceneList,
    SpecialSources, Transport, VolumeInfo,
};
use crate::error::TransportError;

#[derive(Default)]
struct ServerState {
    connected: bool,
    fail_connect: bool,
    studio_mode: bool,
    scenes: SceneList,
    special: SpecialSources,
    volumes: HashMap<String, VolumeInfo>,
    transition: String,
    rejected_sources: HashSet<String>,
    call_delay: Duration,
    calls: Vec<Request>,
    subscription: Option<(HashSet<EventKind>, mpsc::UnboundedSender<Event>)>,
    connects: usize,
}

/// Fake server for session tests
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ServerState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Three scenes, "Game" current with two visible sources, mic and desktop inputs
    pub fn with_game_setup() -> Self {
        let transport = Self::new();
        transport.set_scenes(SceneList {
            current_scene: "Game".to_string(),
            scenes: vec![
                SceneInfo {
                    name: "Starting".to_string(),
                    sources: vec![SceneItem::new("Countdown", 1, true)],
                },
                SceneInfo {
                    name: "Game".to_string(),
                    sources: vec![
                        SceneItem::new("Capture", 2, true),
                        SceneItem::new("Webcam", 3, true),
                    ],
                },
                SceneInfo {
                    name: "Intermission".to_string(),
                    sources: vec![SceneItem::new("Slate", 4, true)],
                },
            ],
        });
        transport.set_special(SpecialSources {
            mic: Some("Mic/Aux".to_string()),
            desktop: Some("Desktop Audio".to_string()),
        });
        transport.set_volume(
            "Mic/Aux",
            VolumeInfo {
                volume: 0.8,
                muted: false,
            },
        );
        transport.set_volume(
            "Desktop Audio",
            VolumeInfo {
                volume: 0.5,
                muted: false,
            },
        );
        transport.state().transition = "Fade".to_string();
        transport
    }

    pub fn set_scenes(&self, scenes: SceneList) {
        self.state().scenes = scenes;
    }

    pub fn set_special(&self, special: SpecialSources) {
        self.state().special = special;
    }

    pub fn set_volume(&self, input: &str, info: VolumeInfo) {
        self.state().volumes.insert(input.to_string(), info);
    }

    pub fn volume(&self, input: &str) -> Option<VolumeInfo> {
        self.state().volumes.get(input).copied()
    }

    pub fn set_studio_mode(&self, enabled: bool) {
        self.state().studio_mode = enabled;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn set_call_delay(&self, delay: Duration) {
        self.state().call_delay = delay;
    }

    /// Make `SetSourceRender` for `source` fail with a protocol error
    pub fn reject_source(&self, source: &str) {
        self.state().rejected_sources.insert(source.to_string());
    }

    pub fn calls(&self) -> Vec<Request> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Push an event to the current subscriber; returns false if nobody receives it
    pub fn emit(&self, event: Event) -> bool {
        let state = self.state();
        match &state.subscription {
            Some((kinds, tx)) if kinds.contains(&event.kind()) => tx.send(event).is_ok(),
            _ => false,
        }
    }

    fn respond(&self, request: &Request) -> Result<Response, TransportError> {
        let mut state = self.state();
        match request {
            Request::GetSpecialSources => Ok(Response::SpecialSources(state.special.clone())),
            Request::GetSceneList => Ok(Response::SceneList(state.scenes.clone())),
            Request::GetStudioModeStatus => Ok(Response::StudioMode(state.studio_mode)),
            Request::GetCurrentTransition => Ok(Response::Transition(state.transition.clone())),
            Request::GetVolume { source } => state
                .volumes
                .get(source)
                .copied()
                .map(Response::Volume)
                .ok_or_else(|| no_such_input(request, source)),
            Request::SetVolume { source, volume } => {
                let entry = state
                    .volumes
                    .get_mut(source)
                    .ok_or_else(|| no_such_input(request, source))?;
                entry.volume = *volume;
                Ok(Response::Ok)
            }
            Request::SetMute { source, muted } => {
                let entry = state
                    .volumes
                    .get_mut(source)
                    .ok_or_else(|| no_such_input(request, source))?;
                entry.muted = *muted;
                Ok(Response::Ok)
            }
            Request::ToggleMute { source } => {
                let entry = state
                    .volumes
                    .get_mut(source)
                    .ok_or_else(|| no_such_input(request, source))?;
                entry.muted = !entry.muted;
                Ok(Response::Ok)
            }
            Request::SetSourceRender { source, .. } if state.rejected_sources.contains(source) => {
                Err(TransportError::Protocol {
                    request: request.name(),
                    message: format!("source '{}' rejected", source),
                })
            }
            Request::SetCurrentScene { scene } => {
                state.scenes.current_scene = scene.clone();
                Ok(Response::Ok)
            }
            _ => Ok(Response::Ok),
        }
    }
}

fn no_such_input(request: &Request, source: &str) -> TransportError {
    TransportError::Protocol {
        request: request.name(),
        message: format!("no input named '{}'", source),
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(TransportError::Connection {
                address: "scripted".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        state.connected = false;
        state.subscription = None;
    }

    async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let delay = {
            let mut state = self.state();
            if !state.connected {
                return Err(TransportError::Disconnected);
            }
            state.calls.push(request.clone());
            state.call_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.respond(&request)
    }

    fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream, TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscription = Some((kinds.iter().copied().collect(), tx));
        Ok(rx)
    }
}
