//! OBS WebSocket transport built on `obws`
//!
//! obs-websocket v5 addresses scene items by id and has no periodic stats
//! event, so this adapter resolves item names itself and synthesizes the
//! heartbeat from the stats and output status requests.

use futures::StreamExt;
use obws::events::{Event as ObsEvent, OutputState};
use obws::Client;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    Event, EventKind, EventStream, Request, Response, SceneInfo, SceneItem, SceneList,
    SpecialSources, StreamStats, Transport, VolumeInfo,
};
use crate::config::ObsConfig;
use crate::error::TransportError;

/// Interval of the synthesized `StreamStatus` heartbeat
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

pub struct ObsWebSocket {
    config: ObsConfig,
    client: RwLock<Option<Arc<Client>>>,
    forwarder: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ObsWebSocket {
    pub fn new(config: ObsConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            forwarder: std::sync::Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<Arc<Client>, TransportError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(TransportError::Disconnected)
    }

    fn stop_forwarder(&self) {
        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
    }
}

fn protocol_error(request: &'static str) -> impl FnOnce(obws::error::Error) -> TransportError {
    move |e| TransportError::Protocol {
        request,
        message: e.to_string(),
    }
}

impl Transport for ObsWebSocket {
    async fn connect(&self) -> Result<(), TransportError> {
        self.disconnect().await;

        let client = Client::connect(
            &self.config.host,
            self.config.port,
            self.config.password.as_deref(),
        )
        .await
        .map_err(|e| TransportError::Connection {
            address: self.config.address(),
            reason: e.to_string(),
        })?;

        info!("Connected to OBS WebSocket at {}", self.config.address());
        *self.client.write().await = Some(Arc::new(client));
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop_forwarder();
        // Dropping the last handle closes the socket
        if self.client.write().await.take().is_some() {
            debug!("OBS WebSocket client dropped");
        }
    }

    async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let client = self.client().await?;
        let name = request.name();
        let err = protocol_error(name);

        match request {
            Request::GetSpecialSources => {
                let specials = client.inputs().specials().await.map_err(err)?;
                Ok(Response::SpecialSources(SpecialSources {
                    mic: specials.mic1,
                    desktop: specials.desktop1,
                }))
            }
            Request::GetSceneList => {
                let list = client.scenes().list().await.map_err(err)?;
                let current_scene = list
                    .current_program_scene
                    .map(|id| id.name)
                    .unwrap_or_default();
                // v5 lists scenes bottom-up
                let mut scenes = Vec::with_capacity(list.scenes.len());
                for scene in list.scenes.into_iter().rev() {
                    let sources = scene_items(&client, &scene.id.name).await.map_err(
                        protocol_error(name),
                    )?;
                    scenes.push(SceneInfo {
                        name: scene.id.name,
                        sources,
                    });
                }
                Ok(Response::SceneList(SceneList {
                    current_scene,
                    scenes,
                }))
            }
            Request::GetVolume { source } => {
                let inputs = client.inputs();
                let volume = inputs.volume(source.as_str().into()).await.map_err(err)?;
                let muted = inputs
                    .muted(source.as_str().into())
                    .await
                    .map_err(protocol_error(name))?;
                Ok(Response::Volume(VolumeInfo {
                    volume: f64::from(volume.mul),
                    muted,
                }))
            }
            Request::SetVolume { source, volume } => {
                client
                    .inputs()
                    .set_volume(
                        source.as_str().into(),
                        obws::requests::inputs::Volume::Mul(volume as f32),
                    )
                    .await
                    .map_err(err)?;
                Ok(Response::Ok)
            }
            Request::ToggleMute { source } => {
                client
                    .inputs()
                    .toggle_mute(source.as_str().into())
                    .await
                    .map_err(err)?;
                Ok(Response::Ok)
            }
            Request::SetMute { source, muted } => {
                client
                    .inputs()
                    .set_muted(source.as_str().into(), muted)
                    .await
                    .map_err(err)?;
                Ok(Response::Ok)
            }
            Request::SetCurrentScene { scene } => {
                client
                    .scenes()
                    .set_current_program_scene(scene.as_str())
                    .await
                    .map_err(err)?;
                Ok(Response::Ok)
            }
            Request::SetSourceRender {
                scene,
                source,
                visible,
            } => {
                let scene = match scene {
                    Some(scene) => scene,
                    None => {
                        client
                            .scenes()
                            .current_program_scene()
                            .await
                            .map_err(protocol_error(name))?
                            .id
                            .name
                    }
                };
                let item_id = client
                    .scene_items()
                    .id(obws::requests::scene_items::Id {
                        scene: scene.as_str().into(),
                        source: &source,
                        search_offset: None,
                    })
                    .await
                    .map_err(protocol_error(name))?;
                client
                    .scene_items()
                    .set_enabled(obws::requests::scene_items::SetEnabled {
                        scene: scene.as_str().into(),
                        item_id,
                        enabled: visible,
                    })
                    .await
                    .map_err(err)?;
                Ok(Response::Ok)
            }
            Request::GetCurrentTransition => {
                let transition = client.transitions().current().await.map_err(err)?;
                Ok(Response::Transition(transition.id.name))
            }
            Request::TransitionToProgram { transition } => {
                if let Some(transition) = transition {
                    client
                        .transitions()
                        .set_current(&transition)
                        .await
                        .map_err(protocol_error(name))?;
                }
                client.transitions().trigger().await.map_err(err)?;
                Ok(Response::Ok)
            }
            Request::GetStudioModeStatus => {
                let enabled = client.ui().studio_mode_enabled().await.map_err(err)?;
                Ok(Response::StudioMode(enabled))
            }
            Request::StartStopStreaming => {
                client.streaming().toggle().await.map_err(err)?;
                Ok(Response::Ok)
            }
            Request::StartStopRecording => {
                client.recording().toggle().await.map_err(err)?;
                Ok(Response::Ok)
            }
        }
    }

    fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream, TransportError> {
        let client = self
            .client
            .try_read()
            .ok()
            .and_then(|client| client.clone())
            .ok_or(TransportError::Disconnected)?;
        let raw_events = client.events().map_err(|e| TransportError::Protocol {
            request: "Subscribe",
            message: e.to_string(),
        })?;

        let kinds: HashSet<EventKind> = kinds.iter().copied().collect();
        let (tx, rx) = mpsc::unbounded_channel();

        self.stop_forwarder();
        let handle = tokio::spawn(async move {
            tokio::pin!(raw_events);
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            let mut last_bytes = 0u64;

            loop {
                let event = tokio::select! {
                    event = raw_events.next() => match event {
                        Some(event) => translate(&client, event).await,
                        None => break,
                    },
                    _ = heartbeat.tick(), if kinds.contains(&EventKind::StreamStatus) => {
                        match stream_stats(&client, &mut last_bytes).await {
                            Ok(stats) => Some(Event::StreamStatus(stats)),
                            Err(e) => {
                                warn!("Failed to read output stats: {}", e);
                                None
                            }
                        }
                    }
                };

                let Some(event) = event else { continue };
                if !kinds.contains(&event.kind()) {
                    continue;
                }
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("OBS event stream ended");
        });

        *self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(rx)
    }
}

/// Items of `scene` with their visibility, in display order
async fn scene_items(client: &Client, scene: &str) -> Result<Vec<SceneItem>, obws::error::Error> {
    let items = client.scene_items().list(scene.into()).await?;
    let mut sources = Vec::with_capacity(items.len());
    // v5 lists items bottom-up
    for item in items.into_iter().rev() {
        let visible = client.scene_items().enabled(scene.into(), item.id).await?;
        sources.push(SceneItem::new(item.source_name, item.id, visible));
    }
    Ok(sources)
}

async fn item_name(client: &Client, scene: &str, item_id: i64) -> Result<String, obws::error::Error> {
    let items = client.scene_items().list(scene.into()).await?;
    Ok(items
        .into_iter()
        .find(|item| item.id == item_id)
        .map(|item| item.source_name)
        .unwrap_or_default())
}

async fn stream_stats(client: &Client, last_bytes: &mut u64) -> Result<StreamStats, obws::error::Error> {
    let stats = client.general().stats().await?;
    let stream = client.streaming().status().await?;
    let record = client.recording().status().await?;

    let bytes = stream.bytes;
    let delta = bytes.saturating_sub(*last_bytes);
    *last_bytes = bytes;
    let kbits_per_sec = delta * 8 / 1000 / HEARTBEAT_INTERVAL.as_secs().max(1);

    let strain = if stream.total_frames > 0 {
        f64::from(stream.skipped_frames) / f64::from(stream.total_frames) * 100.0
    } else {
        0.0
    };

    Ok(StreamStats {
        streaming: stream.active,
        recording: record.active,
        fps: stats.active_fps,
        kbits_per_sec,
        num_dropped_frames: u64::from(stream.skipped_frames),
        strain,
    })
}

/// Map a v5 event onto the logical event set, resolving names where needed
async fn translate(client: &Client, event: ObsEvent) -> Option<Event> {
    let translated = match event {
        ObsEvent::StudioModeStateChanged { enabled } => Event::StudioModeSwitched { enabled },
        ObsEvent::CurrentProgramSceneChanged { id } => {
            let sources = lookup(scene_items(client, &id.name).await)?;
            Event::SwitchScenes {
                scene: id.name,
                sources,
            }
        }
        ObsEvent::CurrentPreviewSceneChanged { id } => {
            let sources = lookup(scene_items(client, &id.name).await)?;
            Event::PreviewSceneChanged {
                scene: id.name,
                sources,
            }
        }
        ObsEvent::SceneItemCreated {
            scene,
            source,
            item_id,
            ..
        } => Event::SceneItemAdded {
            scene: scene.name,
            item: SceneItem::new(source.name, item_id as i64, true),
        },
        ObsEvent::SceneItemRemoved { scene, source, .. } => Event::SceneItemRemoved {
            scene: scene.name,
            item_name: source.name,
        },
        ObsEvent::SceneItemEnableStateChanged {
            scene,
            item_id,
            enabled,
        } => {
            let item_name = lookup(item_name(client, &scene.name, item_id as i64).await)?;
            Event::SceneItemVisibilityChanged {
                scene: scene.name,
                item_name,
                visible: enabled,
            }
        }
        ObsEvent::CurrentSceneCollectionChanged { .. } => Event::SceneCollectionChanged,
        ObsEvent::StreamStateChanged { state, .. } => match state {
            OutputState::Starting => Event::StreamStarting,
            OutputState::Started => Event::StreamStarted,
            OutputState::Stopping => Event::StreamStopping,
            OutputState::Stopped => Event::StreamStopped,
            _ => return None,
        },
        ObsEvent::RecordStateChanged { state, .. } => match state {
            OutputState::Starting => Event::RecordingStarting,
            OutputState::Started => Event::RecordingStarted,
            OutputState::Stopping => Event::RecordingStopping,
            OutputState::Stopped => Event::RecordingStopped,
            _ => return None,
        },
        ObsEvent::ExitStarted => Event::Exiting,
        _ => return None,
    };
    Some(translated)
}

fn lookup<T>(result: Result<T, obws::error::Error>) -> Option<T> {
    result
        .map_err(|e| warn!("Failed to resolve event details: {}", e))
        .ok()
}
