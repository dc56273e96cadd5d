//! Event reconciliation
//!
//! One handler per server event. Handlers mutate the mirror and return the
//! render commands to send, plus an optional follow-up the session runs on
//! its own task. Handlers never talk to the transport, so a slow call can
//! never hold up event delivery.

use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::mirror::{OutputState, StateMirror};
use crate::render::RenderCommand;
use crate::transport::{Event, EventKind, SceneItem, StreamStats};

/// Every event kind [`apply`] handles; subscribed once per connection
pub const HANDLED_EVENTS: &[EventKind] = &[
    EventKind::StudioModeSwitched,
    EventKind::SwitchScenes,
    EventKind::PreviewSceneChanged,
    EventKind::SceneItemAdded,
    EventKind::SceneItemRemoved,
    EventKind::SceneItemVisibilityChanged,
    EventKind::SceneCollectionChanged,
    EventKind::StreamStarting,
    EventKind::StreamStarted,
    EventKind::StreamStopping,
    EventKind::StreamStopped,
    EventKind::RecordingStarting,
    EventKind::RecordingStarted,
    EventKind::RecordingStopping,
    EventKind::RecordingStopped,
    EventKind::StreamStatus,
    EventKind::Exiting,
];

/// Delayed mic action scheduled after a program scene switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicAction {
    Mute,
    Unmute,
}

impl MicAction {
    /// Unmute when switching to the trigger scene, mute on any other scene
    pub fn for_scene(scene: &str, trigger_scene: &str) -> Self {
        if scene == trigger_scene {
            MicAction::Unmute
        } else {
            MicAction::Mute
        }
    }

    pub fn muted(self) -> bool {
        matches!(self, MicAction::Mute)
    }
}

/// Work an event asks the session to do outside the delivery path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Replace any pending mic action with this one
    ScheduleMic(MicAction),
    /// Re-fetch the scene list after the collection changed
    RefetchScenes,
    /// The server is going away
    Shutdown,
}

#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub renders: Vec<RenderCommand>,
    pub follow_up: Option<FollowUp>,
}

impl Outcome {
    fn render(renders: Vec<RenderCommand>) -> Self {
        Self {
            renders,
            follow_up: None,
        }
    }

    fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

/// Apply one event to the mirror
pub fn apply(
    mirror: &mut StateMirror,
    event: &Event,
    trigger_scene: &str,
) -> Result<Outcome, ReconcileError> {
    match event {
        Event::StudioModeSwitched { enabled } => {
            debug!("studio mode switched: {}", enabled);
            mirror.set_studio_mode(*enabled);
            Ok(Outcome::default())
        }
        Event::SwitchScenes { scene, sources } => {
            Ok(on_switch_scenes(mirror, scene, sources, trigger_scene))
        }
        Event::PreviewSceneChanged { scene, sources } => {
            debug!("preview scene changed: {}", scene);
            mirror.ensure_scene(scene);
            mirror.display_scene(scene, sources);
            Ok(Outcome::render(vec![
                RenderCommand::scene_list(mirror),
                RenderCommand::source_list(mirror),
            ]))
        }
        Event::SceneItemAdded { scene, item } => Ok(on_item_added(mirror, scene, item)),
        Event::SceneItemRemoved { scene, item_name } => {
            on_item_removed(mirror, scene, item_name)
        }
        Event::SceneItemVisibilityChanged {
            scene,
            item_name,
            visible,
        } => on_visibility_changed(mirror, scene, item_name, *visible),
        Event::SceneCollectionChanged => {
            info!("Scene collection changed, clearing scenes");
            mirror.clear_scenes();
            Ok(Outcome::render(vec![
                RenderCommand::scene_list(mirror),
                RenderCommand::source_list(mirror),
                RenderCommand::current_scene(mirror),
            ])
            .with_follow_up(FollowUp::RefetchScenes))
        }
        Event::StreamStarting => Ok(set_streaming(mirror, OutputState::Starting)),
        Event::StreamStarted => Ok(set_streaming(mirror, OutputState::On)),
        Event::StreamStopping => Ok(set_streaming(mirror, OutputState::Stopping)),
        Event::StreamStopped => Ok(set_streaming(mirror, OutputState::Off)),
        Event::RecordingStarting => Ok(set_recording(mirror, OutputState::Starting)),
        Event::RecordingStarted => Ok(set_recording(mirror, OutputState::On)),
        Event::RecordingStopping => Ok(set_recording(mirror, OutputState::Stopping)),
        Event::RecordingStopped => Ok(set_recording(mirror, OutputState::Off)),
        Event::StreamStatus(stats) => Ok(on_heartbeat(mirror, stats)),
        Event::Exiting => {
            info!("Server is exiting");
            Ok(Outcome::default().with_follow_up(FollowUp::Shutdown))
        }
    }
}

fn on_switch_scenes(
    mirror: &mut StateMirror,
    scene: &str,
    sources: &[SceneItem],
    trigger_scene: &str,
) -> Outcome {
    debug!("scene switched: {}", scene);

    let listed = mirror.ensure_scene(scene);
    if listed {
        warn!("Switched to scene '{}' missing from the scene list", scene);
    }

    let mut renders = Vec::new();
    if !mirror.studio_mode() {
        mirror.display_scene(scene, sources);
        renders.push(RenderCommand::scene_list(mirror));
        renders.push(RenderCommand::source_list(mirror));
    } else if listed {
        renders.push(RenderCommand::scene_list(mirror));
    }

    mirror.set_current_scene(Some(scene.to_string()));
    renders.push(RenderCommand::current_scene(mirror));

    Outcome::render(renders).with_follow_up(FollowUp::ScheduleMic(MicAction::for_scene(
        scene,
        trigger_scene,
    )))
}

fn on_item_added(mirror: &mut StateMirror, scene: &str, item: &SceneItem) -> Outcome {
    if !mirror.is_displayed(scene) {
        return Outcome::default();
    }

    // New items are rendered by default
    let item = SceneItem {
        visible: true,
        ..item.clone()
    };
    if !mirror.insert_source(&item) {
        debug!("add_source: {} already listed", item.name);
        return Outcome::default();
    }

    debug!("add_source: {}", item.name);
    Outcome::render(vec![RenderCommand::source_list(mirror)])
}

fn on_item_removed(
    mirror: &mut StateMirror,
    scene: &str,
    item_name: &str,
) -> Result<Outcome, ReconcileError> {
    if !mirror.is_displayed(scene) {
        return Ok(Outcome::default());
    }

    mirror
        .remove_source(item_name)
        .ok_or_else(|| unknown_source(scene, item_name))?;

    debug!("del_source: {}", item_name);
    Ok(Outcome::render(vec![RenderCommand::source_list(mirror)]))
}

fn on_visibility_changed(
    mirror: &mut StateMirror,
    scene: &str,
    item_name: &str,
    visible: bool,
) -> Result<Outcome, ReconcileError> {
    if !mirror.is_displayed(scene) {
        return Ok(Outcome::default());
    }

    let changed = mirror
        .set_source_visible(item_name, visible)
        .ok_or_else(|| unknown_source(scene, item_name))?;

    if !changed {
        return Ok(Outcome::default());
    }

    debug!("source visibility changed: {} -> {}", item_name, visible);
    Ok(Outcome::render(vec![RenderCommand::source_list(mirror)]))
}

fn set_streaming(mirror: &mut StateMirror, state: OutputState) -> Outcome {
    debug!("stream status changed: {:?}", state);
    mirror.set_streaming(state);
    Outcome::render(vec![RenderCommand::StreamButton(state.into())])
}

fn set_recording(mirror: &mut StateMirror, state: OutputState) -> Outcome {
    debug!("recording status changed: {:?}", state);
    mirror.set_recording(state);
    Outcome::render(vec![RenderCommand::RecordButton(state.into())])
}

fn on_heartbeat(mirror: &mut StateMirror, stats: &StreamStats) -> Outcome {
    let streaming = if stats.streaming {
        OutputState::On
    } else {
        OutputState::Off
    };
    let recording = if stats.recording {
        OutputState::On
    } else {
        OutputState::Off
    };
    mirror.set_streaming(streaming);
    mirror.set_recording(recording);
    mirror.set_heartbeat(stats.clone());

    let text = status_text(stats);
    debug!("{}", text);

    Outcome::render(vec![
        RenderCommand::StreamButton(streaming.into()),
        RenderCommand::RecordButton(recording.into()),
        RenderCommand::StatusText(text),
    ])
}

/// Status bar line for a heartbeat
pub fn status_text(stats: &StreamStats) -> String {
    format!(
        "FPS: {:.1}, Bitrate: {}, dropped frames {} ({:.2} %)",
        stats.fps, stats.kbits_per_sec, stats.num_dropped_frames, stats.strain
    )
}

fn unknown_source(scene: &str, source: &str) -> ReconcileError {
    ReconcileError::UnknownSource {
        scene: scene.to_string(),
        source_name: source.to_string(),
    }
}
