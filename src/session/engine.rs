//! Session engine
//!
//! Owns the transport handle, the state mirror and the two timer tasks, and
//! runs the connection lifecycle:
//!
//! - `connect` tears down any previous connection, subscribes the reconciler's
//!   handler table, fetches the initial snapshot and only then starts the
//!   event dispatcher and the volume poller. Events that arrive during the
//!   snapshot wait in the stream and are applied after it, in order.
//! - One dispatcher task per connection applies events one at a time. The
//!   poller, the debounced mic action and operator commands write the mirror
//!   through the same lock, and none of them hold it across a transport call.
//! - Every background write checks the connection generation it started
//!   under, so work left over from a previous connection is discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::mirror::{Channel, StateMirror};
use crate::reconciler::{self, FollowUp, MicAction, HANDLED_EVENTS};
use crate::render::{RenderCommand, Ui};
use crate::scheduler::{Debouncer, Poller};
use crate::transport::{
    call_with_timeout, Event, EventStream, Request, Response, SceneList, SpecialSources,
    Transport, VolumeInfo,
};

pub(super) struct Inner<T> {
    pub(super) transport: T,
    pub(super) config: SessionConfig,
    pub(super) mirror: Mutex<StateMirror>,
    pub(super) ui: Ui,
    debouncer: Debouncer,
    poller: std::sync::Mutex<Option<Poller>>,
    dispatcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    connected: AtomicBool,
    /// Serializes connect, disconnect and shutdown
    lifecycle: Mutex<()>,
}

/// Handle to a remote-control session; clones share the same session
pub struct Session<T: Transport> {
    pub(super) inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig, ui: Ui) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                mirror: Mutex::new(StateMirror::new()),
                ui,
                debouncer: Debouncer::new(),
                poller: std::sync::Mutex::new(None),
                dispatcher: std::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Copy of the current mirror state
    pub async fn snapshot(&self) -> StateMirror {
        self.inner.mirror.lock().await.clone()
    }

    pub(super) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation && self.is_connected()
    }

    // --- lifecycle ---

    /// Connect to the server, replacing any existing connection
    ///
    /// A failure leaves the session disconnected with an empty mirror; there is
    /// no automatic retry.
    pub async fn connect(&self) -> SessionResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.teardown().await;

        info!("Connecting to server...");
        if let Err(e) = self.inner.transport.connect().await {
            error!("Failed to connect: {}", e);
            self.inner.ui.status(format!("Connection failed: {}", e));
            return Err(e.into());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.connected.store(true, Ordering::SeqCst);

        let events = match self.inner.transport.subscribe(HANDLED_EVENTS) {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to subscribe to server events: {}", e);
                self.teardown().await;
                self.inner.ui.status(format!("Connection failed: {}", e));
                return Err(e.into());
            }
        };

        if let Err(e) = self.init().await {
            error!("Initial state fetch failed: {}", e);
            self.teardown().await;
            self.inner.ui.status(format!("Connection failed: {}", e));
            return Err(e);
        }

        self.start_dispatcher(generation, events);
        self.start_poller(generation);

        info!("Connected (generation {})", generation);
        self.inner.ui.status("Connected");
        Ok(())
    }

    /// Drop the connection, keeping the UI open
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.teardown().await;
        self.inner.ui.status("Disconnected");
    }

    /// Shutdown path shared by operator quit and server exit
    pub async fn shutdown(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        info!("Shutting down session");
        self.teardown().await;
        self.inner.ui.send(RenderCommand::Close);
    }

    /// Stop timers and dispatcher, then disconnect and clear the mirror
    async fn teardown(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            poller.stop();
        }
        self.inner.debouncer.cancel();
        let dispatcher = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }

        if self.inner.connected.swap(false, Ordering::SeqCst) {
            self.inner.transport.disconnect().await;
            info!("Disconnected from server");
        }

        let mut mirror = self.inner.mirror.lock().await;
        *mirror = StateMirror::new();
        self.inner.ui.send_all([
            RenderCommand::scene_list(&mirror),
            RenderCommand::source_list(&mirror),
            RenderCommand::current_scene(&mirror),
        ]);
    }

    /// The event stream ended without us asking for it
    async fn connection_lost(&self, generation: u64) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if !self.is_current(generation) {
            return;
        }
        warn!("Connection to server lost");
        self.teardown().await;
        self.inner.ui.status("Connection lost");
    }

    /// Fetch studio mode and the scene list into a fresh mirror
    async fn init(&self) -> SessionResult<()> {
        debug!("init start");
        let studio_mode = self
            .call(Request::GetStudioModeStatus)
            .await?
            .into_studio_mode()?;
        let scenes = self.call(Request::GetSceneList).await?.into_scene_list()?;

        let mut mirror = self.inner.mirror.lock().await;
        mirror.set_studio_mode(studio_mode);
        let renders = apply_scene_list(&mut mirror, &scenes);
        self.inner.ui.send_all(renders);
        debug!(
            "init end: {} scenes, current '{}', studio mode {}",
            scenes.scenes.len(),
            scenes.current_scene,
            studio_mode
        );
        Ok(())
    }

    // --- transport ---

    /// Issue a request, bounded by the configured timeout
    pub(super) async fn call(&self, request: Request) -> Result<Response, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        debug!("-> {}", request.name());
        call_with_timeout(&self.inner.transport, request, self.inner.config.call_timeout()).await
    }

    // --- event delivery ---

    fn start_dispatcher(&self, generation: u64, mut events: EventStream) {
        let session = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !session.is_current(generation) {
                    return;
                }
                match session.handle_event(&event).await {
                    Some(FollowUp::Shutdown) => {
                        let session = session.clone();
                        tokio::spawn(async move { session.shutdown().await });
                        return;
                    }
                    Some(follow_up) => session.run_follow_up(generation, follow_up),
                    None => {}
                }
            }

            let session = session.clone();
            tokio::spawn(async move { session.connection_lost(generation).await });
        });

        *self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Apply one event under the mirror lock; handler errors are logged here
    async fn handle_event(&self, event: &Event) -> Option<FollowUp> {
        let mut mirror = self.inner.mirror.lock().await;
        match reconciler::apply(&mut mirror, event, &self.inner.config.trigger_scene) {
            Ok(outcome) => {
                self.inner.ui.send_all(outcome.renders);
                outcome.follow_up
            }
            Err(e) => {
                warn!("Ignoring {:?} event: {}", event.kind(), e);
                None
            }
        }
    }

    fn run_follow_up(&self, generation: u64, follow_up: FollowUp) {
        match follow_up {
            FollowUp::ScheduleMic(action) => self.schedule_mic(generation, action),
            FollowUp::RefetchScenes => {
                let session = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.refetch_scenes(generation).await {
                        error!("Failed to re-fetch scenes: {}", e);
                    }
                });
            }
            FollowUp::Shutdown => {
                let session = self.clone();
                tokio::spawn(async move { session.shutdown().await });
            }
        }
    }

    async fn refetch_scenes(&self, generation: u64) -> SessionResult<()> {
        let scenes = self.call(Request::GetSceneList).await?.into_scene_list()?;
        let mut mirror = self.inner.mirror.lock().await;
        if !self.is_current(generation) {
            return Ok(());
        }
        let renders = apply_scene_list(&mut mirror, &scenes);
        self.inner.ui.send_all(renders);
        info!("Scene list reloaded: {} scenes", scenes.scenes.len());
        Ok(())
    }

    // --- debounced mic action ---

    fn schedule_mic(&self, generation: u64, action: MicAction) {
        let delay = self.inner.config.mic_switch_delay();
        debug!("Scheduling mic {:?} in {:?}", action, delay);

        let session = self.clone();
        self.inner.debouncer.schedule(delay, async move {
            if !session.is_current(generation) {
                return;
            }
            if let Err(e) = session.set_mic_muted(generation, action.muted()).await {
                error!("Scheduled mic {:?} failed: {}", action, e);
            }
        });
    }

    async fn set_mic_muted(&self, generation: u64, muted: bool) -> SessionResult<()> {
        let input = self.channel_input(Channel::Mic).await?;
        self.call(Request::SetMute {
            source: input.clone(),
            muted,
        })
        .await?;
        info!("Mic {}", if muted { "muted" } else { "unmuted" });
        self.reload_channel(generation, Channel::Mic, &input).await
    }

    // --- audio ---

    fn start_poller(&self, generation: u64) {
        let session = self.clone();
        let poller = Poller::start(self.inner.config.volume_poll_interval(), move || {
            let session = session.clone();
            async move {
                if let Err(e) = session.refresh_audio(generation).await {
                    warn!("Volume poll failed: {}", e);
                }
            }
        });

        *self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(poller);
    }

    /// One poll cycle: special sources, then level and mute of both channels
    async fn refresh_audio(&self, generation: u64) -> SessionResult<()> {
        let special = self.refresh_special_sources().await?;
        for channel in Channel::ALL {
            let Some(input) = special_input(&special, channel) else {
                continue;
            };
            let info = self
                .call(Request::GetVolume {
                    source: input.to_string(),
                })
                .await?
                .into_volume()?;
            self.apply_volume(generation, channel, info).await;
        }
        Ok(())
    }

    async fn refresh_special_sources(&self) -> SessionResult<SpecialSources> {
        let special = self
            .call(Request::GetSpecialSources)
            .await?
            .into_special_sources()?;
        let mut mirror = self.inner.mirror.lock().await;
        for channel in Channel::ALL {
            mirror.set_channel_input(channel, special_input(&special, channel).map(str::to_string));
        }
        Ok(special)
    }

    /// Server input backing `channel`, fetching the special sources if unknown
    pub(super) async fn channel_input(&self, channel: Channel) -> SessionResult<String> {
        let known = self.inner.mirror.lock().await.channel(channel).input.clone();
        if let Some(input) = known {
            return Ok(input);
        }
        let special = self.refresh_special_sources().await?;
        special_input(&special, channel)
            .map(str::to_string)
            .ok_or(SessionError::NoAudioInput(channel))
    }

    /// Re-read one channel's level and mute state into the mirror
    ///
    /// The result is dropped unless the connection `generation` is still current.
    pub(super) async fn reload_channel(
        &self,
        generation: u64,
        channel: Channel,
        input: &str,
    ) -> SessionResult<()> {
        let info = self
            .call(Request::GetVolume {
                source: input.to_string(),
            })
            .await?
            .into_volume()?;
        self.apply_volume(generation, channel, info).await;
        Ok(())
    }

    async fn apply_volume(&self, generation: u64, channel: Channel, info: VolumeInfo) {
        let mut mirror = self.inner.mirror.lock().await;
        if !self.is_current(generation) {
            return;
        }
        mirror.apply_volume(channel, info);
        self.inner.ui.send_all(RenderCommand::channel(&mirror, channel));
    }
}

fn special_input(special: &SpecialSources, channel: Channel) -> Option<&str> {
    match channel {
        Channel::Mic => special.mic.as_deref(),
        Channel::Desktop => special.desktop.as_deref(),
    }
}

/// Load a full scene list into the mirror, showing the current scene
fn apply_scene_list(mirror: &mut StateMirror, list: &SceneList) -> Vec<RenderCommand> {
    mirror.set_scenes(list.scenes.iter().map(|s| s.name.clone()).collect());
    mirror.ensure_scene(&list.current_scene);

    let sources = list
        .scenes
        .iter()
        .find(|s| s.name == list.current_scene)
        .map(|s| s.sources.as_slice())
        .unwrap_or_default();
    debug!("Current scene has {} sources", sources.len());
    mirror.display_scene(&list.current_scene, sources);
    mirror.set_current_scene(Some(list.current_scene.clone()));

    vec![
        RenderCommand::scene_list(mirror),
        RenderCommand::source_list(mirror),
        RenderCommand::current_scene(mirror),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ButtonState;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::SceneItem;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn session_with(
        transport: ScriptedTransport,
    ) -> (Session<ScriptedTransport>, UnboundedReceiver<RenderCommand>) {
        let (ui, rx) = Ui::channel();
        (Session::new(transport, SessionConfig::default(), ui), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<RenderCommand>) -> Vec<RenderCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Let the dispatcher and other ready tasks run without moving the clock much
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn mute_calls(transport: &ScriptedTransport) -> Vec<Request> {
        transport
            .calls()
            .into_iter()
            .filter(|r| matches!(r, Request::SetMute { .. }))
            .collect()
    }

    fn switch_to(scene: &str, sources: Vec<SceneItem>) -> Event {
        Event::SwitchScenes {
            scene: scene.to_string(),
            sources,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_shows_initial_scene_state() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());

        session.connect().await.unwrap();

        let renders = drain(&mut rx);
        let last_scene_list = renders
            .iter()
            .rev()
            .find(|r| matches!(r, RenderCommand::SceneList { .. }));
        assert_eq!(
            last_scene_list,
            Some(&RenderCommand::SceneList {
                names: vec![
                    "Starting".to_string(),
                    "Game".to_string(),
                    "Intermission".to_string()
                ],
                selected: Some(1),
            })
        );
        let last_source_list = renders
            .iter()
            .rev()
            .find(|r| matches!(r, RenderCommand::SourceList { .. }));
        assert_eq!(
            last_source_list,
            Some(&RenderCommand::SourceList {
                names: vec!["Capture".to_string(), "Webcam".to_string()],
                selected: BTreeSet::from([0, 1]),
            })
        );
        assert!(renders.contains(&RenderCommand::CurrentScene("Game".to_string())));
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_away_from_trigger_scene_mutes_mic_later() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();
        drain(&mut rx);

        assert!(session
            .transport()
            .emit(switch_to("Intermission", vec![SceneItem::new("Slate", 4, true)])));
        settle().await;

        let mirror = session.snapshot().await;
        assert_eq!(mirror.current_scene(), Some("Intermission"));
        assert_eq!(mirror.source_names(), vec!["Slate"]);
        assert!(drain(&mut rx).contains(&RenderCommand::CurrentScene("Intermission".to_string())));
        assert!(mute_calls(session.transport()).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            mute_calls(session.transport()),
            vec![Request::SetMute {
                source: "Mic/Aux".to_string(),
                muted: true
            }]
        );
        assert!(session.snapshot().await.channel(Channel::Mic).muted);
        assert!(drain(&mut rx).contains(&RenderCommand::ChannelMute(Channel::Mic, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_scene_flap_only_runs_last_mic_action() {
        let (session, _rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();

        session
            .transport()
            .emit(switch_to("Intermission", vec![SceneItem::new("Slate", 4, true)]));
        settle().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.transport().emit(switch_to(
            "Game",
            vec![
                SceneItem::new("Capture", 2, true),
                SceneItem::new("Webcam", 3, true),
            ],
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            mute_calls(session.transport()),
            vec![Request::SetMute {
                source: "Mic/Aux".to_string(),
                muted: false
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_fills_audio_channels() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let mirror = session.snapshot().await;
        assert_eq!(mirror.channel(Channel::Mic).input.as_deref(), Some("Mic/Aux"));
        assert_eq!(mirror.channel(Channel::Desktop).volume, 0.5);
        let renders = drain(&mut rx);
        assert!(renders.contains(&RenderCommand::ChannelVolume(Channel::Mic, 80)));
        assert!(renders.contains(&RenderCommand::ChannelVolume(Channel::Desktop, 50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_leaves_mirror_empty() {
        let transport = ScriptedTransport::with_game_setup();
        transport.set_fail_connect(true);
        let (session, mut rx) = session_with(transport);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Connection { .. })
        ));
        assert!(!session.is_connected());
        assert!(session.snapshot().await.scenes().is_empty());
        assert!(drain(&mut rx)
            .iter()
            .any(|r| matches!(r, RenderCommand::StatusText(text) if text.starts_with("Connection failed"))));

        // No retry on its own
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.transport().connect_count(), 0);
        assert!(session.transport().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_exit_runs_shutdown_path() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();
        session
            .transport()
            .emit(switch_to("Intermission", vec![]));
        settle().await;

        session.transport().emit(Event::Exiting);
        settle().await;

        assert!(!session.is_connected());
        assert!(!session.transport().is_connected());
        assert!(drain(&mut rx).contains(&RenderCommand::Close));

        // The pending mic action died with the connection
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(mute_calls(session.transport()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_event_handlers() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();
        session.connect().await.unwrap();
        assert_eq!(session.transport().connect_count(), 2);
        drain(&mut rx);

        session.transport().emit(Event::SceneItemVisibilityChanged {
            scene: "Game".to_string(),
            item_name: "Webcam".to_string(),
            visible: false,
        });
        settle().await;

        let source_lists = drain(&mut rx)
            .into_iter()
            .filter(|r| matches!(r, RenderCommand::SourceList { .. }))
            .count();
        assert_eq!(source_lists, 1);
        assert_eq!(
            session.snapshot().await.selected_indices(),
            BTreeSet::from([0])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_change_reloads_scene_list() {
        let (session, _rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();

        session.transport().emit(Event::SceneCollectionChanged);
        settle().await;
        settle().await;

        let mirror = session.snapshot().await;
        assert_eq!(mirror.scenes().len(), 3);
        assert_eq!(mirror.current_scene(), Some("Game"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_events_drive_stream_button() {
        let (session, mut rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();
        drain(&mut rx);

        session.transport().emit(Event::StreamStarting);
        session.transport().emit(Event::StreamStarted);
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                RenderCommand::StreamButton(ButtonState::Wait),
                RenderCommand::StreamButton(ButtonState::On),
            ]
        );
    }

    fn calls_named(transport: &ScriptedTransport, name: &str) -> usize {
        transport
            .calls()
            .iter()
            .filter(|r| r.name() == name)
            .count()
    }

    fn point_mic_at(transport: &ScriptedTransport, input: &str) {
        transport.set_special(SpecialSources {
            mic: Some(input.to_string()),
            desktop: Some("Desktop Audio".to_string()),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_survives_failed_cycle() {
        let transport = ScriptedTransport::with_game_setup();
        // Mic level reads fail until the input exists
        point_mic_at(&transport, "USB Mic");
        let (session, _rx) = session_with(transport);
        session.connect().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.snapshot().await.channel(Channel::Desktop).volume, 0.0);

        session.transport().set_volume(
            "USB Mic",
            VolumeInfo {
                volume: 0.3,
                muted: false,
            },
        );
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(calls_named(session.transport(), "GetSpecialSources") >= 3);
        let mirror = session.snapshot().await;
        assert_eq!(mirror.channel(Channel::Mic).volume, 0.3);
        assert_eq!(mirror.channel(Channel::Desktop).volume, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_survives_handler_error() {
        let (session, _rx) = session_with(ScriptedTransport::with_game_setup());
        session.connect().await.unwrap();

        session.transport().emit(Event::SceneItemRemoved {
            scene: "Game".to_string(),
            item_name: "Ghost".to_string(),
        });
        session.transport().emit(Event::SceneItemVisibilityChanged {
            scene: "Game".to_string(),
            item_name: "Webcam".to_string(),
            visible: false,
        });
        settle().await;

        let mirror = session.snapshot().await;
        assert_eq!(mirror.source_names(), vec!["Capture", "Webcam"]);
        assert_eq!(mirror.selected_indices(), BTreeSet::from([0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mic_action_failure_does_not_block_next_schedule() {
        let transport = ScriptedTransport::with_game_setup();
        point_mic_at(&transport, "USB Mic");
        let (session, _rx) = session_with(transport);
        session.connect().await.unwrap();

        session
            .transport()
            .emit(switch_to("Intermission", vec![SceneItem::new("Slate", 4, true)]));
        tokio::time::sleep(Duration::from_secs(2)).await;
        // SetMute was tried and rejected, the input does not exist yet
        assert_eq!(mute_calls(session.transport()).len(), 1);
        assert!(session.transport().volume("USB Mic").is_none());

        session.transport().set_volume(
            "USB Mic",
            VolumeInfo {
                volume: 0.3,
                muted: true,
            },
        );
        session.transport().emit(switch_to(
            "Game",
            vec![
                SceneItem::new("Capture", 2, true),
                SceneItem::new("Webcam", 3, true),
            ],
        ));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            mute_calls(session.transport()).last(),
            Some(&Request::SetMute {
                source: "USB Mic".to_string(),
                muted: false
            })
        );
        assert!(!session.transport().volume("USB Mic").unwrap().muted);
        assert!(!session.snapshot().await.channel(Channel::Mic).muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_studio_mode_switch_only_updates_label() {
        let transport = ScriptedTransport::with_game_setup();
        transport.set_studio_mode(true);
        let (session, mut rx) = session_with(transport);
        session.connect().await.unwrap();
        assert!(session.snapshot().await.studio_mode());
        drain(&mut rx);

        session
            .transport()
            .emit(switch_to("Intermission", vec![SceneItem::new("Slate", 4, true)]));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![RenderCommand::CurrentScene("Intermission".to_string())]
        );
        let mirror = session.snapshot().await;
        assert_eq!(mirror.current_scene(), Some("Intermission"));
        assert_eq!(mirror.displayed_scene(), Some("Game"));
        assert_eq!(mirror.source_names(), vec!["Capture", "Webcam"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mic_action_from_previous_connection_is_discarded() {
        let (ui, _rx) = Ui::channel();
        let config = SessionConfig {
            volume_poll_interval_ms: 60_000,
            ..SessionConfig::default()
        };
        let session = Session::new(ScriptedTransport::with_game_setup(), config, ui);
        session.connect().await.unwrap();
        session.transport().set_call_delay(Duration::from_millis(100));

        session
            .transport()
            .emit(switch_to("Intermission", vec![SceneItem::new("Slate", 4, true)]));
        // The mic action starts at 1s and is waiting on SetMute at 1.15s
        tokio::time::sleep(Duration::from_millis(1150)).await;
        session.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(mute_calls(session.transport()).len(), 1);
        assert!(session.transport().volume("Mic/Aux").unwrap().muted);
        // The re-read level belongs to the old connection and is dropped
        assert!(!session.snapshot().await.channel(Channel::Mic).muted);
    }
}
