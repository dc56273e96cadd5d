//! Operator commands
//!
//! Commands go straight to the server. The mirror is only updated here for
//! source visibility (optimistically, so the list does not flicker) and for
//! audio levels re-read after a change; everything else comes back as events.

use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine::Session;
use super::OperatorCommand;
use crate::differ::{diff_selection, VisibilityChange};
use crate::error::{SessionResult, TransportError};
use crate::mirror::Channel;
use crate::render::RenderCommand;
use crate::transport::{Request, Transport, VolumeInfo};

impl<T: Transport> Session<T> {
    /// Execute commands one at a time, in the order they were sent
    ///
    /// Each command finishes before the next one starts, so the server sees
    /// requests in the order the operator issued them. Returns when every
    /// sender is gone.
    pub async fn run_commands(&self, mut commands: mpsc::UnboundedReceiver<OperatorCommand>) {
        while let Some(command) = commands.recv().await {
            self.execute(command).await;
        }
        debug!("Command queue closed");
    }

    /// Run one operator command, reporting failures in the status bar
    pub async fn execute(&self, command: OperatorCommand) {
        debug!("Operator command: {:?}", command);
        let result = match command {
            OperatorCommand::Connect => {
                // connect reports its own failures
                let _ = self.connect().await;
                return;
            }
            OperatorCommand::SelectScene(scene) => self.select_scene(scene).await,
            OperatorCommand::SelectSources(requested) => {
                self.select_sources(requested).await.map(|_| ())
            }
            OperatorCommand::SetVolume(channel, percent) => self.set_volume(channel, percent).await,
            OperatorCommand::ToggleMute(channel) => self.toggle_mute(channel).await,
            OperatorCommand::Transition => self.transition().await,
            OperatorCommand::ToggleStreaming => self.toggle_streaming().await,
            OperatorCommand::ToggleRecording => self.toggle_recording().await,
            OperatorCommand::Quit => {
                self.shutdown().await;
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Command failed: {}", e);
            self.inner.ui.status(e.to_string());
        }
    }

    pub async fn select_scene(&self, scene: String) -> SessionResult<()> {
        self.call(Request::SetCurrentScene { scene }).await?;
        Ok(())
    }

    /// Make exactly the `requested` sources of the displayed scene visible
    ///
    /// The changes are applied to the mirror before they are sent. If a
    /// command fails, that change and every change not yet sent are rolled
    /// back, unless an event has already overwritten them.
    pub async fn select_sources(
        &self,
        requested: BTreeSet<usize>,
    ) -> SessionResult<Vec<VisibilityChange>> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected.into());
        }
        let generation = self.generation();

        let (scene, changes) = {
            let mut mirror = self.inner.mirror.lock().await;
            let Some(scene) = mirror.displayed_scene().map(str::to_string) else {
                debug!("No scene displayed, ignoring source selection");
                return Ok(Vec::new());
            };
            let changes = diff_selection(
                &mirror.source_names(),
                &mirror.selected_indices(),
                &requested,
            )?;
            for change in &changes {
                mirror.set_source_visible(&change.source, change.visible);
            }
            if !changes.is_empty() {
                self.inner.ui.send(RenderCommand::source_list(&mirror));
            }
            (scene, changes)
        };

        for (sent, change) in changes.iter().enumerate() {
            let request = Request::SetSourceRender {
                scene: Some(scene.clone()),
                source: change.source.clone(),
                visible: change.visible,
            };
            if let Err(e) = self.call(request).await {
                warn!(
                    "Failed to set '{}' visible={} in '{}': {}",
                    change.source, change.visible, scene, e
                );
                self.rollback_visibility(generation, &scene, &changes[sent..])
                    .await;
                return Err(e.into());
            }
        }

        Ok(changes)
    }

    async fn rollback_visibility(&self, generation: u64, scene: &str, changes: &[VisibilityChange]) {
        let mut mirror = self.inner.mirror.lock().await;
        if !self.is_current(generation) || !mirror.is_displayed(scene) {
            return;
        }

        let mut rolled_back = false;
        for change in changes {
            let still_optimistic = mirror
                .source(&change.source)
                .map(|s| s.visible == change.visible)
                .unwrap_or(false);
            if still_optimistic {
                mirror.set_source_visible(&change.source, !change.visible);
                rolled_back = true;
            }
        }
        if rolled_back {
            info!("Rolled back {} visibility change(s) in '{}'", changes.len(), scene);
            self.inner.ui.send(RenderCommand::source_list(&mirror));
        }
    }

    /// Set a channel's volume from a slider position
    pub async fn set_volume(&self, channel: Channel, percent: u8) -> SessionResult<()> {
        let input = self.channel_input(channel).await?;
        let volume = f64::from(percent.min(100)) / 100.0;
        self.call(Request::SetVolume {
            source: input,
            volume,
        })
        .await?;

        let mut mirror = self.inner.mirror.lock().await;
        let muted = mirror.channel(channel).muted;
        mirror.apply_volume(channel, VolumeInfo { volume, muted });
        Ok(())
    }

    pub async fn toggle_mute(&self, channel: Channel) -> SessionResult<()> {
        let generation = self.generation();
        let input = self.channel_input(channel).await?;
        self.call(Request::ToggleMute {
            source: input.clone(),
        })
        .await?;
        self.reload_channel(generation, channel, &input).await
    }

    /// Transition preview to program using the server's current transition
    pub async fn transition(&self) -> SessionResult<()> {
        let name = self
            .call(Request::GetCurrentTransition)
            .await?
            .into_transition()?;
        debug!("Transitioning with '{}'", name);
        self.call(Request::TransitionToProgram {
            transition: Some(name),
        })
        .await?;
        Ok(())
    }

    /// Start or stop streaming; ignored while the output is transitioning
    pub async fn toggle_streaming(&self) -> SessionResult<()> {
        if self.inner.mirror.lock().await.streaming().is_transitioning() {
            debug!("Stream is transitioning, ignoring toggle");
            return Ok(());
        }
        self.call(Request::StartStopStreaming).await?;
        Ok(())
    }

    /// Start or stop recording; ignored while the output is transitioning
    pub async fn toggle_recording(&self) -> SessionResult<()> {
        if self.inner.mirror.lock().await.recording().is_transitioning() {
            debug!("Recording is transitioning, ignoring toggle");
            return Ok(());
        }
        self.call(Request::StartStopRecording).await?;
        Ok(())
    }
}
