//! Gateway loop
//!
//! Single consumer of the status queue. Every observed state goes through the
//! diff engine; the home portal's transitions drive the attached devices and
//! the audio cues. A refresh ticker re-sends the home portal's steady-state
//! frame so hot-plugged devices catch up without waiting for a change.

use std::time::Duration;

use portalproto::{CommandFrame, LocationState};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::CueSender;
use crate::diff::{diff, StateStore, Transition};
use crate::dispatch::{DispatchReport, Dispatcher};

pub struct Gateway {
    home: String,
    store: StateStore,
    dispatcher: Dispatcher,
    audio: Option<CueSender>,
    refresh: Duration,
}

impl Gateway {
    pub fn new(home: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            home: home.into(),
            store: StateStore::new(),
            dispatcher,
            audio: None,
            refresh: Duration::from_secs(2),
        }
    }

    pub fn with_audio(mut self, audio: CueSender) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process one observed state.
    pub async fn handle(&mut self, state: LocationState) -> Transition {
        let transition = diff(&mut self.store, &self.home, state);

        if transition.location != self.home {
            debug!(location = %transition.location, "state recorded for non-home portal");
            return transition;
        }

        if transition.faction_changed {
            info!(
                location = %transition.location,
                from = ?transition.previous_faction.as_ref().map(|f| f.as_str()),
                to = %transition.faction,
                "faction changed"
            );
        } else if transition.first_observation {
            info!(
                location = %transition.location,
                faction = %transition.faction,
                "first status for home portal"
            );
        }

        if transition.has_audio() {
            if let Some(audio) = &self.audio {
                audio.offer(transition.ambient.clone(), transition.effects.clone());
            }
        }

        if let Some(frame) = &transition.frame {
            self.dispatcher.dispatch(&self.home, frame).await;
        }

        transition
    }

    /// Re-send the home portal's last known state as a steady-state frame.
    pub async fn refresh(&self) -> Option<DispatchReport> {
        let state = self.store.get(&self.home)?;
        let frame = CommandFrame::encode(state, false);
        Some(self.dispatcher.dispatch(&self.home, &frame).await)
    }

    /// Run until cancelled or every status producer is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<LocationState>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the immediate first tick, there is nothing to refresh yet
        ticker.tick().await;

        info!(home = %self.home, "gateway started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                maybe = rx.recv() => match maybe {
                    Some(state) => {
                        self.handle(state).await;
                    }
                    None => {
                        debug!("status queue closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.refresh().await;
                }
            }
        }

        info!(home = %self.home, portals = self.store.len(), "gateway stopped");
    }
}
