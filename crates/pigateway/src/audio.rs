//! Audio cue delivery
//!
//! The gateway hands cues to two bounded queues: `ambient` (one name, loops
//! until replaced) and `effects` (a batch of one-shots). Delivery is
//! best-effort; a cue that can't be queued within the timeout is dropped.
//!
//! The audio task resolves cue names against a catalog of files under the
//! configured directory, `<dir>/<cue>.<ext>`, and logs what it plays.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use portalproto::{Cue, CueKind, Faction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Cue files found under the audio directory, by cue name.
#[derive(Debug, Clone, Default)]
pub struct CueCatalog {
    dir: PathBuf,
    files: BTreeMap<String, PathBuf>,
}

impl CueCatalog {
    /// Walk `dir` for files ending in `.extension`. A missing or unreadable
    /// directory gives an empty catalog.
    pub fn scan(dir: &Path, extension: &str) -> Self {
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("skipping audio entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files
                    .entry(stem.to_string())
                    .or_insert_with(|| path.to_path_buf());
            }
        }

        Self {
            dir: dir.to_path_buf(),
            files,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn resolve(&self, cue: &Cue) -> Option<&Path> {
        self.files.get(cue.as_str()).map(PathBuf::as_path)
    }

    /// Faction cues with no file, e.g. `r-capture`.
    pub fn missing_faction_cues(&self) -> Vec<Cue> {
        let factions = [Faction::Neutral, Faction::Enlightened, Faction::Resistance];
        let kinds = [CueKind::Ambient, CueKind::Capture, CueKind::Loss];

        factions
            .iter()
            .flat_map(|f| kinds.iter().filter_map(move |k| Cue::for_faction(f, *k)))
            .filter(|cue| self.resolve(cue).is_none())
            .collect()
    }
}

/// Receiving ends of the cue queues, consumed by the audio task.
#[derive(Debug)]
pub struct CueQueues {
    pub ambient: mpsc::Receiver<Cue>,
    pub effects: mpsc::Receiver<Vec<Cue>>,
}

/// Sending side of the cue queues.
#[derive(Debug, Clone)]
pub struct CueSender {
    ambient: mpsc::Sender<Cue>,
    effects: mpsc::Sender<Vec<Cue>>,
    timeout: Duration,
}

impl CueSender {
    pub fn channel(capacity: usize, timeout: Duration) -> (Self, CueQueues) {
        let (ambient_tx, ambient_rx) = mpsc::channel(capacity);
        let (effects_tx, effects_rx) = mpsc::channel(capacity);
        (
            Self {
                ambient: ambient_tx,
                effects: effects_tx,
                timeout,
            },
            CueQueues {
                ambient: ambient_rx,
                effects: effects_rx,
            },
        )
    }

    /// Queue an ambient cue, waiting at most `timeout`. Returns false if dropped.
    pub async fn send_ambient(&self, cue: Cue, timeout: Duration) -> bool {
        match self.ambient.send_timeout(cue, timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("ambient cue dropped: {}", e);
                false
            }
        }
    }

    /// Queue a batch of one-shot cues. Returns false if dropped.
    pub async fn send_effects(&self, cues: Vec<Cue>, timeout: Duration) -> bool {
        match self.effects.send_timeout(cues, timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("effect cues dropped: {}", e);
                false
            }
        }
    }

    /// Deliver cues in the background so the caller never waits on audio.
    pub fn offer(&self, ambient: Option<Cue>, effects: Vec<Cue>) -> JoinHandle<()> {
        let sender = self.clone();
        tokio::spawn(async move {
            if let Some(cue) = ambient {
                sender.send_ambient(cue, sender.timeout).await;
            }
            if !effects.is_empty() {
                sender.send_effects(effects, sender.timeout).await;
            }
        })
    }
}

/// Tracks what is playing and resolves cues to files.
#[derive(Debug)]
pub struct AudioPlayer {
    catalog: CueCatalog,
    looping: Option<Cue>,
}

impl AudioPlayer {
    pub fn new(catalog: CueCatalog) -> Self {
        Self {
            catalog,
            looping: None,
        }
    }

    pub fn looping(&self) -> Option<&Cue> {
        self.looping.as_ref()
    }

    /// Switch the ambient loop. Returns the file that would loop.
    pub fn play_ambient(&mut self, cue: Cue) -> Option<PathBuf> {
        let path = self.catalog.resolve(&cue).map(Path::to_path_buf);
        match &path {
            Some(path) => info!(cue = %cue, file = %path.display(), "looping ambient"),
            None => warn!(cue = %cue, dir = %self.catalog.dir().display(), "no file for ambient cue"),
        }
        self.looping = Some(cue);
        path
    }

    /// Play one-shots in order. Returns the files that would play.
    pub fn play_effects(&mut self, cues: &[Cue]) -> Vec<PathBuf> {
        let mut played = Vec::with_capacity(cues.len());
        for cue in cues {
            match self.catalog.resolve(cue) {
                Some(path) => {
                    info!(cue = %cue, file = %path.display(), "playing effect");
                    played.push(path.to_path_buf());
                }
                None => warn!(cue = %cue, dir = %self.catalog.dir().display(), "no file for effect cue"),
            }
        }
        played
    }

    /// Consume the cue queues until cancelled or both senders are gone.
    pub async fn run(mut self, mut queues: CueQueues, cancel: CancellationToken) {
        let mut ambient_open = true;
        let mut effects_open = true;

        while ambient_open || effects_open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cue = queues.ambient.recv(), if ambient_open => match cue {
                    Some(cue) => {
                        self.play_ambient(cue);
                    }
                    None => ambient_open = false,
                },
                cues = queues.effects.recv(), if effects_open => match cues {
                    Some(cues) => {
                        self.play_effects(&cues);
                    }
                    None => effects_open = false,
                },
            }
        }

        debug!(looping = ?self.looping, "audio stopped");
    }
}
