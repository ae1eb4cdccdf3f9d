use tracing::{debug, info};

use crate::{error::QueueError, sources::Track};

/// Identifies one playback attempt: which track slot, under which epoch.
///
/// A worker holds a cursor while it streams a track. The cursor stays valid
/// until the queue moves past that slot (skip) or is reset (stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub epoch: u64,
    pub index: usize,
}

/// What the worker should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Play(Cursor, Track),
    /// Se llegó al final sin loop; la cola queda inactiva
    Exhausted,
    /// La cola fue detenida y reiniciada después de que este worker arrancó
    Superseded,
}

/// Per-frame verdict for a track in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    Proceed { gain: f32 },
    Hold,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Posición (1-based) del primer track agregado
    pub position: usize,
    pub count: usize,
    /// Epoch para el worker nuevo, si la cola pasó de inactiva a activa
    pub start: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub current: usize,
    pub playing: bool,
    pub paused: bool,
    pub looping: bool,
    pub volume: f32,
}

impl QueueSnapshot {
    pub fn now_playing(&self) -> Option<&Track> {
        if self.playing {
            self.tracks.get(self.current)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct Queue {
    tracks: Vec<Track>,
    current: usize,
    playing: bool,
    paused: bool,
    looping: bool,
    volume: f32,
    epoch: u64,
    max_size: usize,
}

impl Queue {
    pub fn new(max_size: usize, volume: f32) -> Self {
        Self {
            tracks: Vec::new(),
            current: 0,
            playing: false,
            paused: false,
            looping: false,
            volume: volume.clamp(0.0, 1.0),
            epoch: 0,
            max_size,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Agrega tracks al final. Si la cola estaba inactiva la activa y devuelve
    /// el epoch con el que debe arrancar el worker.
    pub fn enqueue_all(&mut self, tracks: Vec<Track>) -> Result<Enqueued, QueueError> {
        if self.tracks.len() + tracks.len() > self.max_size {
            return Err(QueueError::Full(self.max_size));
        }

        let position = self.tracks.len() + 1;
        let count = tracks.len();
        for track in &tracks {
            info!("➕ Agregado a la cola: {}", track.title);
        }
        self.tracks.extend(tracks);

        let start = if !self.playing && count > 0 {
            // Tras agotarse, current == len anterior: apunta al primer track nuevo
            self.playing = true;
            self.paused = false;
            Some(self.epoch)
        } else {
            None
        };

        Ok(Enqueued {
            position,
            count,
            start,
        })
    }

    /// Toma el track actual. Con loop activo, una cola agotada vuelve al inicio.
    pub fn begin(&mut self, epoch: u64) -> Advance {
        if epoch != self.epoch || !self.playing {
            return Advance::Superseded;
        }

        if self.current >= self.tracks.len() {
            if self.looping && !self.tracks.is_empty() {
                debug!("🔁 Fin de la cola, volviendo al inicio");
                self.current = 0;
            } else {
                self.playing = false;
                self.paused = false;
                return Advance::Exhausted;
            }
        }

        Advance::Play(
            Cursor {
                epoch,
                index: self.current,
            },
            self.tracks[self.current].clone(),
        )
    }

    /// Avanza tras terminar (o fallar) un track. No hace nada si un skip o
    /// stop ya movió la cola.
    pub fn finish(&mut self, cursor: Cursor) {
        if self.is_current(cursor) {
            self.current += 1;
        }
    }

    /// Detiene la reproducción conservando los tracks, p. ej. sin conexión de voz
    pub fn halt(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.playing = false;
            self.paused = false;
        }
    }

    pub fn is_current(&self, cursor: Cursor) -> bool {
        self.playing && cursor.epoch == self.epoch && cursor.index == self.current
    }

    pub fn gate(&self, cursor: Cursor) -> Gate {
        if !self.is_current(cursor) {
            Gate::Abort
        } else if self.paused {
            Gate::Hold
        } else {
            Gate::Proceed { gain: self.volume }
        }
    }

    pub fn skip(&mut self) -> Result<Track, QueueError> {
        if !self.playing || self.current >= self.tracks.len() {
            return Err(QueueError::NothingPlaying);
        }

        let skipped = self.tracks[self.current].clone();
        self.current += 1;
        self.paused = false;
        info!("⏭️ Saltando: {}", skipped.title);
        Ok(skipped)
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
        self.tracks.clear();
        self.current = 0;
        self.epoch += 1;
        info!("⏹️ Cola detenida (epoch {})", self.epoch);
    }

    pub fn pause(&mut self) -> Result<(), QueueError> {
        if !self.playing {
            return Err(QueueError::NothingPlaying);
        }
        if self.paused {
            return Err(QueueError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), QueueError> {
        if !self.paused {
            return Err(QueueError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        self.looping
    }

    /// Volumen en porcentaje (0-100)
    pub fn set_volume(&mut self, percent: i64) -> Result<f32, QueueError> {
        if !(0..=100).contains(&percent) {
            return Err(QueueError::VolumeOutOfRange(percent));
        }
        self.volume = percent as f32 / 100.0;
        Ok(self.volume)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.clone(),
            current: self.current,
            playing: self.playing,
            paused: self.paused,
            looping: self.looping,
            volume: self.volume,
        }
    }
}
