use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{queue::Queue, transport::VoiceLink};

/// Everything a guild's playback depends on, behind one lock.
pub struct SessionState {
    pub queue: Queue,
    pub link: Option<Arc<dyn VoiceLink>>,
    pub last_error: Option<String>,
    pub last_activity: Instant,
}

/// Per-guild playback session.
///
/// The lock is only ever taken for synchronous reads and mutations, never
/// across an `.await`. Every mutation bumps a revision counter so a worker
/// suspended on a paused track wakes up on resume, skip or stop.
pub struct Session {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    revision: watch::Sender<u64>,
}

impl Session {
    pub fn new(guild_id: GuildId, max_queue_size: usize, volume: f32) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            guild_id,
            state: Mutex::new(SessionState {
                queue: Queue::new(max_queue_size, volume),
                link: None,
                last_error: None,
                last_activity: Instant::now(),
            }),
            revision,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn mutate<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = {
            let mut state = self.state.lock();
            state.last_activity = Instant::now();
            f(&mut state)
        };
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Marca actividad sin notificar al worker
    fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }

    fn is_idle(&self, max_idle: Duration) -> bool {
        let state = self.state.lock();
        !state.queue.is_playing() && state.last_activity.elapsed() >= max_idle
    }
}

/// Lazily created sessions keyed by guild.
pub struct SessionManager {
    sessions: DashMap<GuildId, Arc<Session>>,
    max_queue_size: usize,
    default_volume: f32,
}

impl SessionManager {
    pub fn new(max_queue_size: usize, default_volume: f32) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_size,
            default_volume,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|s| Arc::clone(s.value()))
    }

    /// Devuelve la sesión de la guild, creándola si hace falta. Cuenta como
    /// actividad: el reaper no puede elegirla mientras el llamador la usa.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Session> {
        let entry = self.sessions.entry(guild_id).or_insert_with(|| {
            debug!("🆕 Nueva sesión para guild {}", guild_id);
            Arc::new(Session::new(guild_id, self.max_queue_size, self.default_volume))
        });
        // Bajo el lock del shard, el mismo que toma remove_if
        entry.value().touch();
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Elimina sesiones inactivas y devuelve sus conexiones de voz para cerrarlas
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<Arc<dyn VoiceLink>> {
        let idle: Vec<GuildId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(max_idle))
            .map(|entry| *entry.key())
            .collect();

        let mut links = Vec::new();
        for guild_id in idle {
            // Revalidar bajo el lock del shard: un /play pudo llegar entre medio
            if let Some((_, session)) = self
                .sessions
                .remove_if(&guild_id, |_, session| session.is_idle(max_idle))
            {
                info!("🧹 Sesión inactiva eliminada: guild {}", guild_id);
                if let Some(link) = session.mutate(|s| s.link.take()) {
                    links.push(link);
                }
            }
        }
        links
    }
}
