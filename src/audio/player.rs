use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use super::{
    queue::QueueSnapshot,
    session::{Session, SessionManager},
    transcode::PcmSource,
    transport::{VoiceGateway, VoiceLink},
    worker::{Notifier, PlaybackSettings, PlaybackWorker},
};
use crate::{
    error::{PlayError, QueueError},
    sources::{SourceResolver, Track, TrackRequest},
};

/// Result of a successful `play`.
#[derive(Debug)]
pub struct PlayReceipt {
    pub tracks: Vec<Track>,
    /// Posición (1-based) del primer track agregado
    pub position: usize,
    /// Worker iniciado por esta llamada, si la cola estaba inactiva
    pub worker: Option<JoinHandle<()>>,
}

impl PlayReceipt {
    pub fn started(&self) -> bool {
        self.worker.is_some()
    }
}

/// Control surface over every guild's playback.
pub struct AudioPlayer {
    sessions: SessionManager,
    resolver: Arc<SourceResolver>,
    pcm: Arc<dyn PcmSource>,
    gateway: Arc<dyn VoiceGateway>,
    notifier: Arc<dyn Notifier>,
    settings: PlaybackSettings,
    ready_timeout: Duration,
}

impl AudioPlayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionManager,
        resolver: Arc<SourceResolver>,
        pcm: Arc<dyn PcmSource>,
        gateway: Arc<dyn VoiceGateway>,
        notifier: Arc<dyn Notifier>,
        settings: PlaybackSettings,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            resolver,
            pcm,
            gateway,
            notifier,
            settings,
            ready_timeout,
        }
    }

    /// Resuelve la consulta, se une al canal si hace falta, encola y arranca
    /// el worker si la cola estaba inactiva.
    pub async fn play(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        query: &str,
        request: TrackRequest,
    ) -> Result<PlayReceipt, PlayError> {
        let tracks = self.resolver.resolve(query, request).await?;
        let session = self.sessions.get_or_create(guild_id);

        self.ensure_connected(&session, voice_channel).await?;

        let enqueued = session.mutate(|s| s.queue.enqueue_all(tracks.clone()))?;
        let worker = enqueued.start.map(|epoch| self.spawn_worker(session.clone(), epoch));

        Ok(PlayReceipt {
            tracks,
            position: enqueued.position,
            worker,
        })
    }

    async fn ensure_connected(
        &self,
        session: &Arc<Session>,
        voice_channel: ChannelId,
    ) -> Result<(), PlayError> {
        let existing = session.read(|s| s.link.clone());
        if let Some(link) = existing {
            if link.is_ready().await {
                return Ok(());
            }
            warn!("🔌 Conexión de voz caída en guild {}, reconectando", session.guild_id());
        }

        let link = self
            .gateway
            .connect(session.guild_id(), voice_channel, self.ready_timeout)
            .await?;
        session.mutate(|s| s.link = Some(link));
        Ok(())
    }

    fn spawn_worker(&self, session: Arc<Session>, epoch: u64) -> JoinHandle<()> {
        let span = info_span!("playback", guild_id = %session.guild_id());
        let worker = PlaybackWorker::new(
            session,
            epoch,
            self.resolver.clone(),
            self.pcm.clone(),
            self.notifier.clone(),
            self.settings.clone(),
        );
        tokio::spawn(worker.run().instrument(span))
    }

    pub fn skip(&self, guild_id: GuildId) -> Result<Track, QueueError> {
        self.existing(guild_id)?.mutate(|s| s.queue.skip())
    }

    /// Detiene la reproducción, vacía la cola y sale del canal de voz
    pub async fn stop(&self, guild_id: GuildId) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };

        let link = session.mutate(|s| {
            s.queue.stop();
            s.link.take()
        });
        if let Some(link) = link {
            link.disconnect().await;
        }
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    pub fn pause(&self, guild_id: GuildId) -> Result<(), QueueError> {
        self.existing(guild_id)?.mutate(|s| s.queue.pause())
    }

    pub fn resume(&self, guild_id: GuildId) -> Result<(), QueueError> {
        self.existing(guild_id)?.mutate(|s| s.queue.resume())
    }

    /// Devuelve el nuevo estado del loop
    pub fn toggle_loop(&self, guild_id: GuildId) -> bool {
        self.sessions
            .get_or_create(guild_id)
            .mutate(|s| s.queue.toggle_loop())
    }

    pub fn set_volume(&self, guild_id: GuildId, percent: i64) -> Result<f32, QueueError> {
        self.sessions
            .get_or_create(guild_id)
            .mutate(|s| s.queue.set_volume(percent))
    }

    pub fn queue(&self, guild_id: GuildId) -> Option<QueueSnapshot> {
        self.sessions
            .get(guild_id)
            .map(|session| session.read(|s| s.queue.snapshot()))
    }

    pub fn last_error(&self, guild_id: GuildId) -> Option<String> {
        self.sessions
            .get(guild_id)
            .and_then(|session| session.read(|s| s.last_error.clone()))
    }

    /// Cierra y elimina las sesiones sin actividad durante `max_idle`
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let links: Vec<Arc<dyn VoiceLink>> = self.sessions.reap_idle(max_idle);
        let count = links.len();
        for link in links {
            link.disconnect().await;
        }
        count
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn existing(&self, guild_id: GuildId) -> Result<Arc<Session>, QueueError> {
        self.sessions.get(guild_id).ok_or(QueueError::NothingPlaying)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::worker::tests::{
            echo_resolver, settings, FakeLink, FakeNotifier, FakePcm, LinkEvent,
        },
        error::{ConnectionError, ResolutionError},
        sources::{MockMediaExtractor, MockMetadataProvider},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serenity::model::id::UserId;

    struct FakeGateway {
        link: Arc<FakeLink>,
        fail: bool,
        connects: Mutex<usize>,
    }

    impl FakeGateway {
        fn new(fail: bool) -> Self {
            Self {
                link: Arc::new(FakeLink::default()),
                fail,
                connects: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl VoiceGateway for FakeGateway {
        async fn connect(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
            ready_timeout: Duration,
        ) -> Result<Arc<dyn VoiceLink>, ConnectionError> {
            *self.connects.lock() += 1;
            if self.fail {
                return Err(ConnectionError::ReadyTimeout(ready_timeout));
            }
            Ok(self.link.clone() as Arc<dyn VoiceLink>)
        }
    }

    fn guild() -> GuildId {
        GuildId::new(42)
    }

    fn voice() -> ChannelId {
        ChannelId::new(43)
    }

    fn request() -> TrackRequest {
        TrackRequest {
            requested_by: UserId::new(1),
            channel_id: ChannelId::new(2),
        }
    }

    fn player_with(resolver: Arc<SourceResolver>, gateway: Arc<FakeGateway>, pcm: FakePcm) -> AudioPlayer {
        AudioPlayer::new(
            SessionManager::new(100, 1.0),
            resolver,
            Arc::new(pcm),
            gateway,
            Arc::new(FakeNotifier::default()),
            settings(),
            Duration::from_secs(1),
        )
    }

    /// Resolver que acepta cualquier URL de YouTube sin red
    fn offline_resolver() -> Arc<SourceResolver> {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_video()
            .returning(|_| Err(ResolutionError::Metadata("offline".into())));
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_title().returning(|url| Ok(format!("título de {url}")));
        extractor.expect_stream_url().returning(|url| Ok(url.to_string()));
        Arc::new(SourceResolver::new(Arc::new(metadata), Arc::new(extractor), 100))
    }

    #[tokio::test]
    async fn play_connects_enqueues_and_runs_the_worker() {
        let gateway = Arc::new(FakeGateway::new(false));
        let player = player_with(
            offline_resolver(),
            gateway.clone(),
            FakePcm::default().with("https://youtu.be/a", 2),
        );

        let receipt = player
            .play(guild(), voice(), "https://youtu.be/a", request())
            .await
            .unwrap();
        assert!(receipt.started());
        assert_eq!(receipt.position, 1);
        receipt.worker.unwrap().await.unwrap();

        assert_eq!(*gateway.connects.lock(), 1);
        assert_eq!(gateway.link.frames(), 2);
        let snapshot = player.queue(guild()).unwrap();
        assert!(!snapshot.playing);
        assert_eq!(snapshot.current, 1);
    }

    #[tokio::test]
    async fn second_play_joins_the_running_worker() {
        let gateway = Arc::new(FakeGateway::new(false));
        let player = player_with(offline_resolver(), gateway.clone(), FakePcm::default());
        player.pause(guild()).unwrap_err();

        let first = player
            .play(guild(), voice(), "https://youtu.be/a", request())
            .await
            .unwrap();
        // Mantener el worker retenido para que la cola siga activa
        player.pause(guild()).unwrap();
        let second = player
            .play(guild(), voice(), "https://youtu.be/b", request())
            .await
            .unwrap();

        assert!(first.started());
        assert!(!second.started());
        assert_eq!(second.position, 2);
        assert_eq!(*gateway.connects.lock(), 1);

        player.stop(guild()).await;
        if let Some(worker) = first.worker {
            tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn failed_join_enqueues_nothing() {
        let gateway = Arc::new(FakeGateway::new(true));
        let player = player_with(offline_resolver(), gateway, FakePcm::default());

        let err = player
            .play(guild(), voice(), "https://youtu.be/a", request())
            .await
            .unwrap_err();

        assert!(matches!(err, PlayError::Connection(ConnectionError::ReadyTimeout(_))));
        assert!(player.queue(guild()).unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn unsupported_source_never_creates_a_session() {
        let gateway = Arc::new(FakeGateway::new(false));
        let player = player_with(echo_resolver(), gateway.clone(), FakePcm::default());

        let err = player
            .play(guild(), voice(), "https://open.spotify.com/track/abc", request())
            .await
            .unwrap_err();

        assert!(matches!(err, PlayError::Resolution(ResolutionError::UnsupportedSource { .. })));
        assert_eq!(*gateway.connects.lock(), 0);
        assert!(player.queue(guild()).is_none());
    }

    #[tokio::test]
    async fn stop_clears_the_queue_and_disconnects() {
        let gateway = Arc::new(FakeGateway::new(false));
        let player = player_with(offline_resolver(), gateway.clone(), FakePcm::default());
        let receipt = player
            .play(guild(), voice(), "https://youtu.be/a", request())
            .await
            .unwrap();
        player.pause(guild()).unwrap();

        player.stop(guild()).await;

        let snapshot = player.queue(guild()).unwrap();
        assert!(!snapshot.playing);
        assert!(snapshot.tracks.is_empty());
        assert_eq!(snapshot.current, 0);
        assert!(gateway.link.events().contains(&LinkEvent::Disconnect));
        assert_eq!(player.skip(guild()).unwrap_err(), QueueError::NothingPlaying);

        if let Some(worker) = receipt.worker {
            tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn controls_without_a_session_report_nothing_playing() {
        let player = player_with(
            offline_resolver(),
            Arc::new(FakeGateway::new(false)),
            FakePcm::default(),
        );

        assert_eq!(player.skip(guild()).unwrap_err(), QueueError::NothingPlaying);
        assert_eq!(player.resume(guild()).unwrap_err(), QueueError::NothingPlaying);
        assert!(player.toggle_loop(guild()));
        assert_eq!(player.set_volume(guild(), 30).unwrap(), 0.3);
        assert!(player.queue(guild()).unwrap().looping);
    }

    #[tokio::test]
    async fn idle_sessions_are_reaped_and_disconnected() {
        let gateway = Arc::new(FakeGateway::new(false));
        let player = player_with(
            offline_resolver(),
            gateway.clone(),
            FakePcm::default().with("https://youtu.be/a", 1),
        );
        let receipt = player
            .play(guild(), voice(), "https://youtu.be/a", request())
            .await
            .unwrap();
        receipt.worker.unwrap().await.unwrap();

        assert_eq!(player.reap_idle(Duration::ZERO).await, 1);
        assert_eq!(player.active_sessions(), 0);
        assert!(gateway.link.events().contains(&LinkEvent::Disconnect));
    }
}
