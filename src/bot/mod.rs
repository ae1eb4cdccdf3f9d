//! # Bot Module
//!
//! Discord front end for Guild Radio.
//!
//! [`GuildRadioBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands once the gateway is ready, routes command interactions to
//! [`handlers`], stops playback when the bot is kicked from a voice channel
//! and runs a periodic task that releases idle guild sessions.
//!
//! All playback state lives in [`AudioPlayer`]; this module only translates
//! Discord events into player calls.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{audio::player::AudioPlayer, config::Config};

/// Cada cuánto se revisan las sesiones inactivas
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Main Discord event handler.
pub struct GuildRadioBot {
    pub config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
    shutdown: CancellationToken,
    /// `ready` se repite en cada reconexión; el mantenimiento arranca una sola vez
    maintenance_started: AtomicBool,
}

impl GuildRadioBot {
    pub fn new(config: Arc<Config>, player: Arc<AudioPlayer>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            player,
            shutdown,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands per guild when `GUILD_ID` is set (instant
    /// propagation), globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildRadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(maintenance_tasks(
                Arc::clone(&self.player),
                self.config.idle_timeout,
                self.shutdown.clone(),
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Stops the guild's playback when the bot itself is disconnected from
    /// voice, whether kicked by a moderator or dropped by Discord.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.player.stop(guild_id).await;
        }
    }
}

/// Releases sessions that have been idle longer than `idle_timeout` until
/// `shutdown` is cancelled.
async fn maintenance_tasks(player: Arc<AudioPlayer>, idle_timeout: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("🛑 Tareas de mantenimiento detenidas");
                return;
            }
            _ = interval.tick() => {
                let reaped = player.reap_idle(idle_timeout).await;
                if reaped > 0 {
                    info!(
                        "🧹 {} sesiones inactivas liberadas ({} activas)",
                        reaped,
                        player.active_sessions()
                    );
                }
            }
        }
    }
}
