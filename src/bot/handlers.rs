use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::queue::QueueSnapshot,
    bot::GuildRadioBot,
    error::QueueError,
    sources::TrackRequest,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GuildRadioBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, &command, "❌ Este comando solo funciona dentro de un servidor", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
    else {
        return respond(ctx, command, "❌ Debes indicar una URL", true).await;
    };

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let request = TrackRequest {
        requested_by: command.user.id,
        channel_id: command.channel_id,
    };

    let embed = match bot.player.play(guild_id, voice_channel_id, query, request).await {
        Ok(receipt) => embeds::tracks_added_embed(&receipt.tracks, receipt.position, receipt.started()),
        Err(e) => {
            warn!("⚠️ /play rechazado en guild {}: {}", guild_id, e);
            embeds::error_embed("No se pudo reproducir", &capitalize(&e.to_string()))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.player.skip(guild_id) {
        Ok(track) => respond(ctx, command, &format!("⏭️ Saltando **{}**", track.title), false).await,
        Err(e) => respond_error(ctx, command, e).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.stop(guild_id).await;
    respond(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.player.queue(guild_id).unwrap_or_else(|| QueueSnapshot {
        tracks: Vec::new(),
        current: 0,
        playing: false,
        paused: false,
        looping: false,
        volume: bot.config.default_volume,
    });

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::queue_embed(&snapshot)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.player.pause(guild_id) {
        Ok(()) => respond(ctx, command, "⏸️ Reproducción pausada", false).await,
        Err(e) => respond_error(ctx, command, e).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.player.resume(guild_id) {
        Ok(()) => respond(ctx, command, "▶️ Reproducción reanudada", false).await,
        Err(e) => respond_error(ctx, command, e).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = if bot.player.toggle_loop(guild_id) {
        "🔁 Repetición de la cola activada"
    } else {
        "➡️ Repetición desactivada"
    };
    respond(ctx, command, message, false).await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildRadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(level) = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64())
    else {
        return respond(ctx, command, "❌ Debes indicar un volumen entre 0 y 100", true).await;
    };

    match bot.player.set_volume(guild_id, level) {
        Ok(_) => respond(ctx, command, &format!("🔊 Volumen ajustado a {}%", level), false).await,
        Err(e) => respond_error(ctx, command, e).await,
    }
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_error(ctx: &Context, command: &CommandInteraction, error: QueueError) -> Result<()> {
    respond(ctx, command, &format!("❌ {}", capitalize(&error.to_string())), true).await
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_errors_read_as_sentences() {
        assert_eq!(
            capitalize(&QueueError::NothingPlaying.to_string()),
            "No hay ninguna canción sonando"
        );
        assert_eq!(capitalize(""), "");
    }
}
