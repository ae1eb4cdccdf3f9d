use chrono::{DateTime, Utc};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{audio::queue::QueueSnapshot, sources::Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Radio";

/// Máximo de líneas de la cola que caben cómodamente en un embed
const QUEUE_LINES: usize = 15;

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("🕒 En cola desde", relative_time(track.added_at), true)
        .url(&track.url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para confirmar tracks agregados a la cola
pub fn tracks_added_embed(tracks: &[Track], position: usize, started: bool) -> CreateEmbed {
    let footer = if started {
        "🎵 La reproducción comenzará en breve"
    } else {
        "🎵 Se reproducirá cuando llegue su turno • Usa /queue para ver la cola"
    };

    let embed = match tracks {
        [track] => {
            let mut embed = CreateEmbed::default()
                .title("✅ Canción Agregada")
                .description(format!("**{}** se ha agregado a la cola", track.title))
                .color(colors::SUCCESS_GREEN)
                .field("⏱️ Duración", duration_label(track.duration), true)
                .field("📍 Posición", position.to_string(), true)
                .url(&track.url);
            if let Some(thumbnail) = &track.thumbnail {
                embed = embed.thumbnail(thumbnail);
            }
            embed
        }
        _ => {
            let total: Duration = tracks.iter().filter_map(|t| t.duration).sum();
            let mut embed = CreateEmbed::default()
                .title("📋 Playlist Agregada")
                .description(format!(
                    "Se agregaron **{} canciones** a la cola de reproducción",
                    tracks.len()
                ))
                .color(colors::MUSIC_PURPLE)
                .field("📍 Desde la posición", position.to_string(), true);
            if total > Duration::ZERO {
                embed = embed.field("⏱️ Duración total", format_duration(total), true);
            }
            embed
        }
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.tracks.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let lines = visible_queue_lines(snapshot);

    let mut info = format!(
        "**Total:** {} canciones • 🔊 {}%",
        snapshot.tracks.len(),
        (snapshot.volume * 100.0).round() as u32
    );
    if snapshot.looping {
        info.push_str(" • 🔁 **Loop**");
    }
    if snapshot.paused {
        info.push_str(" • ⏸️ **En pausa**");
    }

    embed
        .description(lines.join("\n"))
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Ventana de `QUEUE_LINES` líneas alrededor del track actual, con marcas
/// de cuántos quedan fuera por arriba y por abajo
pub fn visible_queue_lines(snapshot: &QueueSnapshot) -> Vec<String> {
    let lines = queue_lines(snapshot);
    let total = lines.len();
    // Dos ya reproducidos como contexto antes del actual
    let start = snapshot
        .current
        .saturating_sub(2)
        .min(total.saturating_sub(QUEUE_LINES));
    let end = (start + QUEUE_LINES).min(total);

    let mut visible = Vec::with_capacity(end - start + 2);
    if start > 0 {
        visible.push(format!("… {} anteriores", start));
    }
    visible.extend(lines.into_iter().skip(start).take(end - start));
    if end < total {
        visible.push(format!("… y {} más", total - end));
    }
    visible
}

/// Una línea por track: ✅ ya sonó, 🎵 sonando, `n.` pendiente
pub fn queue_lines(snapshot: &QueueSnapshot) -> Vec<String> {
    snapshot
        .tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let marker = if i < snapshot.current {
                "✅".to_string()
            } else if i == snapshot.current && snapshot.playing {
                "🎵".to_string()
            } else {
                format!("{}.", i + 1)
            };
            let duration = track
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!("{} {}{}", marker, track.title, duration)
        })
        .collect()
}

/// Crea un embed de error
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Marca de tiempo relativa que Discord renderiza en la zona del usuario
fn relative_time(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

fn duration_label(duration: Option<Duration>) -> String {
    duration.map_or_else(|| "Desconocida".to_string(), format_duration)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::TrackRequest;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};

    fn track(title: &str, secs: Option<u64>) -> Track {
        let mut track = TrackRequest {
            requested_by: UserId::new(1),
            channel_id: ChannelId::new(2),
        }
        .track(title.to_string(), format!("https://youtu.be/{title}"));
        track.duration = secs.map(Duration::from_secs);
        track
    }

    #[test]
    fn durations_are_formatted_like_a_clock() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn queue_lines_mark_played_current_and_pending() {
        let snapshot = QueueSnapshot {
            tracks: vec![track("a", Some(61)), track("b", None), track("c", None)],
            current: 1,
            playing: true,
            paused: false,
            looping: false,
            volume: 0.5,
        };

        assert_eq!(
            queue_lines(&snapshot),
            vec!["✅ a `[1:01]`", "🎵 b", "3. c"]
        );
    }

    fn long_snapshot(len: usize, current: usize) -> QueueSnapshot {
        QueueSnapshot {
            tracks: (0..len).map(|i| track(&format!("t{i}"), None)).collect(),
            current,
            playing: true,
            paused: false,
            looping: false,
            volume: 1.0,
        }
    }

    #[test]
    fn long_queue_window_follows_the_current_track() {
        let lines = visible_queue_lines(&long_snapshot(40, 20));

        assert_eq!(lines.len(), QUEUE_LINES + 2);
        assert_eq!(lines[0], "… 18 anteriores");
        assert_eq!(lines[1], "✅ t18");
        assert_eq!(lines[3], "🎵 t20");
        assert_eq!(lines[QUEUE_LINES], "33. t32");
        assert_eq!(lines[QUEUE_LINES + 1], "… y 7 más");
    }

    #[test]
    fn window_near_the_ends_stays_full() {
        let head = visible_queue_lines(&long_snapshot(40, 0));
        assert_eq!(head[0], "🎵 t0");
        assert_eq!(head.len(), QUEUE_LINES + 1);
        assert_eq!(head[QUEUE_LINES], "… y 25 más");

        let tail = visible_queue_lines(&long_snapshot(40, 39));
        assert_eq!(tail[0], "… 25 anteriores");
        assert_eq!(tail.last().unwrap(), "🎵 t39");
        assert_eq!(tail.len(), QUEUE_LINES + 1);

        let short = visible_queue_lines(&long_snapshot(3, 1));
        assert_eq!(short, vec!["✅ t0", "🎵 t1", "3. t2"]);
    }

    #[test]
    fn now_playing_shows_when_the_track_was_queued() {
        let track = track("a", Some(5));
        let embed = serde_json::to_value(now_playing_embed(&track)).unwrap();
        let expected = format!("<t:{}:R>", track.added_at.timestamp());

        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["value"] == expected.as_str()));
    }

    #[test]
    fn exhausted_queue_shows_everything_as_played() {
        let snapshot = QueueSnapshot {
            tracks: vec![track("a", None), track("b", None)],
            current: 2,
            playing: false,
            paused: false,
            looping: false,
            volume: 0.5,
        };

        assert_eq!(queue_lines(&snapshot), vec!["✅ a", "✅ b"]);
    }
}
