//! Plain-text Rendering
//!
//! Tables and summaries printed by the terminal front end. Rendering is a
//! pure function of view state: the same data always yields the same text.

use chrono::{DateTime, Local, Utc};

use crate::model::{Channel, ChannelKeys, Feed, User};
use crate::views::{FeedData, Notification, NotificationKind, Route};

const NAME_WIDTH: usize = 24;
const DESCRIPTION_WIDTH: usize = 32;
const TIME_WIDTH: usize = 20;
const VALUE_WIDTH: usize = 13;
const THRESHOLD_WIDTH: usize = 23;

/// Local wall-clock time, second precision
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn user_summary(user: &User) -> String {
    format!(
        "User Information\n  Email: {}\n  Full Name: {}\n",
        user.email, user.full_name
    )
}

pub fn channel_table(channels: &[Channel]) -> String {
    if channels.is_empty() {
        return "No channels yet.\n\nCreate your first one with:\n  iot-console channels create <name> <description>\n"
            .to_string();
    }

    let mut out = String::from("Channels\n");
    out.push_str(&format!(
        "{:<name$} {:<desc$} {:<time$} {:<time$} {}\n",
        "Name",
        "Description",
        "Created At",
        "Updated At",
        "Open",
        name = NAME_WIDTH,
        desc = DESCRIPTION_WIDTH,
        time = TIME_WIDTH,
    ));
    out.push_str(&"-".repeat(NAME_WIDTH + DESCRIPTION_WIDTH + 2 * TIME_WIDTH + 20));
    out.push('\n');

    for channel in channels {
        out.push_str(&format!(
            "{:<name$} {:<desc$} {:<time$} {:<time$} {}\n",
            truncate(&channel.name, NAME_WIDTH),
            truncate(&channel.description, DESCRIPTION_WIDTH),
            format_timestamp(&channel.created_at),
            format_timestamp(&channel.updated_at),
            Route::Feed(channel.id.clone()),
            name = NAME_WIDTH,
            desc = DESCRIPTION_WIDTH,
            time = TIME_WIDTH,
        ));
    }
    out
}

pub fn feed_table(data: &FeedData) -> String {
    let mut out = format!("Channel: {}\n", data.channel.name);
    out.push_str(&format!(
        "{:<v$} {:<v$} {:<t$} {:<t$} {}\n",
        "Temperature",
        "Humidity",
        "Temperature Threshold",
        "Humidity Threshold",
        "Created At",
        v = VALUE_WIDTH,
        t = THRESHOLD_WIDTH,
    ));
    out.push_str(&"-".repeat(2 * VALUE_WIDTH + 2 * THRESHOLD_WIDTH + TIME_WIDTH + 4));
    out.push('\n');

    if data.readings.is_empty() {
        out.push_str("No readings yet.\n");
    }
    for reading in &data.readings {
        out.push_str(&feed_row(reading));
    }

    out.push('\n');
    out.push_str(&format!(
        "Page {} of {} ({} readings)\n",
        data.page,
        data.page_count(),
        data.total
    ));
    if data.pending_newer > 0 {
        out.push_str(&format!(
            "{} new reading(s) on page 1\n",
            data.pending_newer
        ));
    }
    out
}

fn feed_row(reading: &Feed) -> String {
    format!(
        "{:<v$} {:<v$} {:<t$} {:<t$} {}\n",
        reading.temperature,
        reading.humidity,
        reading.temperature_threshold,
        reading.humidity_threshold,
        format_timestamp(&reading.created_at),
        v = VALUE_WIDTH,
        t = THRESHOLD_WIDTH,
    )
}

pub fn keys_block(keys: &ChannelKeys) -> String {
    format!(
        "Read Key:  {}\nWrite Key: {}\n",
        keys.read_key, keys.write_key
    )
}

/// Single-line form of a live reading
pub fn reading_line(reading: &Feed) -> String {
    format!(
        "[{}] temperature {} (threshold {}), humidity {} (threshold {})",
        format_timestamp(&reading.created_at),
        reading.temperature,
        reading.temperature_threshold,
        reading.humidity,
        reading.humidity_threshold
    )
}

pub fn notification_line(notification: &Notification) -> String {
    let icon = match notification.kind {
        NotificationKind::Success => "✓",
        NotificationKind::Error => "✕",
    };
    format!("{} {}", icon, notification.message)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
