//! Utility functions for formatting and parsing

use crate::constants::PROGRESS_BAR_CELLS;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let value = bytes as f64;
    let unit_index = ((value.ln() / 1024_f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let size = value / 1024_f64.powi(unit_index as i32);

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed (bytes/sec) in human-readable format
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec < 1.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_size(bytes_per_sec as u64))
}

/// Format ETA (seconds) to human-readable duration
pub fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        Some(secs) => format_duration(secs),
        None => "∞".to_string(),
    }
}

/// Format a duration as `1d 2h`, `2h 5m`, `5m 3s` or `3s`
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Render a bar like `[■■■■■□□□□□□□]` for a 0-100 percentage
pub fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * PROGRESS_BAR_CELLS as f64).round() as usize;
    format!(
        "[{}{}]",
        "■".repeat(filled),
        "□".repeat(PROGRESS_BAR_CELLS - filled)
    )
}

/// Parse command arguments from message text
pub fn parse_args(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Parse the user id argument of `/auth` and `/unauth`
pub fn extract_user_id_arg(args: &[&str]) -> Result<u64, String> {
    let raw = args.get(1).ok_or_else(|| "Missing user id argument".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("Invalid user id: {}", raw))
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Shorten long names for status lines, keeping whole characters
pub fn truncate_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let kept: String = name.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

/// Rewrite `/<cmd><suffix>[@bot] args` to `/<cmd>[@bot] args`
///
/// With a non-empty suffix, commands without it are rejected so several
/// bots can share a group.
///
/// # Returns
/// * `None` if the text is not a suffixed command
pub fn strip_command_suffix(text: &str, suffix: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('/') {
        return None;
    }
    if suffix.is_empty() {
        return Some(trimmed.to_string());
    }

    let (head, rest) = match trimmed.find(char::is_whitespace) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let (command, mention) = match head.find('@') {
        Some(idx) => head.split_at(idx),
        None => (head, ""),
    };

    let lowered = command.to_lowercase();
    let suffix = suffix.to_lowercase();
    let base = lowered.strip_suffix(suffix.as_str())?;
    if base.len() <= 1 {
        return None;
    }
    Some(format!("{}{}{}", base, mention, rest))
}
