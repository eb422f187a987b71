//! HTML rendering of task status messages

use std::collections::HashMap;

use engine::{TaskInfo, TaskState};

use crate::constants::{emoji, MAX_NAME_DISPLAY};
use crate::utils::{
    escape_html, format_duration, format_eta, format_size, format_speed, progress_bar, truncate_name,
};

fn state_emoji(state: TaskState) -> &'static str {
    match state {
        TaskState::Queued => emoji::QUEUED,
        TaskState::Downloading => emoji::DOWNLOAD,
        TaskState::Uploading => emoji::UPLOAD,
        TaskState::Completed => emoji::SUCCESS,
        TaskState::Failed | TaskState::Interrupted => emoji::ERROR,
        TaskState::Cancelled => emoji::CANCELLED,
    }
}

/// One task block, as shown in its own status message and in `/status`
pub fn format_task(info: &TaskInfo) -> String {
    let snapshot = info.progress.snapshot();
    let mut text = format!(
        "{} <b>{}</b>\n\
         🆔 <code>{}</code>\n\
         {} {}: <b>{}</b>\n",
        emoji::FOLDER,
        escape_html(&truncate_name(&info.name, MAX_NAME_DISPLAY)),
        info.gid,
        state_emoji(info.state),
        info.target.verb(),
        info.state.label(),
    );

    if matches!(info.state, TaskState::Downloading | TaskState::Uploading) {
        let total = if snapshot.total > 0 {
            format_size(snapshot.total)
        } else {
            "?".to_string()
        };
        text.push_str(&format!(
            "{} {:.1}%\n\
             {} {} / {}\n\
             {} {} | {} {}\n",
            progress_bar(snapshot.percent),
            snapshot.percent,
            emoji::SIZE,
            format_size(snapshot.done),
            total,
            emoji::SPEED,
            format_speed(snapshot.speed),
            emoji::TIME,
            format_eta(snapshot.eta),
        ));
    }

    text.push_str(&format!("{} <code>/cancel {}</code>", emoji::CANCELLED, info.gid));
    text
}

/// Body of `/status`: up to `limit` tasks followed by totals
pub fn format_status(
    tasks: &[TaskInfo],
    limit: usize,
    uptime_seconds: u64,
    counts: &HashMap<TaskState, usize>,
) -> String {
    let mut text = String::new();

    if tasks.is_empty() {
        text.push_str(&format!("{} No active tasks.\n\n", emoji::INFO));
    } else {
        for info in tasks.iter().take(limit.max(1)) {
            text.push_str(&format_task(info));
            text.push_str("\n\n");
        }
        if tasks.len() > limit.max(1) {
            text.push_str(&format!("… and {} more\n\n", tasks.len() - limit.max(1)));
        }
    }

    let count = |state: TaskState| counts.get(&state).copied().unwrap_or(0);
    text.push_str(&format!(
        "{} Tasks: {} | {} {} | {} {} | {} {}\n{} Uptime: {}",
        emoji::INFO,
        tasks.len(),
        emoji::QUEUED,
        count(TaskState::Queued),
        emoji::DOWNLOAD,
        count(TaskState::Downloading),
        emoji::UPLOAD,
        count(TaskState::Uploading),
        emoji::TIME,
        format_duration(uptime_seconds),
    ));
    text
}

/// Final state of a finished task
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    pub size: u64,
    pub files: usize,
    pub elapsed_seconds: u64,
    pub link: Option<String>,
    /// Set when leeched files went to the dump chat
    pub dump_chat: Option<i64>,
}

pub fn format_summary(verb: &str, summary: &Summary) -> String {
    let mut text = format!(
        "{} <b>{} completed</b>\n\n\
         {} Name: <code>{}</code>\n\
         {} Size: {}\n\
         {} Files: {}\n\
         {} Elapsed: {}",
        emoji::SUCCESS,
        verb,
        emoji::FOLDER,
        escape_html(&summary.name),
        emoji::SIZE,
        format_size(summary.size),
        emoji::FILES,
        summary.files,
        emoji::TIME,
        format_duration(summary.elapsed_seconds),
    );
    if let Some(link) = &summary.link {
        text.push_str(&format!(
            "\n{} <a href=\"{}\">Open in Google Drive</a>",
            emoji::LINK,
            escape_html(link)
        ));
    }
    if let Some(chat) = summary.dump_chat {
        text.push_str(&format!("\n{} Sent to <code>{}</code>", emoji::UPLOAD, chat));
    }
    text
}

pub fn format_failure(verb: &str, name: &str, reason: &str) -> String {
    format!(
        "{} <b>{} failed</b>\n\n{} <code>{}</code>\n{}",
        emoji::ERROR,
        verb,
        emoji::FOLDER,
        escape_html(name),
        escape_html(reason)
    )
}

pub fn format_cancelled(verb: &str, name: &str) -> String {
    format!(
        "{} <b>{} cancelled</b>\n\n{} <code>{}</code>",
        emoji::CANCELLED,
        verb,
        emoji::FOLDER,
        escape_html(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{Progress, UploadTarget};
    use std::sync::Arc;

    fn task(state: TaskState, name: &str) -> TaskInfo {
        TaskInfo {
            gid: "0123456789abcdef".to_string(),
            name: name.to_string(),
            source: "https://example.com/x".to_string(),
            target: UploadTarget::Telegram,
            user_id: 1,
            chat_id: 1,
            state,
            created_at: chrono::Utc::now(),
            progress: Arc::new(Progress::new()),
        }
    }

    #[test]
    fn test_queued_task_has_no_progress_line() {
        let text = format_task(&task(TaskState::Queued, "a<b>.zip"));
        assert!(text.contains("a&lt;b&gt;.zip"));
        assert!(text.contains("<code>0123456789abcdef</code>"));
        assert!(text.contains("Leech: <b>Queued</b>"));
        assert!(!text.contains("□"));
        assert!(text.contains("/cancel 0123456789abcdef"));
    }

    #[test]
    fn test_downloading_task_shows_progress() {
        let info = task(TaskState::Downloading, "file.bin");
        info.progress.start_phase(1024);
        info.progress.advance(512);
        let text = format_task(&info);
        assert!(text.contains("50.0%"));
        assert!(text.contains("[■■■■■■□□□□□□]"));
        assert!(text.contains("512.00 B / 1.00 KB"));
    }

    #[test]
    fn test_status_respects_limit() {
        let tasks: Vec<TaskInfo> = (0..5)
            .map(|i| task(TaskState::Queued, &format!("t{}", i)))
            .collect();
        let mut counts = HashMap::new();
        counts.insert(TaskState::Queued, 5);

        let text = format_status(&tasks, 2, 65, &counts);
        assert_eq!(text.matches("Leech: <b>Queued</b>").count(), 2);
        assert!(text.contains("… and 3 more"));
        assert!(text.contains("Tasks: 5"));
        assert!(text.contains("Uptime: 1m 5s"));
    }

    #[test]
    fn test_empty_status() {
        let text = format_status(&[], 4, 3, &HashMap::new());
        assert!(text.contains("No active tasks"));
        assert!(text.contains("Tasks: 0"));
    }

    #[test]
    fn test_summary_with_link() {
        let summary = Summary {
            name: "folder".to_string(),
            size: 2048,
            files: 3,
            elapsed_seconds: 61,
            link: Some("https://drive.google.com/drive/folders/abc".to_string()),
            dump_chat: None,
        };
        let text = format_summary("Mirror", &summary);
        assert!(text.contains("Mirror completed"));
        assert!(text.contains("Files: 3"));
        assert!(text.contains("2.00 KB"));
        assert!(text.contains("href=\"https://drive.google.com/drive/folders/abc\""));
        assert!(!text.contains("Sent to"));
    }
}
