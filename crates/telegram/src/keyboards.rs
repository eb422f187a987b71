//! Inline keyboard builders

use engine::TaskInfo;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::constants::MAX_CANCEL_BUTTONS;
use crate::utils::truncate_name;

/// Cancel button attached to a task's own status message
pub fn task_keyboard(gid: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🚫 Cancel",
        format!("cancel:{}", gid),
    )]])
}

/// Buttons under `/status`
pub fn status_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🔄 Refresh", "status:refresh"),
        InlineKeyboardButton::callback("🚫 Cancel All", "cancelall"),
    ]])
}

/// One button per cancellable task, for `/cancel` without a gid
///
/// # Arguments
/// * `tasks` - Tasks the user may cancel, oldest first
pub fn cancel_keyboard(tasks: &[TaskInfo]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = tasks
        .iter()
        .take(MAX_CANCEL_BUTTONS)
        .map(|task| {
            vec![InlineKeyboardButton::callback(
                format!("🚫 {}", truncate_name(&task.name, 32)),
                format!("cancel:{}", task.gid),
            )]
        })
        .collect();
    if tasks.len() > 1 {
        rows.push(vec![InlineKeyboardButton::callback("🚫 Cancel All", "cancelall")]);
    }
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{Progress, TaskState, UploadTarget};
    use std::sync::Arc;
    use teloxide::types::InlineKeyboardButtonKind;

    fn task(gid: &str) -> TaskInfo {
        TaskInfo {
            gid: gid.to_string(),
            name: format!("{}.zip", gid),
            source: String::new(),
            target: UploadTarget::Drive,
            user_id: 1,
            chat_id: 1,
            state: TaskState::Queued,
            created_at: chrono::Utc::now(),
            progress: Arc::new(Progress::new()),
        }
    }

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("unexpected button kind {:?}", other),
        }
    }

    #[test]
    fn test_task_keyboard() {
        let keyboard = task_keyboard("0123456789abcdef");
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "cancel:0123456789abcdef");
    }

    #[test]
    fn test_cancel_keyboard_rows() {
        let single = cancel_keyboard(&[task("aaaa")]);
        assert_eq!(single.inline_keyboard.len(), 1);

        let tasks: Vec<TaskInfo> = (0..15).map(|i| task(&format!("{:016x}", i))).collect();
        let keyboard = cancel_keyboard(&tasks);
        assert_eq!(keyboard.inline_keyboard.len(), MAX_CANCEL_BUTTONS + 1);
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "cancel:0000000000000000");
        assert_eq!(callback_data(&keyboard.inline_keyboard[MAX_CANCEL_BUTTONS][0]), "cancelall");
    }

    #[test]
    fn test_callback_data_fits_telegram_limit() {
        let keyboard = task_keyboard("ffffffffffffffff");
        assert!(callback_data(&keyboard.inline_keyboard[0][0]).len() <= crate::constants::MAX_CALLBACK_DATA_LEN);
    }
}
