//! Who may do what

use std::collections::HashSet;

use engine::Config;
use teloxide::types::Message;

use crate::context::BotContext;

/// Nobody was restricted: no authorized chats and no sudo users were set
///
/// The owner alone does not close the bot.
pub fn is_open_mode(config: &Config) -> bool {
    config.authorized_chats.is_empty() && !config.sudo_configured
}

/// Every rule that does not need the database
pub fn is_statically_authorized(
    config: &Config,
    runtime: &HashSet<u64>,
    user_id: u64,
    chat_id: i64,
) -> bool {
    config.is_owner(user_id)
        || config.is_sudo(user_id)
        || config.authorized_chats.contains(&chat_id)
        || runtime.contains(&user_id)
        || is_open_mode(config)
}

/// Submitters manage their own tasks, sudo users manage all
pub fn can_manage_task(config: &Config, task_owner: u64, user_id: u64) -> bool {
    task_owner == user_id || config.is_sudo(user_id)
}

/// dptree filter for commands that need authorization
pub async fn message_is_authorized(msg: Message, ctx: BotContext) -> bool {
    match msg.from() {
        Some(user) => ctx.is_authorized(user.id.0, msg.chat.id.0).await,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::config_with;

    #[test]
    fn test_open_mode() {
        assert!(is_open_mode(&config_with(&[])));
        assert!(!is_open_mode(&config_with(&[("SUDO_USERS", "5")])));
        assert!(!is_open_mode(&config_with(&[("AUTHORIZED_CHATS", "-1001")])));
    }

    #[test]
    fn test_static_rules() {
        let config = config_with(&[("AUTHORIZED_CHATS", "-1001"), ("SUDO_USERS", "5")]);
        let mut runtime = HashSet::new();

        assert!(is_statically_authorized(&config, &runtime, 100, 1));
        assert!(is_statically_authorized(&config, &runtime, 5, 1));
        assert!(is_statically_authorized(&config, &runtime, 42, -1001));
        assert!(!is_statically_authorized(&config, &runtime, 42, 42));

        runtime.insert(42);
        assert!(is_statically_authorized(&config, &runtime, 42, 42));
    }

    #[test]
    fn test_task_management_rights() {
        let config = config_with(&[("SUDO_USERS", "5")]);
        assert!(can_manage_task(&config, 42, 42));
        assert!(can_manage_task(&config, 42, 5));
        assert!(can_manage_task(&config, 42, 100));
        assert!(!can_manage_task(&config, 42, 43));
    }
}
