use crate::context::BotContext;
use crate::types::Command;
use crate::utils::strip_command_suffix;
use crate::{auth, callbacks, commands, pipeline};
use teloxide::{
    dispatching::{dialogue, dialogue::InMemStorage, UpdateHandler},
    prelude::*,
    types::{BotCommand, Me},
    utils::command::BotCommands,
};

pub use crate::types::State;

/// Menu entries with `CMD_SUFFIX` applied
pub fn bot_commands(suffix: &str) -> Vec<BotCommand> {
    Command::bot_commands()
        .into_iter()
        .map(|mut command| {
            command.command = format!("{}{}", command.command, suffix);
            command
        })
        .collect()
}

/// Register bot commands in Telegram menu
pub async fn set_bot_commands(bot: &Bot, suffix: &str) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(bot_commands(suffix)).await?;
    Ok(())
}

/// Parse the command token of a message, requiring the configured suffix
pub fn command_from_text(text: &str, suffix: &str, bot_name: &str) -> Option<Command> {
    let normalized = strip_command_suffix(text, suffix)?;
    let head = normalized.split_whitespace().next()?;
    Command::parse(head, bot_name).ok()
}

fn parse_command(msg: Message, me: Me, ctx: BotContext) -> Option<Command> {
    command_from_text(msg.text()?, &ctx.config.cmd_suffix, me.username())
}

fn private_with_source(msg: Message) -> bool {
    msg.chat.is_private() && pipeline::Source::from_message(&msg, false).is_some()
}

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let public = dptree::entry()
        .branch(case![Command::Start].endpoint(commands::start))
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Ping].endpoint(commands::ping));

    let authorized = dptree::filter_async(auth::message_is_authorized)
        .branch(case![Command::Mirror].endpoint(commands::mirror))
        .branch(case![Command::Leech].endpoint(commands::leech))
        .branch(case![Command::Ytdl].endpoint(commands::ytdl))
        .branch(case![Command::Status].endpoint(commands::status))
        .branch(case![Command::Cancel].endpoint(commands::cancel))
        .branch(case![Command::CancelAll].endpoint(commands::cancel_all))
        .branch(case![Command::Auth].endpoint(commands::auth))
        .branch(case![Command::Unauth].endpoint(commands::unauth))
        .branch(case![Command::Users].endpoint(commands::users))
        .branch(case![Command::Log].endpoint(commands::log))
        .branch(case![Command::Restart].endpoint(commands::restart));

    let command_handler = dptree::filter_map(parse_command)
        .branch(public)
        .branch(authorized)
        .branch(dptree::endpoint(commands::unauthorized));

    // Links sent in private chats without a command
    let bare_link_handler = dptree::filter(private_with_source)
        .branch(dptree::filter_async(auth::message_is_authorized).endpoint(commands::bare_link))
        .branch(dptree::endpoint(commands::unauthorized));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![State::AwaitingLink { target, ytdl }].endpoint(commands::receive_link))
        .branch(bare_link_handler)
        .branch(dptree::filter(|msg: Message| msg.chat.is_private()).endpoint(commands::invalid_state));

    let callback_handler = Update::filter_callback_query()
        .endpoint(callbacks::handle_callback);

    dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_handler)
}
