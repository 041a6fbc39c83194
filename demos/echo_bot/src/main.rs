//! Echo Bot Demo
//!
//! The smallest useful filament bot:
//!
//! - `/echo <text>`: echoes the captured text back as a reply
//! - `/whoami`: tells the sender who they are
//! - any other private message: gently points at `/echo`
//!
//! # Usage
//!
//! ```bash
//! FILAMENT_TOKEN="123:abc" cargo run --package echo-bot
//! ```
//!
//! Configuration can also come from a `filament.toml` next to the binary;
//! environment variables win over the file.

use anyhow::Result;
use filament::prelude::*;
use tracing::info;

async fn echo(chat: Chat, m: TextMatch) -> HandlerResult {
    chat.reply(m.group(1).unwrap_or_default()).await?;
    Ok(())
}

async fn whoami(chat: Chat, _m: TextMatch) -> HandlerResult {
    let name = chat
        .message()
        .and_then(|message| message.from.as_ref())
        .map(|user| user.display_name())
        .unwrap_or_else(|| "a mystery".to_string());
    chat.reply(&format!("You are {name}")).await?;
    Ok(())
}

async fn fallback(chat: Chat, message: Message) -> HandlerResult {
    info!(chat_id = message.chat.id, "unrecognized message");
    chat.send_text("Try /echo <something>").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new().with_current_dir().load()?;
    logging::init(&config.logging);

    Bot::from_config(config)?
        .command(r"/echo (.+)", echo)?
        .command(r"/whoami", whoami)?
        .default_message(fallback)
        .run()
        .await?;
    Ok(())
}
