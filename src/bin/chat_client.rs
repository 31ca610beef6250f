//! Terminal chat client
//!
//! Usage: `chat_client <username> [ws://host:port]`
//!
//! Plain lines are broadcast. `/to <connection-id> <text>` sends privately,
//! `/users` lists who is online and `/quit` leaves.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use presence_chat::{
    ChatClient, ChatFeed, ClientConfig, ConnectionId, ConnectionStatus, FeedEntry, LogNotifier,
    Scope,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("presence_chat=warn")),
        )
        .init();

    let mut args = env::args().skip(1);
    let username = args.next().ok_or("usage: chat_client <username> [url]")?;
    let mut config = ClientConfig::default();
    if let Some(url) = args.next() {
        config.url = url;
    }

    let (handle, task) = ChatClient::spawn(config, username, Box::new(LogNotifier));

    // Print new feed lines and status changes as they arrive
    let mut feed = handle.feed();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        let mut status = ConnectionStatus::Connecting;
        while feed.changed().await.is_ok() {
            let current = feed.borrow_and_update().clone();
            if current.status != status {
                status = current.status;
                println!("-- {:?}", status);
            }
            for entry in &current.messages[printed..] {
                println!("{}", render(entry, &current));
            }
            printed = current.messages.len();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        } else if line == "/users" {
            let feed = handle.feed();
            let current = feed.borrow();
            for user in &current.users {
                println!("  {} {}", user.id, user.username);
            }
        } else if let Some(rest) = line.strip_prefix("/to ") {
            let Some((id, body)) = rest.split_once(' ') else {
                println!("usage: /to <connection-id> <text>");
                continue;
            };
            match id.parse::<ConnectionId>() {
                Ok(to) => handle.send_private(to, body).await?,
                Err(e) => println!("bad connection id: {}", e),
            }
        } else {
            handle.send(line).await?;
        }
    }

    let _ = handle.disconnect().await;
    let result = task.await?;
    printer.abort();
    result?;

    Ok(())
}

fn render(entry: &FeedEntry, feed: &ChatFeed) -> String {
    match entry {
        FeedEntry::System(notice) => format!("* {}", notice.text()),
        FeedEntry::Chat(message) => match message.scope {
            Scope::Broadcast => format!("<{}> {}", message.sender, message.body),
            Scope::Private(to) if Some(message.sender_id) == feed.connection_id => {
                format!("[to {}] {}", to, message.body)
            }
            Scope::Private(_) => format!(
                "[from {} {}] {}",
                message.sender, message.sender_id, message.body
            ),
        },
    }
}
