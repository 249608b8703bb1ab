//! Interactive chat client
//!
//! Prompts for a display name, then sends every input line as a sealed
//! message. Type `exit` to quit.

use anyhow::{Context, Result};
use clap::Parser;
use codec::ProtocolError;
use relays::core::{ChatClient, ChatHandler, ClientConfig};
use relays::init_logging;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "chat_client")]
#[command(about = "Console client for the chat relay")]
#[command(version)]
struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

struct ConsolePrinter;

impl ChatHandler for ConsolePrinter {
    fn on_message_received(&self, text: &str) {
        println!("Received: {}", text);
    }

    fn on_member_joined(&self, name: &str) {
        println!("* {} joined", name);
    }

    fn on_member_left(&self, name: &str) {
        println!("* {} left", name);
    }

    fn on_roster_entry(&self, name: &str) {
        println!("* online: {}", name);
    }

    fn on_rejected(&self) {
        println!("! relay rejected your last message");
    }

    fn on_corrupt_message(&self, error: &ProtocolError) {
        println!("! dropped a corrupted message ({})", error);
    }

    fn on_disconnected(&self) {
        println!("* disconnected from relay");
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, false) {
        eprintln!("{:#}", e);
        std::process::exit(-1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut client = match join(&args, &mut lines).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to join: {:#}", e);
            eprintln!("Failed to join: {:#}", e);
            std::process::exit(-1);
        }
    };

    if let Err(e) = chat(&mut client, &mut lines).await {
        error!("Chat session ended with error: {:#}", e);
    }

    if let Err(e) = client.close().await {
        error!("Failed to close connection: {}", e);
    }
}

async fn join<R>(
    args: &Args,
    lines: &mut tokio::io::Lines<R>,
) -> Result<ChatClient>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    print!("Enter your name: ");
    std::io::stdout().flush()?;

    let name = lines
        .next_line()
        .await?
        .context("stdin closed before a name was entered")?;

    let config = ClientConfig {
        server_address: args.server.clone(),
        ..ClientConfig::default()
    };
    let client = ChatClient::connect_with_config(&config, &name, ConsolePrinter).await?;
    Ok(client)
}

async fn chat<R>(client: &mut ChatClient, lines: &mut tokio::io::Lines<R>) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = client.disconnected() => return Ok(()),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(());
        };

        let text = line.trim_end_matches('\r');
        if text == "exit" {
            return Ok(());
        }

        client
            .send_user_message(text)
            .await
            .context("Failed to send message")?;
    }
}
