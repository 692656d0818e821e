//! Minimal terminal front end.
//!
//! Rendering only: all state lives in the core components, this module reads
//! stdin lines, dispatches them and prints feed updates as they land.

use std::sync::Arc;

use anonchat_core::{
    app::ChatApp,
    domain::{InviteStatus, Message, MessageId},
    sync::MessageFeed,
};
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

pub async fn run(app: Arc<ChatApp>) -> anyhow::Result<()> {
    let printer = spawn_feed_printer(app.feed());

    println!("anonchat — pick a nickname to join (/quit to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        if app.session().await.is_none() {
            join(&app, line).await;
            continue;
        }

        dispatch(&app, line).await;
    }

    app.leave().await;
    printer.abort();
    Ok(())
}

async fn join(app: &ChatApp, nickname: &str) {
    match app.join(nickname).await {
        Ok(session) => println!(
            "joined as {} — type to chat, /help for commands",
            session.nickname
        ),
        Err(e) => println!("could not join: {e}"),
    }
}

async fn dispatch(app: &ChatApp, line: &str) {
    let (command, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match command {
        "/help" => print_help(),
        "/invite" => match app.invite(rest).await {
            Ok(inv) => println!("invited @{} — link: {}", inv.telegram_username, inv.invite_link),
            // The input is echoed back so the user can retry it.
            Err(e) => println!("invite failed ({e}) — not sent: {rest}"),
        },
        "/invites" => {
            let invitations = app.invitations().await;
            if invitations.is_empty() {
                println!("no invitations yet");
            }
            for inv in invitations {
                let status = match inv.status {
                    InviteStatus::Pending => "pending",
                    InviteStatus::Accepted => "accepted",
                };
                println!("@{} — {status}", inv.telegram_username);
            }
        }
        "/nick" => match app.change_nickname(rest).await {
            Ok(session) => println!("you are now {}", session.nickname),
            Err(e) => println!("nickname change failed: {e}"),
        },
        "/me" => {
            let stats = app.stats().await;
            if let Some(session) = app.session().await {
                println!(
                    "{} — {} messages sent, {} invitations sent",
                    session.nickname, stats.messages_sent, stats.invitations_sent
                );
            }
        }
        "/leave" => {
            app.leave().await;
            println!("left — pick a nickname to join again");
        }
        _ if command.starts_with('/') => println!("unknown command {command} — try /help"),
        _ => {
            if let Err(e) = app.send_message(line).await {
                // Not delivered; echo the text back so the user can retry.
                println!("send failed ({e}) — not delivered: {line}");
            }
        }
    }
}

fn print_help() {
    println!("/invite <telegram user>  send an invitation");
    println!("/invites                 list invitations and their status");
    println!("/nick <name>             change nickname (new identity)");
    println!("/me                      profile counters");
    println!("/leave                   back to the landing screen");
    println!("/quit                    exit");
}

/// Print messages as the feed changes, tracking the highest id already shown.
/// An emptied feed (leave/rejoin) resets the cursor.
fn spawn_feed_printer(feed: Arc<MessageFeed>) -> JoinHandle<()> {
    let mut rx = feed.subscribe();
    tokio::spawn(async move {
        let mut last_seen: Option<MessageId> = None;
        while rx.changed().await.is_ok() {
            let snapshot = feed.snapshot().await;
            if snapshot.is_empty() {
                last_seen = None;
                continue;
            }
            for message in snapshot
                .iter()
                .filter(|m| last_seen.map_or(true, |seen| m.id > seen))
            {
                print_message(message);
            }
            last_seen = snapshot.last().map(|m| m.id);
        }
    })
}

fn print_message(message: &Message) {
    let when = Local
        .timestamp_millis_opt(message.timestamp)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    println!("[{when}] {}: {}", message.nickname, message.text);
}
