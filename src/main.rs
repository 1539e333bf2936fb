use anyhow::Context;
use evcare_realtime::bootstrap;
use evcare_realtime::config::Config;
use evcare_realtime::infrastructure::observability;
use evcare_realtime::{AdminInbox, ChatWidget, RealtimeEvent, RealtimeSession};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Which surface the console drives
enum Surface {
    Widget(Arc<ChatWidget>),
    Inbox(Arc<AdminInbox>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = observability::init() {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");
    let user_id = config.require_user_id()?.to_string();

    let session = bootstrap::build_session(&config, &user_id)?;

    // Console printer for live events
    let mut events = session.connection().events();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(RealtimeEvent::Message(m)) => println!("<{}> {}", m.sender_id, m.content),
                Ok(RealtimeEvent::Notification(n)) => println!("[notification] {}", n.title),
                Ok(RealtimeEvent::UnreadCount(count)) => println!("[unread] {}", count),
                Ok(RealtimeEvent::Connected { .. }) => println!("[connected]"),
                Ok(RealtimeEvent::Disconnected { .. }) => println!("[reconnecting...]"),
                Ok(RealtimeEvent::Error(e)) => println!("[error] {}", e),
                Err(e) => tracing::warn!("Console printer lagged: {}", e),
            }
        }
    });

    session.start().await;

    let bell = session.open_notification_bell().await?;
    let surface = match session.open_chat_widget().await {
        Ok(widget) => {
            widget.open().await.ok();
            Surface::Widget(widget)
        }
        Err(_) => {
            tracing::info!("No customer assignment, opening the staff inbox");
            Surface::Inbox(session.open_admin_inbox().await?)
        }
    };

    println!("Commands: /history [page] | /select <customer> | /list | /bell | /quit; anything else is sent");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(line.trim(), &session, &surface, &bell).await {
                    break;
                }
            }
        }
    }

    session.shutdown().await;
    printer.abort();
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_line(
    line: &str,
    session: &RealtimeSession,
    surface: &Surface,
    bell: &evcare_realtime::NotificationBell,
) -> bool {
    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    match (command, surface) {
        ("", _) => {}
        ("/quit", _) => return false,
        ("/bell", _) => {
            for n in bell.notifications().await {
                let mark = if n.is_read { " " } else { "*" };
                println!("{} [{}] {}: {}", mark, n.notification_type.as_str(), n.title, n.content);
            }
        }
        ("/history", Surface::Widget(widget)) => {
            let page = arg.parse().unwrap_or(0);
            if widget.load_history(page).await.is_ok() {
                for m in widget.messages().await {
                    println!("{} {} -> {}: {}", m.sent_at.format("%H:%M:%S"), m.sender_id, m.receiver_id, m.content);
                }
            }
        }
        ("/history", Surface::Inbox(inbox)) => {
            if let Some(selected) = inbox.selected().await {
                let _ = inbox.load_more(arg.parse().unwrap_or(0)).await;
                for m in inbox.messages(&selected).await {
                    println!("{} {} -> {}: {}", m.sent_at.format("%H:%M:%S"), m.sender_id, m.receiver_id, m.content);
                }
            }
        }
        ("/select", Surface::Inbox(inbox)) => {
            let _ = inbox.select(arg).await;
        }
        ("/list", Surface::Inbox(inbox)) => {
            for entry in inbox.conversation_list().await {
                let preview = entry.last_message.map(|m| m.content).unwrap_or_default();
                println!("{} ({} unread) {}", entry.counterpart_id, entry.unread, preview);
            }
        }
        (command, _) if command.starts_with('/') => println!("Unknown command {}", command),
        (_, Surface::Widget(widget)) => {
            let _ = widget.send(line, None).await;
        }
        (_, Surface::Inbox(inbox)) => {
            let _ = inbox.send(line, None).await;
        }
    }
    tracing::debug!(state = ?session.state().await, "Command handled");
    true
}
