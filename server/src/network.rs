//! TCP transport speaking newline-delimited JSON
//!
//! Thin plumbing around the engine: an accept loop, one reader task and
//! one writer task per connection. The reader decodes each line into a
//! `ClientCommand` and dispatches it; anything that does not decode is
//! dropped without a reply. The writer drains the player's outbound
//! channel, so engine sends never block on a slow client and per-player
//! ordering falls out of the channel.

use crate::game::Game;
use crate::player::Outbox;
use log::{debug, error, info, warn};
use shared::protocol::{ClientCommand, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Accepts connections until shutdown, spawning a session task per
/// client. The listener is bound by the caller so tests can use an
/// ephemeral port.
pub async fn serve(
    game: Arc<Game>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("Accepting connections on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    let game = Arc::clone(&game);
                    tokio::spawn(async move {
                        handle_connection(game, stream, addr).await;
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            _ = shutdown.changed() => {
                info!("Stopped accepting connections");
                break;
            }
        }
    }

    Ok(())
}

/// One client session: register the player, pump frames both ways,
/// deregister on any exit path. `remove_player` is idempotent, so a
/// racing shutdown path calling it again is harmless.
async fn handle_connection(game: Arc<Game>, stream: TcpStream, addr: SocketAddr) {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let id = game.add_player(Outbox::new(tx));
    info!("Player {} connected from {}", id, addr);

    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<ClientCommand>(&line) {
                Ok(command) => dispatch(&game, id, command),
                Err(_) => debug!("Dropping malformed frame from player {}", id),
            },
            Ok(None) => break,
            Err(e) => {
                debug!("Read error for player {}: {}", id, e);
                break;
            }
        }
    }

    game.remove_player(id);
    writer_task.abort();
    info!("Player {} disconnected", id);
}

/// Serializes each outbound message as one JSON line. Stops on the
/// first write failure; the read side notices the broken socket and
/// tears the session down.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode outbound frame: {}", e);
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn dispatch(game: &Game, id: u32, command: ClientCommand) {
    match command {
        ClientCommand::Move { x, y } => game.move_player(id, x, y),
        ClientCommand::Equip { item_id, slot } => game.equip(id, item_id, slot),
        ClientCommand::Unequip { slot } => game.unequip(id, slot),
        ClientCommand::Sell { item_id } => game.sell(id, item_id),
        ClientCommand::MarketList { item_id, price } => game.market_list(id, item_id, price),
        ClientCommand::MarketBuy { listing_id } => game.market_buy(id, listing_id),
    }
}
