// WebSocket server: the trigger surface league clients and schedulers call.

use std::sync::Arc;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use draftroom_core::{DraftEngine, DraftError};

use crate::protocol::{parse_request, Reply, Request};

/// Bind the listener on `127.0.0.1:{port}`. Port 0 picks a free port.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections until `shutdown` flips to `true` (or its sender is
/// dropped). Each connection is served on its own task, so a slow client
/// never holds up another league.
pub async fn run(
    listener: TcpListener,
    engine: Arc<DraftEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    handle_connection(stream, addr.to_string(), engine).await;
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("WebSocket server stopped");
    Ok(())
}

async fn handle_connection(stream: TcpStream, addr: String, engine: Arc<DraftEngine>) {
    info!("Accepted TCP connection from {addr}");
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            if let Err(e) = write.send(Message::Text(reply.into())).await {
                warn!("Failed to send reply to {writer_addr}: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &engine, &tx, &addr).await;
    drop(tx);
    let _ = writer.await;
    info!("Client {addr} disconnected");
}

/// Answer every text frame from `stream` through `replies`, in order.
/// Returns `Err(())` if the reply channel is closed.
///
/// Generic over the stream type so it can be tested with in-memory streams
/// without opening TCP ports.
pub async fn process_message_stream<St>(
    mut stream: St,
    engine: &DraftEngine,
    replies: &mpsc::Sender<String>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = handle_request(engine, text.as_str()).await;
                if replies.send(reply).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

/// Handle one raw JSON request and return the JSON reply.
pub async fn handle_request(engine: &DraftEngine, text: &str) -> String {
    let reply = match parse_request(text) {
        Ok(request) => dispatch(engine, request).await,
        Err(e) => {
            debug!("Rejecting malformed request: {e}");
            Reply::bad_request(format!("malformed request: {e}"))
        }
    };
    serde_json::to_string(&reply).unwrap_or_else(|e| {
        error!("Failed to encode reply: {e}");
        r#"{"type":"error","code":"internal","message":"draft error, please retry"}"#.to_string()
    })
}

/// Route a parsed request to the engine.
pub async fn dispatch(engine: &DraftEngine, request: Request) -> Reply {
    let result = match &request {
        Request::Prepare { league_id } => engine
            .prepare(league_id)
            .await
            .map(|state| Reply::State { state }),
        Request::Start { league_id } => engine
            .start(league_id)
            .await
            .map(|state| Reply::State { state }),
        Request::SubmitPick { .. } => match request.to_pick_request() {
            Some(pick) => engine
                .submit_pick(&pick)
                .await
                .map(|outcome| Reply::PickAccepted {
                    pick: outcome.pick,
                    state: outcome.state,
                }),
            None => return Reply::bad_request("not a pick request"),
        },
        Request::Timeout {
            league_id,
            deadline_at,
        } => engine
            .timeout_at(league_id, *deadline_at)
            .await
            .map(|outcome| Reply::TimeoutResolved {
                autopick: outcome.autopick,
                state: outcome.state,
            }),
        Request::GetState { league_id } => engine
            .state(league_id)
            .await
            .map(|state| Reply::State { state }),
        Request::ListPicks { league_id } => engine.picks(league_id).await.map(|picks| {
            Reply::Picks {
                league_id: league_id.clone(),
                picks,
            }
        }),
        Request::ListRosters { league_id } => engine.rosters(league_id).await.map(|rosters| {
            Reply::Rosters {
                league_id: league_id.clone(),
                rosters,
            }
        }),
        Request::ListEvents { league_id } => engine.events(league_id).await.map(|events| {
            Reply::Events {
                league_id: league_id.clone(),
                events,
            }
        }),
        Request::Pause { league_id, by } => engine
            .pause(league_id, by.as_deref())
            .await
            .map(|state| Reply::State { state }),
        Request::Resume { league_id, by } => engine
            .resume(league_id, by.as_deref())
            .await
            .map(|state| Reply::State { state }),
        Request::Cancel { league_id, by } => engine
            .cancel(league_id, by.as_deref())
            .await
            .map(|state| Reply::State { state }),
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            log_rejection(request.league_id(), &e);
            Reply::from_error(&e)
        }
    }
}

fn log_rejection(league_id: &str, e: &DraftError) {
    if e.is_user_facing() {
        debug!("League {league_id}: rejected: {e}");
    } else if e.is_concurrency_conflict() {
        info!("League {league_id}: {e}");
    } else if e.is_fatal() {
        error!("League {league_id}: {e}");
    } else {
        match e {
            DraftError::NotFound { .. } | DraftError::InvalidState { .. } => {
                debug!("League {league_id}: rejected: {e}")
            }
            _ => error!("League {league_id}: request failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use draftroom_core::draft::clock::ManualClock;
    use draftroom_core::draft::order::DraftOrderMode;
    use draftroom_core::draft::pool::PlayerRecord;
    use draftroom_core::gateway::InMemoryGateway;
    use draftroom_core::services::{LeagueSettings, StaticLeagueDirectory, StaticPlayerDirectory};
    use draftroom_core::EngineSettings;
    use futures_util::stream;
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn engine() -> DraftEngine {
        let mut league = LeagueSettings::new("lg", vec!["A".into(), "B".into()]);
        league.total_rounds = 2;
        league.pick_time_seconds = 30;
        league.draft_order_mode = DraftOrderMode::Manual;
        league.manual_order = vec!["A".into(), "B".into()];

        let players = (1..=6)
            .map(|i| PlayerRecord {
                player_id: format!("p{i}"),
                name: format!("Player {i}"),
                position: "RB".into(),
                team: "FA".into(),
                rank: i,
                eligible: true,
            })
            .collect();

        DraftEngine::new(
            Arc::new(InMemoryGateway::new()),
            Arc::new(StaticLeagueDirectory::new(vec![league])),
            Arc::new(StaticPlayerDirectory::new(players)),
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap(),
            )),
            EngineSettings::default(),
        )
    }

    async fn call(engine: &DraftEngine, text: &str) -> Value {
        serde_json::from_str(&handle_request(engine, text).await).unwrap()
    }

    #[tokio::test]
    async fn start_then_pick() {
        let engine = engine();
        let reply = call(&engine, r#"{"type":"start","league_id":"lg"}"#).await;
        assert_eq!(reply["type"], "state");
        assert_eq!(reply["state"]["onClockTeamId"], "A");

        let reply = call(
            &engine,
            r#"{"type":"submit_pick","league_id":"lg","team_id":"A","player_id":"p1"}"#,
        )
        .await;
        assert_eq!(reply["type"], "pick_accepted");
        assert_eq!(reply["pick"]["overallPickNumber"], 1);
        assert_eq!(reply["state"]["onClockTeamId"], "B");
    }

    #[tokio::test]
    async fn out_of_turn_pick_is_user_facing() {
        let engine = engine();
        call(&engine, r#"{"type":"start","league_id":"lg"}"#).await;
        let reply = call(
            &engine,
            r#"{"type":"submit_pick","league_id":"lg","team_id":"B","player_id":"p1"}"#,
        )
        .await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "not_your_turn");
        assert!(reply["message"].as_str().unwrap().contains("not on the clock"));
    }

    #[tokio::test]
    async fn unknown_league_and_bad_json() {
        let engine = engine();
        let reply = call(&engine, r#"{"type":"get_state","league_id":"nope"}"#).await;
        assert_eq!(reply["code"], "not_found");

        let reply = call(&engine, "{").await;
        assert_eq!(reply["code"], "bad_request");
    }

    #[tokio::test]
    async fn stream_replies_in_order_and_stops_at_close() {
        let engine = engine();
        let (tx, mut rx) = mpsc::channel(16);
        let messages: Vec<Result<Message, WsError>> = vec![
            Ok(Message::Text(r#"{"type":"start","league_id":"lg"}"#.into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Text(r#"{"type":"list_picks","league_id":"lg"}"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"cancel","league_id":"lg"}"#.into())),
        ];

        process_message_stream(stream::iter(messages), &engine, &tx, "test")
            .await
            .unwrap();

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "state");
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "picks");
        assert_eq!(second["picks"], serde_json::json!([]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_reply_channel_is_reported() {
        let engine = engine();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let messages: Vec<Result<Message, WsError>> =
            vec![Ok(Message::Text(r#"{"type":"get_state","league_id":"lg"}"#.into()))];
        let result = process_message_stream(stream::iter(messages), &engine, &tx, "test").await;
        assert!(result.is_err());
    }
}
