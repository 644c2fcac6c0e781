//! Worker host: the authority behind a line-delimited JSON stream.
//!
//! Protocol (one JSON document per line):
//! - host → client, once on start: `{"event": {"name": "ready", "data": {...}}}`
//! - client → host: `{"id": 1, "type": "spin" | "balance" | "gameState", "data": {...}}`
//! - host → client: `{"id": 1, "success": true, "data": ...}` or `{"id": 1, "success": false, "error": "..."}`
//!
//! Requests are answered in arrival order. The host exits when its input closes.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use reelnexus_shared::{
    PushEvent, ReplyEnvelope, RequestEnvelope, RequestPayload, WorkerInbound,
};

use crate::authority::GameAuthority;
use crate::error::WorkerHostError;

pub const READY_EVENT: &str = "ready";

/// Serve `authority` until `reader` reaches end of stream.
pub async fn serve<R, W>(
    authority: Arc<dyn GameAuthority>,
    reader: R,
    mut writer: W,
) -> Result<(), WorkerHostError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ready = WorkerInbound::Event {
        event: PushEvent::new(
            READY_EVENT,
            json!({ "version": env!("CARGO_PKG_VERSION") }),
        ),
    };
    write_line(&mut writer, &ready).await?;
    tracing::info!("Worker host ready");

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: RequestEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Without an id there is no caller to answer; it will time out.
                tracing::warn!(error = %e, "Dropping malformed worker request");
                continue;
            }
        };
        let reply = handle(authority.as_ref(), &envelope).await;
        write_line(&mut writer, &WorkerInbound::Reply(reply)).await?;
    }

    tracing::info!("Worker input closed, shutting down");
    Ok(())
}

async fn handle(authority: &dyn GameAuthority, envelope: &RequestEnvelope) -> ReplyEnvelope {
    let id = envelope.id;
    let payload = match RequestPayload::from_envelope(envelope) {
        Ok(payload) => payload,
        Err(e) => return ReplyEnvelope::err(id, e.to_string()),
    };
    tracing::debug!(request_id = id, kind = payload.kind().as_str(), "Worker request");

    let outcome = match payload {
        RequestPayload::Spin(request) => authority
            .spin(&request)
            .await
            .map(|result| serde_json::to_value(result).map_err(|e| e.to_string())),
        RequestPayload::Balance(query) => authority
            .balance(&query.player_id)
            .await
            .map(|balance| Ok(json!({ "balance": balance }))),
        RequestPayload::GameState(query) => {
            authority.game_state(&query.player_id).await.map(Ok)
        }
    };

    match outcome {
        Ok(Ok(data)) => ReplyEnvelope::ok(id, data),
        Ok(Err(encode_error)) => ReplyEnvelope::err(id, encode_error),
        Err(e) => ReplyEnvelope::err(id, e.to_string()),
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), WorkerHostError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::MockGameAuthority;
    use crate::error::AuthorityError;
    use crate::SlotEngine;
    use reelnexus_domain::PlayerId;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn next_message<R: tokio::io::AsyncBufRead + Unpin>(
        lines: &mut tokio::io::Lines<R>,
    ) -> WorkerInbound {
        let line = lines.next_line().await.unwrap().expect("worker closed");
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn announces_ready_then_answers_in_order() {
        let (client, host) = duplex(4096);
        let (host_read, host_write) = tokio::io::split(host);
        let authority: Arc<dyn GameAuthority> = Arc::new(SlotEngine::seeded(750, 1));
        let server = tokio::spawn(serve(authority, host_read, host_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        match next_message(&mut lines).await {
            WorkerInbound::Event { event } => assert_eq!(event.name, READY_EVENT),
            other => panic!("expected ready, got {other:?}"),
        }

        client_write
            .write_all(b"{\"id\":1,\"type\":\"balance\",\"data\":{\"playerId\":\"p1\"}}\n")
            .await
            .unwrap();
        client_write
            .write_all(b"{\"id\":2,\"type\":\"gameState\",\"data\":{\"playerId\":\"p1\"}}\n")
            .await
            .unwrap();

        match next_message(&mut lines).await {
            WorkerInbound::Reply(reply) => {
                assert_eq!(reply.id, 1);
                assert_eq!(reply.into_result().unwrap()["balance"], 750);
            }
            other => panic!("unexpected {other:?}"),
        }
        match next_message(&mut lines).await {
            WorkerInbound::Reply(reply) => assert_eq!(reply.id, 2),
            other => panic!("unexpected {other:?}"),
        }

        drop(client_write);
        drop(lines);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn authority_errors_become_error_replies() {
        let mut authority = MockGameAuthority::new();
        authority
            .expect_balance()
            .returning(|player| Err(AuthorityError::UnknownPlayer(player.clone())));

        let reply = handle(
            &authority,
            &RequestEnvelope {
                id: 9,
                kind: reelnexus_shared::RequestKind::Balance,
                data: json!({"playerId": "ghost"}),
            },
        )
        .await;

        assert_eq!(reply.id, 9);
        assert_eq!(
            reply.into_result(),
            Err(AuthorityError::UnknownPlayer(PlayerId::new("ghost")).to_string())
        );
    }

    #[tokio::test]
    async fn undecodable_request_data_is_answered() {
        let authority = MockGameAuthority::new();
        let reply = handle(
            &authority,
            &RequestEnvelope {
                id: 3,
                kind: reelnexus_shared::RequestKind::Spin,
                data: json!({"nonsense": true}),
            },
        )
        .await;
        assert!(reply.into_result().is_err());
    }
}
