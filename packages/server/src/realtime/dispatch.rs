//! 接続ごとの読み込みループ
//!
//! ## 責務
//!
//! - 受信フレームを envelope にデコードし、イベントとして発火する
//! - 不正なフレームやバイナリフレームへのエラー返信
//! - 読み込み終了時の `"disconnect"` 発火と後片付けの起動
//!
//! ## 設計ノート
//!
//! イベントの発火は別タスクで読み込み順に行います。
//! 処理の遅いリスナーがあっても読み込みは止まりません。

use std::{fmt::Display, time::Duration};

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::domain::UserId;

use super::{
    envelope::{EVENT_DISCONNECT, Envelope, TEXT_ONLY_MESSAGE},
    socket::Socket,
};

/// 読み込み終了後、未処理イベントの完了を待つ上限
const EMITTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 接続が終わるまでフレームを読み込み、デコードしたイベントを発火する
///
/// 読み込みが止まると未処理のイベントを待ち（上限あり）、その後
/// `"disconnect"` を発火してソケットを片付ける。
pub async fn run<S, E>(socket: Socket, frames: S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    run_with_drain_timeout(socket, frames, EMITTER_DRAIN_TIMEOUT).await
}

async fn run_with_drain_timeout<S, E>(socket: Socket, mut frames: S, drain_timeout: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let user_id = socket.user_id();
    let (queue, pending) = mpsc::unbounded_channel::<Envelope>();
    let emitter = tokio::spawn(emit_pending(socket.clone(), pending));

    tracing::info!(user_id = %user_id, "Dispatch loop started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = socket.connection().stopped() => {
                tracing::info!(user_id = %user_id, "Dispatch loop stopped by server");
                break;
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                tracing::debug!(user_id = %user_id, "Received text: {}", text.as_str());
                match decode(text.as_str()) {
                    Ok(envelope) => {
                        if queue.send(envelope).is_err() {
                            tracing::error!(user_id = %user_id, "Event emitter is gone");
                            break;
                        }
                    }
                    Err(reply) => reply_to(&socket, &reply),
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(user_id = %user_id, "Rejected binary frame");
                reply_to(&socket, &Envelope::error(TEXT_ONLY_MESSAGE));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                // pong は WebSocket 層が返す
                tracing::trace!(user_id = %user_id, "Received ping/pong");
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(user_id = %user_id, reason = ?frame, "Client requested close");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, "WebSocket read error: {}", e);
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    drop(queue);
    drain(user_id, emitter, drain_timeout).await;
    socket.terminate().await;

    tracing::info!(user_id = %user_id, "Dispatch loop finished");
}

/// 残りのイベント処理を待つ。時間内に終わらなければ中断する
async fn drain(user_id: UserId, mut emitter: JoinHandle<()>, limit: Duration) {
    match tokio::time::timeout(limit, &mut emitter).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(user_id = %user_id, "Event emitter failed: {}", e),
        Err(_) => {
            tracing::warn!(user_id = %user_id, "Pending events not handled in time, aborting");
            emitter.abort();
        }
    }
}

/// テキストフレームをデコードする。失敗時は送信者への返信を返す
fn decode(text: &str) -> Result<Envelope, Envelope> {
    let envelope = Envelope::from_text(text).map_err(|_| Envelope::invalid_format())?;
    if envelope.event == EVENT_DISCONNECT {
        return Err(Envelope::error(format!(
            "event '{}' is reserved",
            EVENT_DISCONNECT
        )));
    }
    Ok(envelope)
}

fn reply_to(socket: &Socket, reply: &Envelope) {
    if let Err(e) = socket.message(reply) {
        tracing::debug!(user_id = %socket.user_id(), "Error reply not sent: {}", e);
    }
}

async fn emit_pending(socket: Socket, mut pending: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(Envelope { event, data }) = pending.recv().await {
        socket.emit(&event, data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChatId,
        realtime::{
            connection::{Outbound, OutboundReceiver},
            envelope::INVALID_FORMAT_MESSAGE,
            server::RealtimeServer,
        },
    };
    use serde_json::{Value, json};
    use futures_util::stream::BoxStream;
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    type Frame = Result<Message, String>;

    /// channel から供給されるフレーム。sender を drop するとストリームが終わる
    fn channel_frames(rx: mpsc::UnboundedReceiver<Frame>) -> BoxStream<'static, Frame> {
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
        .boxed()
    }

    async fn wait_for_len(seen: &Mutex<Vec<Value>>, len: usize) {
        for _ in 0..100 {
            if seen.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("listener did not record {} events", len);
    }

    fn text(value: &str) -> Frame {
        Ok(Message::Text(value.to_string().into()))
    }

    async fn next_envelope(rx: &mut OutboundReceiver) -> Envelope {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(Outbound::Text(text))) => Envelope::from_text(&text).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    fn recording_listener(socket: &Socket, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        socket.on(event, move |data| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(data);
                Ok(())
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_error_and_keeps_reading() {
        // テスト項目: 不正なフレームにはエラーを返し、その後の正しいフレームは処理される
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, mut rx) = server.connect(UserId::new(1)).await;
        let seen = recording_listener(&socket, "message");
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Frame>();
        let loop_handle = tokio::spawn(run(socket.clone(), channel_frames(frames_rx)));

        // when (操作):
        frames_tx.send(text(r#"{"data": 1}"#)).unwrap();
        let error = next_envelope(&mut rx).await;
        frames_tx.send(text(r#"{"event":"message","data":{"chatId":5}}"#)).unwrap();
        drop(frames_tx);
        loop_handle.await.unwrap();

        // then (期待する結果):
        assert_eq!(error, Envelope::error(INVALID_FORMAT_MESSAGE));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"chatId": 5})]);
    }

    #[tokio::test]
    async fn test_binary_frame_is_rejected_but_connection_stays_open() {
        // テスト項目: バイナリフレームはエラー通知のみで接続は維持される
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, mut rx) = server.connect(UserId::new(1)).await;
        let seen = recording_listener(&socket, "message");
        let frames = futures_util::stream::iter(vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            text(r#"{"event":"message","data":"after"}"#),
        ]);

        // when (操作):
        let loop_handle = tokio::spawn(run(
            socket.clone(),
            frames.chain(futures_util::stream::pending()),
        ));
        let reply = next_envelope(&mut rx).await;
        wait_for_len(&seen, 1).await;

        // then (期待する結果):
        assert_eq!(reply, Envelope::error(TEXT_ONLY_MESSAGE));
        assert_eq!(*seen.lock().unwrap(), vec![json!("after")]);
        assert!(!socket.is_terminated());
        socket.disconnect(1000, "done").await;
        loop_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_error_fires_disconnect_once_and_cleans_up() {
        // テスト項目: 読み込みエラーで disconnect が一度だけ発火し、全ての部屋から削除される
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, _rx) = server.connect(UserId::new(1)).await;
        socket.join(ChatId::new(5)).await;
        socket.join(ChatId::new(7)).await;
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        socket.on(EVENT_DISCONNECT, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let frames = futures_util::stream::iter(vec![Err::<Message, _>("connection reset".to_string())]);

        // when (操作):
        run(socket.clone(), frames).await;

        // then (期待する結果):
        let hub = server.hub();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(hub.connections().get(UserId::new(1)).await.is_err());
        assert!(hub.rooms().get_all_for_user(UserId::new(1)).await.is_empty());
        assert!(hub.rooms().get(ChatId::new(5)).await.unwrap().is_empty().await);
        assert!(hub.rooms().get(ChatId::new(7)).await.unwrap().is_empty().await);
    }

    #[tokio::test]
    async fn test_blocked_listener_does_not_prevent_cleanup() {
        // テスト項目: 終わらない message リスナーがあっても読み込みエラー後に後片付けが行われる
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, _rx) = server.connect(UserId::new(1)).await;
        socket.join(ChatId::new(5)).await;
        socket.on("message", |_| async {
            futures_util::future::pending::<()>().await;
            Ok(())
        });
        let fired = recording_listener(&socket, EVENT_DISCONNECT);
        let frames = futures_util::stream::iter(vec![
            text(r#"{"event":"message","data":null}"#),
            Err("connection reset".to_string()),
        ]);

        // when (操作):
        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            run_with_drain_timeout(socket.clone(), frames, Duration::from_millis(100)),
        )
        .await;

        // then (期待する結果):
        let hub = server.hub();
        assert!(finished.is_ok(), "dispatch loop did not finish");
        assert!(socket.is_terminated());
        assert_eq!(fired.lock().unwrap().len(), 1);
        assert!(hub.connections().get(UserId::new(1)).await.is_err());
        assert!(hub.rooms().get_all_for_user(UserId::new(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_listener_reentering_disconnect_does_not_hang() {
        // テスト項目: disconnect リスナーが自身を切断しても読み込みループは終了する
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, _rx) = server.connect(UserId::new(1)).await;
        let own = socket.clone();
        socket.on(EVENT_DISCONNECT, move |_| {
            let own = own.clone();
            async move {
                own.disconnect(1000, "bye").await;
                Ok(())
            }
        });
        let frames = futures_util::stream::iter(vec![Err::<Message, _>("reset".to_string())]);

        // when (操作):
        let finished = tokio::time::timeout(Duration::from_secs(1), run(socket.clone(), frames)).await;

        // then (期待する結果):
        assert!(finished.is_ok(), "dispatch loop did not finish");
        assert!(socket.is_terminated());
        assert!(server.hub().connections().is_empty().await);
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_read_order() {
        // テスト項目: 同じ接続からのイベントは読み込み順に処理される
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, _rx) = server.connect(UserId::new(1)).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        socket.on("message", move |data| {
            let sink = Arc::clone(&sink);
            async move {
                // 後続のイベントはこの処理を待つ
                let delay = data.as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                sink.lock().unwrap().push(data);
                Ok(())
            }
        });
        let frames = futures_util::stream::iter(
            [30, 0, 10, 0]
                .iter()
                .map(|n| text(&format!(r#"{{"event":"message","data":{}}}"#, n)))
                .collect::<Vec<_>>(),
        );

        // when (操作):
        run(socket, frames).await;

        // then (期待する結果):
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!(30), json!(0), json!(10), json!(0)]
        );
    }

    #[tokio::test]
    async fn test_slow_listener_does_not_stall_reading() {
        // テスト項目: 処理の遅いリスナーがあっても次のフレームの読み込みは止まらない
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, mut rx) = server.connect(UserId::new(1)).await;
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = Arc::clone(&release);
        socket.on("message", move |_| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(())
            }
        });
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Frame>();
        let loop_handle = tokio::spawn(run(socket.clone(), channel_frames(frames_rx)));

        // when (操作):
        frames_tx.send(text(r#"{"event":"message","data":null}"#)).unwrap();
        frames_tx.send(text("garbage")).unwrap();

        // then (期待する結果): the malformed frame is answered while the listener is blocked
        assert_eq!(next_envelope(&mut rx).await, Envelope::invalid_format());
        release.notify_one();
        drop(frames_tx);
        loop_handle.await.unwrap();
        assert!(socket.is_terminated());
    }

    #[tokio::test]
    async fn test_client_cannot_forge_disconnect_event() {
        // テスト項目: クライアントから予約済みの disconnect イベントは送れない
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, mut rx) = server.connect(UserId::new(1)).await;
        let fired = recording_listener(&socket, EVENT_DISCONNECT);
        let frames = futures_util::stream::iter(vec![text(r#"{"event":"disconnect"}"#)]);

        // when (操作):
        run(socket, frames).await;

        // then (期待する結果):
        assert!(next_envelope(&mut rx).await.is_error());
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_disconnect_stops_blocked_read() {
        // テスト項目: サーバー側の切断で読み込み待ちのループが終了する
        // given (前提条件):
        let server = RealtimeServer::new();
        let (socket, mut rx) = server.connect(UserId::new(1)).await;
        let frames = futures_util::stream::pending::<Frame>();
        let loop_handle = tokio::spawn(run(socket.clone(), frames));

        // when (操作):
        socket.disconnect(4001, "kicked").await;

        // then (期待する結果):
        tokio::time::timeout(Duration::from_secs(1), loop_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close {
                code: 4001,
                reason: "kicked".to_string(),
            })
        );
    }
}
