//! リアルタイムサーバー
//!
//! ## 責務
//!
//! - 接続レジストリとルームレジストリの所有（[`Hub`]）
//! - 認証済み WebSocket の受け付けと接続ハンドラーの実行
//! - writer タスクと dispatch ループの起動・終了
//!
//! ## 設計ノート
//!
//! WebSocket の認証とアップグレードは UI 層（`src/ui/handler/websocket.rs`）で
//! 行われます。このモジュールはアップグレード済みの WebSocket を受け取ります。

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{FutureExt, Sink, SinkExt, StreamExt, future::BoxFuture};

use crate::domain::UserId;

use super::{
    connection::{Connection, ConnectionRegistry, Outbound, OutboundReceiver},
    dispatch,
    room::RoomRegistry,
    socket::Socket,
};

/// 同じユーザーの新しい接続に置き換えられた接続へ送る close コード
pub const CLOSE_REPLACED: u16 = 4000;
/// サーバーが接続の読み込みを終えたときの close コード
pub const CLOSE_NORMAL: u16 = 1000;
/// 接続の初期化に失敗したときの close コード
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// 読み込み終了後、writer の送信完了を待つ上限
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 新しい接続ごとに一度実行されるアプリケーションのコールバック
pub type ConnectionHandler = Arc<dyn Fn(Socket) -> BoxFuture<'static, ()> + Send + Sync>;

/// プロセス全体のリアルタイム状態
#[derive(Debug, Default)]
pub struct Hub {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }
}

/// 認証済み WebSocket を受け付け、ソケットを駆動するリアルタイムサーバー
#[derive(Default)]
pub struct RealtimeServer {
    hub: Arc<Hub>,
    handler: Option<ConnectionHandler>,
}

impl RealtimeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい接続ごとに読み込み開始前に実行するコールバックを設定する
    ///
    /// コールバックはルームへの参加とリスナーの登録を行う。
    /// 再度設定すると以前のものは置き換えられる。
    pub fn handle_connection<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Socket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |socket| handler(socket).boxed()));
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// `user_id` の接続を登録し、接続ハンドラーを実行する
    ///
    /// 同じユーザーの以前の接続には close と停止を要求する。
    ///
    /// # 戻り値
    ///
    /// ソケットと、writer が読み出すべき受信側
    pub async fn connect(&self, user_id: UserId) -> (Socket, OutboundReceiver) {
        let (connection, outbound) = Connection::new(user_id);

        if let Some(previous) = self.hub.connections().add(connection.clone()).await {
            tracing::info!(user_id = %user_id, "Replacing previous connection");
            if let Err(e) = previous.close(CLOSE_REPLACED, "replaced by a newer connection") {
                tracing::debug!(user_id = %user_id, "Previous connection already closed: {}", e);
            }
            previous.request_stop();
        }

        let socket = Socket::new(connection, Arc::clone(&self.hub));
        match &self.handler {
            Some(handler) => handler(socket.clone()).await,
            None => tracing::warn!("No connection handler registered"),
        }
        tracing::info!(user_id = %user_id, "Client connected");

        (socket, outbound)
    }

    /// アップグレード済みの WebSocket を終了するまで処理する
    pub async fn accept(&self, user_id: UserId, websocket: WebSocket) {
        let (socket, outbound) = self.connect(user_id).await;
        let (sink, stream) = websocket.split();
        let mut writer = tokio::spawn(write_loop(sink, outbound, user_id));

        if socket.is_terminated() {
            tracing::info!(user_id = %user_id, "Socket closed during setup");
        } else {
            dispatch::run(socket.clone(), stream).await;
        }

        // close フレームが積まれていなければ writer を終了させる
        let _ = socket.connection().close(CLOSE_NORMAL, "");
        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            tracing::warn!(user_id = %user_id, "Writer did not finish in time, aborting");
            writer.abort();
        }
        tracing::info!(user_id = %user_id, "Client disconnected");
    }
}

/// close フレームか書き込みエラーまで、積まれたフレームを WebSocket に転送する
async fn write_loop<S>(mut sink: S, mut outbound: OutboundReceiver, user_id: UserId)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(user_id = %user_id, "WebSocket write error: {}", e);
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(user_id = %user_id, "Close frame not sent: {}", e);
                }
                break;
            }
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(user_id = %user_id, "WebSocket sink close failed: {}", e);
    }
}
