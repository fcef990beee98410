//! 接続とプロセス全体の接続レジストリ
//!
//! ## 責務
//!
//! - 認証済みクライアント 1 件分の送信キュー（[`Connection`]）
//! - ユーザーごとの現在の接続の管理（[`ConnectionRegistry`]）
//!
//! ## 設計ノート
//!
//! [`Connection`] は WebSocket に直接書き込みません。送信フレームは
//! unbounded channel に積まれ、接続ごとの writer タスクが取り出して送信します。
//! 遅いクライアントがいても他のクライアントへのブロードキャストは止まりません。

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Notify, RwLock, mpsc};

use crate::domain::{ConnectionId, UserId};

use super::{
    envelope::Envelope,
    error::{ConnectionError, RegistryError},
};

/// writer タスクに渡される送信フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// シリアライズ済みのイベント envelope
    Text(String),
    /// close フレームを送信し、書き込みを終了する
    Close { code: u16, reason: String },
}

/// writer タスクが読み出す受信側
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// 認証済みクライアント 1 件の送信ストリームへのハンドル
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::UnboundedSender<Outbound>,
    /// この接続を読み込んでいる dispatch ループを起こす
    stop: Arc<Notify>,
}

impl Connection {
    /// 新しい Connection を作成
    ///
    /// writer タスクが読み出す受信側も合わせて返す
    pub fn new(user_id: UserId) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id: ConnectionId::generate(),
            user_id,
            sender,
            stop: Arc::new(Notify::new()),
        };
        (connection, receiver)
    }

    /// dispatch ループに読み込みの停止を要求する
    ///
    /// ループが待機中でなくても要求は保持される
    pub fn request_stop(&self) {
        self.stop.notify_one();
    }

    pub(crate) async fn stopped(&self) {
        self.stop.notified().await;
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// `other` が同じユーザーではなく、この接続そのものかどうか
    pub fn same_as(&self, other: &Connection) -> bool {
        self.id == other.id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn send(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        self.send_text(envelope.to_text()?)
    }

    pub(crate) fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        self.push(Outbound::Text(text))
    }

    /// 指定したステータスコードと理由で close フレームを積む
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), ConnectionError> {
        self.push(Outbound::Close {
            code,
            reason: reason.into(),
        })
    }

    fn push(&self, frame: Outbound) -> Result<(), ConnectionError> {
        self.sender
            .send(frame)
            .map_err(|_| ConnectionError::Closed(self.user_id))
    }
}

/// どのユーザーがどの接続で接続中か
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続を登録し、置き換えた以前の接続があれば返す
    pub async fn add(&self, connection: Connection) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        let user_id = connection.user_id();
        let previous = connections.insert(user_id, connection);
        tracing::debug!(user_id = %user_id, replaced = previous.is_some(), "Connection registered");
        previous
    }

    pub async fn remove(&self, user_id: UserId) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        connections.remove(&user_id)
    }

    /// ユーザーのエントリがまだこの接続である場合に限り削除する
    pub async fn remove_connection(&self, connection: &Connection) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&connection.user_id()) {
            Some(current) if current.same_as(connection) => {
                connections.remove(&connection.user_id());
                tracing::debug!(user_id = %connection.user_id(), "Connection unregistered");
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, user_id: UserId) -> Result<Connection, RegistryError> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .cloned()
            .ok_or(RegistryError::ConnectionNotFound(user_id))
    }

    /// `from` 以外の全ての登録済み接続に送信する
    ///
    /// # 戻り値
    ///
    /// イベントを積んだ接続の数
    pub async fn broadcast_except(&self, from: UserId, envelope: &Envelope) -> usize {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode broadcast '{}': {}", envelope.event, e);
                return 0;
            }
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (user_id, connection) in connections.iter() {
            if *user_id == from {
                continue;
            }
            match connection.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    from = %from,
                    "Failed to send '{}' to user {}: {}",
                    envelope.event,
                    user_id,
                    e
                ),
            }
        }
        delivered
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: i64) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn test_get_returns_most_recent_connection() {
        // テスト項目: 同じユーザーで再登録すると最新の接続が返される
        // given (前提条件):
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = Connection::new(user(1));
        let (second, _rx2) = Connection::new(user(1));

        // when (操作):
        assert!(registry.add(first.clone()).await.is_none());
        let replaced = registry.add(second.clone()).await;

        // then (期待する結果):
        assert!(replaced.unwrap().same_as(&first));
        assert!(registry.get(user(1)).await.unwrap().same_as(&second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_after_remove_is_not_found() {
        // テスト項目: 削除後の取得は not found エラーになる
        // given (前提条件):
        let registry = ConnectionRegistry::new();
        let (connection, _rx) = Connection::new(user(1));
        registry.add(connection).await;

        // when (操作):
        registry.remove(user(1)).await;
        let result = registry.get(user(1)).await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            RegistryError::ConnectionNotFound(user(1))
        );
    }

    #[tokio::test]
    async fn test_interleaved_add_remove_sequences() {
        // テスト項目: add/remove の任意の並びの後、get は最後の操作を反映する
        // given (前提条件):
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        let mut last_added: Option<Connection>;

        // when (操作): add, add, remove, add, remove, remove, add
        for step in ["add", "add", "remove", "add", "remove", "remove", "add"] {
            if step == "add" {
                let (connection, rx) = Connection::new(user(3));
                receivers.push(rx);
                registry.add(connection.clone()).await;
                last_added = Some(connection);
            } else {
                registry.remove(user(3)).await;
                last_added = None;
            }

            // then (期待する結果):
            match (&last_added, registry.get(user(3)).await) {
                (Some(expected), Ok(actual)) => assert!(actual.same_as(expected)),
                (None, Err(RegistryError::ConnectionNotFound(id))) => assert_eq!(id, user(3)),
                (expected, actual) => panic!("expected {:?}, got {:?}", expected, actual),
            }
        }
    }

    #[tokio::test]
    async fn test_remove_absent_user_is_noop() {
        // テスト項目: 存在しないユーザーの削除はエラーにならない
        // given (前提条件):
        let registry = ConnectionRegistry::new();

        // when (操作):
        let removed = registry.remove(user(99)).await;

        // then (期待する結果):
        assert!(removed.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_connection_keeps_replacement() {
        // テスト項目: 古い接続の登録解除は、置き換え後の新しい接続を削除しない
        // given (前提条件):
        let registry = ConnectionRegistry::new();
        let (stale, _rx1) = Connection::new(user(1));
        let (fresh, _rx2) = Connection::new(user(1));
        registry.add(stale.clone()).await;
        registry.add(fresh.clone()).await;

        // when (操作):
        let removed = registry.remove_connection(&stale).await;

        // then (期待する結果):
        assert!(!removed);
        assert!(registry.get(user(1)).await.unwrap().same_as(&fresh));
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_origin_and_survives_closed_peer() {
        // テスト項目: 送信元以外に配信され、切断済みの接続があっても他への配信は続く
        // given (前提条件):
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = Connection::new(user(1));
        let (bob, mut bob_rx) = Connection::new(user(2));
        let (broken, broken_rx) = Connection::new(user(3));
        drop(broken_rx);
        registry.add(alice).await;
        registry.add(bob).await;
        registry.add(broken).await;

        // when (操作):
        let envelope = Envelope::new("notice", json!("maintenance at noon"));
        let delivered = registry.broadcast_except(user(1), &envelope).await;

        // then (期待する結果):
        assert_eq!(delivered, 1);
        assert_eq!(
            bob_rx.recv().await,
            Some(Outbound::Text(envelope.to_text().unwrap()))
        );
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_on_closed_connection_fails() {
        // テスト項目: writer が終了した接続への送信は Closed エラーになる
        // given (前提条件):
        let (connection, rx) = Connection::new(user(1));
        drop(rx);

        // when (操作):
        let result = connection.send(&Envelope::error("boom"));

        // then (期待する結果):
        assert!(connection.is_closed());
        assert!(matches!(result, Err(ConnectionError::Closed(id)) if id == user(1)));
    }
}
