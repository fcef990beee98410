//! アプリケーションが使う接続ごとのハンドル
//!
//! ## 責務
//!
//! - イベントリスナーの登録と発火
//! - ルームへの参加・退出と自分への直接送信
//! - 切断時の `"disconnect"` 発火と後片付け（一度だけ）
//!
//! ## 設計ノート
//!
//! 後片付けは接続単位で行います。再接続後に古いソケットを片付けても
//! 新しい接続の登録とルームへの参加は残ります。

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};

use futures_util::{FutureExt, future::BoxFuture};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::domain::{ChatId, ConnectionId, UserId};

use super::{
    connection::Connection,
    envelope::{EVENT_DISCONNECT, Envelope},
    error::{ConnectionError, ListenerError, RegistryError},
    room::Room,
    server::Hub,
};

tokio::task_local! {
    /// 現在のタスクで終了処理を実行中の接続
    static TERMINATING: Vec<ConnectionId>;
}

/// 登録されたイベントリスナー
pub type Listener =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>;

/// 接続ごとのファサード
///
/// clone は安価で、全ての clone は同じ接続を指す。
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

struct Inner {
    connection: Connection,
    hub: Arc<Hub>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    terminated: OnceCell<()>,
}

impl Socket {
    pub(crate) fn new(connection: Connection, hub: Arc<Hub>) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                hub,
                listeners: RwLock::new(HashMap::new()),
                terminated: OnceCell::new(),
            }),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.connection.user_id()
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.inner.hub
    }

    /// `event` のリスナーを登録する
    ///
    /// 同じイベントのリスナーは登録順に実行される。
    /// ソケット終了後の登録は無視される。
    pub fn on<F, Fut>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        if self.is_terminated() {
            return;
        }
        let listener: Listener = Arc::new(move |data| listener(data).boxed());
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.entry(event.into()).or_default().push(listener);
    }

    /// `event` の全てのリスナーを順に実行し、実行した数を返す
    ///
    /// 失敗・panic したリスナーはログに残し、残りのリスナーは実行を続ける。
    pub(crate) async fn emit(&self, event: &str, data: Value) -> usize {
        let listeners: Vec<Listener> = {
            let table = self
                .inner
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            table.get(event).cloned().unwrap_or_default()
        };

        if listeners.is_empty() {
            tracing::debug!(user_id = %self.user_id(), "No listener for event '{}'", event);
            return 0;
        }

        for listener in &listeners {
            let outcome = AssertUnwindSafe(async { listener(data.clone()).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    user_id = %self.user_id(),
                    "Listener for '{}' failed: {}",
                    event,
                    e
                ),
                Err(_) => tracing::error!(
                    user_id = %self.user_id(),
                    "Listener for '{}' panicked",
                    event
                ),
            }
        }
        listeners.len()
    }

    /// `chat_id` のルームに参加する。なければ作成する
    pub async fn join(&self, chat_id: ChatId) -> Arc<Room> {
        let room = self.inner.hub.rooms().get_or_create(chat_id).await;
        room.add(self.inner.connection.clone()).await;
        tracing::debug!(user_id = %self.user_id(), chat_id = %chat_id, "Joined room");
        room
    }

    /// `chat_id` のルームから退出する
    ///
    /// 同じユーザーの新しい接続による参加には影響しない。
    pub async fn leave(&self, chat_id: ChatId) -> Result<(), RegistryError> {
        let room = self.inner.hub.rooms().get(chat_id).await?;
        room.remove_connection(&self.inner.connection).await;
        tracing::debug!(user_id = %self.user_id(), chat_id = %chat_id, "Left room");
        Ok(())
    }

    /// この接続にのみイベントを送信する
    pub fn message(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        self.inner.connection.send(envelope)
    }

    /// サーバー側からの切断
    ///
    /// close フレームを積んで dispatch ループを止め、クライアント側からの
    /// 切断と同じ終了処理を行う。
    ///
    /// # 引数
    ///
    /// - `code`: close コード
    /// - `reason`: close の理由
    pub async fn disconnect(&self, code: u16, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(
            user_id = %self.user_id(),
            code,
            "Disconnecting socket: {}",
            reason
        );
        if let Err(e) = self.inner.connection.close(code, reason) {
            tracing::debug!(user_id = %self.user_id(), "Close frame not queued: {}", e);
        }
        self.inner.connection.request_stop();
        self.terminate().await;
    }

    /// 接続レジストリと全てのルームからこの接続を削除する
    ///
    /// 何度呼んでもよい。
    pub async fn post_disconnect(&self) {
        let hub = &self.inner.hub;
        let connection = &self.inner.connection;

        hub.connections().remove_connection(connection).await;
        for room in hub.rooms().get_all_for_user(self.user_id()).await {
            room.remove_connection(connection).await;
        }
        tracing::debug!(user_id = %self.user_id(), "Socket cleaned up");
    }

    /// `"disconnect"` を一度だけ発火し、後片付けを行う
    ///
    /// 並行した呼び出しは最初の呼び出しの完了を待つ。自身の `"disconnect"`
    /// リスナーの中からの呼び出しは待たずに戻る。
    pub(crate) async fn terminate(&self) {
        let id = self.inner.connection.id();
        let mut active = TERMINATING.try_with(Clone::clone).unwrap_or_default();
        if active.contains(&id) {
            tracing::debug!(user_id = %self.user_id(), "Termination already running on this task");
            return;
        }
        active.push(id);

        self.inner
            .terminated
            .get_or_init(|| {
                TERMINATING.scope(active, async {
                    self.emit(EVENT_DISCONNECT, Value::Null).await;
                    self.post_disconnect().await;
                    // リスナーは通常このソケットの clone を保持している
                    self.inner
                        .listeners
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();
                })
            })
            .await;
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.initialized()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("user_id", &self.user_id())
            .field("connection_id", &self.inner.connection.id())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
