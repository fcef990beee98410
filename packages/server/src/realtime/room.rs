//! チャットルームとルームレジストリ
//!
//! ## 責務
//!
//! - チャット 1 件分の接続中メンバーの管理と配信（[`Room`]）
//! - chat id ごとのルームの管理（[`RoomRegistry`]）
//!
//! ## 設計ノート
//!
//! メンバーは接続単位で保持します。再接続したユーザーの古い接続の
//! 後片付けが、新しい接続の参加を消さないようにするためです。

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::{ChatId, UserId};

use super::{connection::Connection, envelope::Envelope, error::RegistryError};

/// チャット 1 件の接続中メンバー
#[derive(Debug)]
pub struct Room {
    chat_id: ChatId,
    members: RwLock<HashMap<UserId, Connection>>,
}

impl Room {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// メンバーの接続を追加または置き換える（最後の join が優先）
    pub async fn add(&self, connection: Connection) {
        let mut members = self.members.write().await;
        members.insert(connection.user_id(), connection);
    }

    pub async fn remove(&self, user_id: UserId) -> Option<Connection> {
        let mut members = self.members.write().await;
        members.remove(&user_id)
    }

    /// メンバーがまだこの接続である場合に限り削除する
    pub async fn remove_connection(&self, connection: &Connection) -> bool {
        let mut members = self.members.write().await;
        match members.get(&connection.user_id()) {
            Some(current) if current.same_as(connection) => {
                members.remove(&connection.user_id());
                true
            }
            _ => false,
        }
    }

    /// `from` 以外の全メンバーに配信する
    ///
    /// 送信に失敗したメンバーはログに残してスキップする。
    ///
    /// # 戻り値
    ///
    /// イベントを積んだメンバーの数
    pub async fn send(&self, from: UserId, envelope: &Envelope) -> usize {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    chat_id = %self.chat_id,
                    "Failed to encode '{}' for room: {}",
                    envelope.event,
                    e
                );
                return 0;
            }
        };

        let members = self.members.read().await;
        let mut delivered = 0;
        for (user_id, connection) in members.iter() {
            if *user_id == from {
                continue;
            }
            match connection.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    chat_id = %self.chat_id,
                    from = %from,
                    "Failed to send '{}' to user {}: {}",
                    envelope.event,
                    user_id,
                    e
                ),
            }
        }
        tracing::debug!(
            chat_id = %self.chat_id,
            from = %from,
            delivered,
            "Room broadcast of '{}'",
            envelope.event
        );
        delivered
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.members.read().await.contains_key(&user_id)
    }

    /// メンバーの id（昇順）
    pub async fn members(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.members.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

/// ある時点のルームの状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub chat_id: ChatId,
    pub members: Vec<UserId>,
}

/// これまでに作成された全てのルーム（chat id がキー）
///
/// ルームは最初の join で作成され、空になっても
/// [`RoomRegistry::remove`] が呼ばれるまで残る。
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<ChatId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat_id: ChatId) -> Result<Arc<Room>, RegistryError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(&chat_id)
            .cloned()
            .ok_or(RegistryError::RoomNotFound(chat_id))
    }

    /// `chat_id` のルームを返す。なければ作成する
    ///
    /// 同じ chat id で並行に呼ばれても作成されるルームは一つだけ。
    pub async fn get_or_create(&self, chat_id: ChatId) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(&chat_id) {
            return Arc::clone(room);
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(chat_id).or_insert_with(|| {
            tracing::debug!(chat_id = %chat_id, "Room created");
            Arc::new(Room::new(chat_id))
        });
        Arc::clone(room)
    }

    pub async fn remove(&self, chat_id: ChatId) -> Result<Arc<Room>, RegistryError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .remove(&chat_id)
            .ok_or(RegistryError::RoomNotFound(chat_id))?;
        tracing::debug!(chat_id = %chat_id, "Room removed");
        Ok(room)
    }

    /// `user_id` が現在参加している全てのルーム
    ///
    /// 結果はスナップショットであり、その後の変更の影響を受けない。
    pub async fn get_all_for_user(&self, user_id: UserId) -> Vec<Arc<Room>> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut joined = Vec::new();
        for room in rooms {
            if room.contains(user_id).await {
                joined.push(room);
            }
        }
        joined.sort_by_key(|room| room.chat_id());
        joined
    }

    /// 全てのルームとメンバー（chat id の昇順）
    pub async fn snapshot(&self) -> Vec<RoomSnapshot> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(rooms.len());
        for room in rooms {
            snapshots.push(RoomSnapshot {
                chat_id: room.chat_id(),
                members: room.members().await,
            });
        }
        snapshots.sort_by_key(|snapshot| snapshot.chat_id);
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
