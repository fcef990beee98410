//! UseCase: 接続時のチャットルーム参加処理

use std::sync::Arc;

use crate::{
    domain::{ChatId, ChatRepository},
    realtime::Socket,
};

use super::error::JoinChatsError;

/// 接続したユーザーを所属チャットの全ルームに参加させるユースケース
pub struct JoinChatsUseCase {
    chat_repository: Arc<dyn ChatRepository>,
}

impl JoinChatsUseCase {
    pub fn new(chat_repository: Arc<dyn ChatRepository>) -> Self {
        Self { chat_repository }
    }

    /// ユーザーが参加しているチャットごとにルームへ参加する
    ///
    /// # 戻り値
    ///
    /// 参加した chat id の一覧
    pub async fn execute(&self, socket: &Socket) -> Result<Vec<ChatId>, JoinChatsError> {
        let chats = self.chat_repository.user_chats(socket.user_id()).await?;
        for chat_id in &chats {
            socket.join(*chat_id).await;
        }
        tracing::info!(
            user_id = %socket.user_id(),
            "Joined {} chat room(s)",
            chats.len()
        );
        Ok(chats)
    }
}
