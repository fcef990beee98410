//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 参加者チェック、永続化、ルームへのブロードキャストと送信者への ack
//!
//! ### どのような状況を想定しているか
//! - 正常系：所属チャットへのメッセージがルームの他メンバーに届く
//! - 異常系：所属していないチャット宛て（ストレージは呼ばれない）
//! - 異常系：data の形式不正、ルーム未作成、永続化失敗

use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{ChatRepository, MessageRepository, StoredMessage},
    infrastructure::dto::websocket::{EVENT_MESSAGE, MessageFromRequest},
    realtime::{Envelope, Socket},
};

use super::error::SendMessageError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    chat_repository: Arc<dyn ChatRepository>,
    message_repository: Arc<dyn MessageRepository>,
}

impl SendMessageUseCase {
    pub fn new(
        chat_repository: Arc<dyn ChatRepository>,
        message_repository: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            chat_repository,
            message_repository,
        }
    }

    /// メッセージ送信を実行
    ///
    /// 保存したメッセージをルームの他のメンバーに配信し、送信者には ack として返す。
    /// 送信者がチャットの参加者で、かつルームが存在する場合のみ保存する。
    pub async fn execute(
        &self,
        socket: &Socket,
        data: Value,
    ) -> Result<StoredMessage, SendMessageError> {
        let user_id = socket.user_id();

        // 1. data を MessageFromRequest にデコード
        let request: MessageFromRequest =
            serde_json::from_value(data).map_err(|_| SendMessageError::InvalidDataFormat)?;
        let chat_id = request.chat_id;

        // 2. 参加者チェック
        if !self
            .chat_repository
            .is_participant(user_id, chat_id)
            .await?
        {
            return Err(SendMessageError::NotAllowed(chat_id));
        }

        // 3. ルーム取得
        let room = socket.hub().rooms().get(chat_id).await?;

        // 4. 永続化
        let stored = self
            .message_repository
            .create(request.into_new_message(user_id))
            .await?;

        // 5. ブロードキャストと ack
        let envelope = Envelope::with_payload(EVENT_MESSAGE, &stored)
            .map_err(|e| SendMessageError::Encode(e.to_string()))?;
        let delivered = room.send(user_id, &envelope).await;
        if let Err(e) = socket.message(&envelope) {
            tracing::debug!(user_id = %user_id, "Ack not sent: {}", e);
        }
        tracing::info!(
            user_id = %user_id,
            chat_id = %chat_id,
            message_id = stored.id,
            "Message delivered to {} member(s)",
            delivered
        );

        Ok(stored)
    }
}
