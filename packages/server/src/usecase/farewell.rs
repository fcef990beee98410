//! UseCase: 切断時のお別れメッセージ

use crate::{
    domain::NewMessage,
    infrastructure::dto::websocket::EVENT_MESSAGE,
    realtime::{Envelope, Socket},
};

pub const FAREWELL_CONTENT: &str = "bye, I leave";

/// 切断したユーザーの所属ルームにお別れメッセージを送るユースケース
#[derive(Debug, Default)]
pub struct FarewellUseCase;

impl FarewellUseCase {
    pub fn new() -> Self {
        Self
    }

    /// ユーザーがまだ参加している全てのルームに退出を知らせる
    ///
    /// 同じユーザーの新しい接続がある場合は何も送らない。
    /// お別れメッセージは永続化しない。
    ///
    /// # 戻り値
    ///
    /// 知らせたルームの数
    pub async fn execute(&self, socket: &Socket) -> usize {
        let user_id = socket.user_id();
        let hub = socket.hub();

        if let Ok(current) = hub.connections().get(user_id).await
            && !current.same_as(socket.connection())
        {
            tracing::debug!(user_id = %user_id, "Skipping farewell for replaced connection");
            return 0;
        }

        let rooms = hub.rooms().get_all_for_user(user_id).await;
        for room in &rooms {
            let farewell = NewMessage {
                sender_id: user_id,
                chat_id: room.chat_id(),
                kind: "text".to_string(),
                content: FAREWELL_CONTENT.to_string(),
            };
            match Envelope::with_payload(EVENT_MESSAGE, &farewell) {
                Ok(envelope) => {
                    room.send(user_id, &envelope).await;
                }
                Err(e) => tracing::error!(user_id = %user_id, "Failed to encode farewell: {}", e),
            }
        }
        rooms.len()
    }
}
