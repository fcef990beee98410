//! UseCase: 接続ごとにチャットのユースケースをソケットへ結びつける接続ハンドラー

use std::sync::Arc;

use serde_json::Value;

use crate::{
    infrastructure::dto::websocket::EVENT_MESSAGE,
    realtime::{CLOSE_INTERNAL_ERROR, EVENT_DISCONNECT, ListenerError, RealtimeServer, Socket},
};

use super::{FarewellUseCase, JoinChatsUseCase, SendMessageUseCase};

pub struct ChatEvents {
    join_chats: JoinChatsUseCase,
    send_message: SendMessageUseCase,
    farewell: FarewellUseCase,
}

impl ChatEvents {
    pub fn new(
        join_chats: JoinChatsUseCase,
        send_message: SendMessageUseCase,
        farewell: FarewellUseCase,
    ) -> Self {
        Self {
            join_chats,
            send_message,
            farewell,
        }
    }

    /// サーバーの接続ハンドラーとして登録する
    pub fn install(self: Arc<Self>, server: &mut RealtimeServer) {
        server.handle_connection(move |socket| {
            let events = Arc::clone(&self);
            async move { events.on_connection(socket).await }
        });
    }

    /// ユーザーを所属ルームに参加させ、"message" と "disconnect" のリスナーを登録する
    ///
    /// 所属チャットを取得できない場合は 1011 で切断する。
    pub async fn on_connection(self: Arc<Self>, socket: Socket) {
        if let Err(e) = self.join_chats.execute(&socket).await {
            tracing::error!(user_id = %socket.user_id(), "Failed to join chat rooms: {}", e);
            socket.disconnect(CLOSE_INTERNAL_ERROR, e.to_string()).await;
            return;
        }

        let events = Arc::clone(&self);
        let author = socket.clone();
        socket.on(EVENT_MESSAGE, move |data: Value| {
            let events = Arc::clone(&events);
            let author = author.clone();
            async move {
                if let Err(e) = events.send_message.execute(&author, data).await {
                    tracing::info!(user_id = %author.user_id(), "Message refused: {}", e);
                    author.message(&e.reply())?;
                }
                Ok::<(), ListenerError>(())
            }
        });

        let events = Arc::clone(&self);
        let leaver = socket.clone();
        socket.on(EVENT_DISCONNECT, move |_: Value| {
            let events = Arc::clone(&events);
            let leaver = leaver.clone();
            async move {
                events.farewell.execute(&leaver).await;
                Ok::<(), ListenerError>(())
            }
        });
    }
}
