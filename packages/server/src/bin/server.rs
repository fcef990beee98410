//! Real-time chat server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin rtchat-server -- --dev-token alice=1 --dev-token bob=2 --participants chats.json
//! cargo run --bin rtchat-server -- --host 0.0.0.0 --port 3000 --auth-service auth:8081
//! ```

use std::sync::Arc;

use clap::Parser;
use rtchat_server::{
    config::Config,
    infrastructure::repository::InMemoryMessageRepository,
    realtime::RealtimeServer,
    ui::Server,
    usecase::{ChatEvents, FarewellUseCase, JoinChatsUseCase, SendMessageUseCase},
};
use rtchat_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize dependencies in order:
    // 1. Collaborators
    // 2. UseCases
    // 3. Realtime server
    // 4. Server

    // 1. Collaborators
    let authenticator = config.authenticator()?;
    let chat_repository = Arc::new(config.chat_repository()?);
    tracing::info!("{} chat(s) loaded", chat_repository.chat_count().await);
    let message_repository = Arc::new(InMemoryMessageRepository::new());

    // 2. UseCases
    let chat_events = Arc::new(ChatEvents::new(
        JoinChatsUseCase::new(chat_repository.clone()),
        SendMessageUseCase::new(chat_repository, message_repository),
        FarewellUseCase::new(),
    ));

    // 3. Realtime server
    let mut realtime = RealtimeServer::new();
    chat_events.install(&mut realtime);

    // 4. Create and run the server
    Server::new(realtime, authenticator)
        .run(config.host, config.port)
        .await
}
