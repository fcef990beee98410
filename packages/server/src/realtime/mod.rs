//! リアルタイムのメッセージ配信
//!
//! - [`connection`]: 接続と接続レジストリ
//! - [`room`]: チャットルームとルームレジストリ
//! - [`socket`]: アプリケーションが使う接続ごとのファサード
//! - [`dispatch`]: フレームをイベントに変換する読み込みループ
//! - [`server`]: レジストリの所有と接続の受け付け

pub mod connection;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod room;
pub mod server;
pub mod signature;
pub mod socket;

pub use connection::{Connection, ConnectionRegistry, Outbound, OutboundReceiver};
pub use envelope::{EVENT_DISCONNECT, EVENT_ERROR, Envelope};
pub use error::{ConnectionError, ListenerError, RegistryError};
pub use room::{Room, RoomRegistry, RoomSnapshot};
pub use server::{
    CLOSE_INTERNAL_ERROR, CLOSE_NORMAL, CLOSE_REPLACED, ConnectionHandler, Hub, RealtimeServer,
};
pub use signature::JsonSignature;
pub use socket::{Listener, Socket};
