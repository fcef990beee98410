//! WebSocket 上でやり取りする `{event, data}` の単位
//!
//! ## 責務
//!
//! - envelope のエンコード・デコード
//! - エラー返信用の envelope の生成

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::signature::JsonSignature;

/// 問題の説明を運ぶイベント
pub const EVENT_ERROR: &str = "error";
/// 接続終了時に一度だけ発火する合成イベント
pub const EVENT_DISCONNECT: &str = "disconnect";

/// テキストフレームが envelope として不正な場合の返信
pub const INVALID_FORMAT_MESSAGE: &str = "message must be in format: { event: string, data: any }";
/// テキスト以外のフレームを受信した場合の返信
pub const TEXT_ONLY_MESSAGE: &str = "only text messages are allowed";

/// イベント envelope
///
/// `{"event": <string>, "data": <any>}` としてシリアライズされる。
/// `data` が欠けている場合は `null` としてデコードされる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// シリアライズ可能な任意のペイロードから envelope を作成
    pub fn with_payload<T: Serialize>(
        event: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }

    /// `message` を運ぶ `"error"` イベント
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EVENT_ERROR, Value::String(message.into()))
    }

    pub fn invalid_format() -> Self {
        Self::error(INVALID_FORMAT_MESSAGE)
    }

    /// `T` が期待するペイロードの形を示す `"error"` イベント
    pub fn invalid_data_format<T: JsonSignature>() -> Self {
        Self::error(format!(
            "message data must be in format: {}",
            T::signature()
        ))
    }

    pub fn is_error(&self) -> bool {
        self.event == EVENT_ERROR
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
