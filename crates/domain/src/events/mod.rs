//! 实时连接上的线上事件
//!
//! 每个事件都是 `{"event": "<名称>", "data": {...}}` 形式的 JSON 帧。

mod client;
mod server;

pub use client::{ClientEvent, SendMessagePayload};
pub use server::{MessageView, ServerEvent};
