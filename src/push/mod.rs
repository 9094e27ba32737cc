//! Push Channel
//!
//! Live delivery of new readings over Socket.IO.
//!
//! ## Architecture
//!
//! - **packet**: Engine.IO / Socket.IO text codec
//! - **client**: [`PushClient`] opens one WebSocket per subscription, joins
//!   the channel's room and forwards `newFeed` events
//! - **Subscription**: cancellable handle; closing or dropping it tears the
//!   connection down, so a view that is remounted never holds two
//!
//! ## Wire flow
//!
//! ```text
//! server: 0{"sid":..,"pingInterval":..}      (open)
//! client: 40{"token":..}                     (connect, default namespace)
//! server: 40{"sid":..}                       (connected)
//! client: 42["joinRoom",{"channelId":"c1"}]
//! server: 42["newFeed",{...reading...}]      (repeated)
//! server: 2  /  client: 3                    (ping / pong)
//! ```

mod client;
pub mod packet;

pub use client::{
    PushClient, PushError, PushEvent, PushResult, Subscription, JOIN_ROOM_EVENT,
    NEW_READING_EVENT,
};
pub use packet::{EnginePacket, Handshake, PacketError, SocketPacket};
