// Interface adapters: wire protocol, WebSocket sessions and HTTP status.

pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
