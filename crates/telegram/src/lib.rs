pub mod render;
pub mod transport;
pub mod update;

pub use render::{Outbound, Reply};
pub use transport::{
    ChatTransport, InlineButton, RecordingTransport, SentMessage, TelegramApi, TransportError,
};
pub use update::{InboundText, InboundUpdate, Update};
