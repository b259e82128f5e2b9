//! Internal event types and the channels that carry them.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, NoticeReceiver, NoticeSender, notice_channel};
pub use types::PaymentNotice;
