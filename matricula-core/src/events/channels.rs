use tokio::sync::mpsc;

use super::types::PaymentNotice;

/// Buffer size for internal channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type NoticeSender = mpsc::Sender<PaymentNotice>;
pub type NoticeReceiver = mpsc::Receiver<PaymentNotice>;

/// Channel from the reconciler to the notice relay.
pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
