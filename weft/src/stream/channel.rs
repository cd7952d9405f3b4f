use std::fmt;

use weft_api::StreamMessage;

/// One end of an in-process duplex channel.
pub struct MessagePort<T = StreamMessage> {
    pub(crate) sender: flume::Sender<T>,
    pub(crate) receiver: flume::Receiver<T>,
}

impl<T> Clone for MessagePort<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> fmt::Debug for MessagePort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("pending", &self.receiver.len())
            .finish()
    }
}

impl<T> MessagePort<T> {
    pub fn post(&self, message: T) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn into_parts(self) -> (flume::Sender<T>, flume::Receiver<T>) {
        (self.sender, self.receiver)
    }
}

/// Two connected ports: what one posts, the other receives, in order.
pub fn message_channel<T>() -> (MessagePort<T>, MessagePort<T>) {
    let (a_tx, b_rx) = flume::unbounded();
    let (b_tx, a_rx) = flume::unbounded();
    (
        MessagePort {
            sender: a_tx,
            receiver: a_rx,
        },
        MessagePort {
            sender: b_tx,
            receiver: b_rx,
        },
    )
}
