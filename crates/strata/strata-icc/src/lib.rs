mod broadcast;
mod error;
mod notify;
mod ram_buffer;
mod ring;
mod sender;
mod seqlock;
mod shm_layout;

pub use broadcast::{BroadcastReader, BroadcastWriter};
pub use error::{IccError, NotifyError, RingError};
pub use notify::{IdPublisher, IdSubscriber, Publisher, Subscriber, channel_path};
pub use ram_buffer::{BufferConfig, RingBuffer, RingReader, SlotRead};
pub use ring::{RingConfig, slot_index};
pub use sender::{ReceivedFrame, Receiver, Sender, buffer_paths};
pub use shm_layout::{EMPTY_SLOT, SlotLayout};
