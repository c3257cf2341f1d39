use telelink_frame::{classify, id_name, Message, MessageKind, StreamReducer};
use tracing::{trace, warn};

use crate::event::{EventSender, LinkEvent};

/// Routes complete messages to the consumer or the stream reducer.
///
/// Dispatch never changes link state; it only fans out events.
#[derive(Debug)]
pub struct Dispatcher {
    reducer: StreamReducer,
}

impl Dispatcher {
    pub fn new(reducer: StreamReducer) -> Self {
        Self { reducer }
    }

    pub fn dispatch(&mut self, message: Message, events: &EventSender) {
        match classify(message.id) {
            MessageKind::Data => {
                trace!(id = id_name(message.id), size = message.payload.len(), "telemetry");
                events.emit(LinkEvent::DecodedMessage(message));
            }
            MessageKind::BulkSample => {
                for values in self.reducer.feed(&message.payload) {
                    events.emit(LinkEvent::SampleBufferReady(values));
                }
            }
            MessageKind::Unknown => {
                warn!(
                    id = message.id,
                    size = message.payload.len(),
                    "unknown message discarded"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use telelink_frame::ReducerConfig;

    use super::*;

    fn dispatcher(ratio: usize, depth: usize) -> Dispatcher {
        Dispatcher::new(StreamReducer::new(ReducerConfig { ratio, depth }).unwrap())
    }

    #[test]
    fn data_messages_forwarded_verbatim() {
        let (events, rx) = EventSender::channel();
        let mut d = dispatcher(4, 16);
        let msg = Message::new(b'a', vec![0x34, 0x12]);

        d.dispatch(msg.clone(), &events);
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::DecodedMessage(msg));
    }

    #[test]
    fn bulk_samples_reduced_into_buffers() {
        let (events, rx) = EventSender::channel();
        let mut d = dispatcher(2, 2);
        let payload: Vec<u8> = [2i16, 4, 6, 8, 1]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        d.dispatch(Message::new(b'r', payload), &events);
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::SampleBufferReady(vec![3, 7]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let (events, rx) = EventSender::channel();
        let mut d = dispatcher(4, 16);
        d.dispatch(Message::new(b'Z', vec![1, 2, 3]), &events);
        assert!(rx.try_recv().is_err());
    }
}
