//! The bounded action queue between the console reader and the dispatcher.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use log::trace;

use super::actions::Action;

/// Number of actions the queue holds before producers block.
pub const QUEUE_CAPACITY: usize = 10;

/// Create the queue. Senders can be cloned freely, there is a single
/// receiver.
pub fn action_queue() -> (ActionSender, ActionReceiver) {
    let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
    (ActionSender(tx), ActionReceiver(rx))
}

/// Producer side of the action queue.
#[derive(Clone, Debug)]
pub struct ActionSender(SyncSender<Action>);

impl ActionSender {
    /// Enqueue `action`, blocking while the queue is full. Fails only when
    /// the receiver is gone.
    pub fn send(&self, action: Action) -> Result<(), Action> {
        trace!("enqueue {}", action);
        self.0.send(action).map_err(|e| e.0)
    }

    /// Enqueue `action` without blocking.
    pub fn try_send(&self, action: Action) -> Result<(), TrySendError<Action>> {
        trace!("enqueue {}", action);
        self.0.try_send(action)
    }
}

/// Consumer side of the action queue.
#[derive(Debug)]
pub struct ActionReceiver(Receiver<Action>);

impl ActionReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Action, RecvTimeoutError> {
        self.0.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn actions_come_out_in_enqueue_order() {
        let (tx, rx) = action_queue();
        for action in Action::SEQUENCE.iter() {
            tx.send(*action).unwrap();
        }
        for action in Action::SEQUENCE.iter() {
            assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), *action);
        }
    }

    #[test]
    fn full_queue_applies_backpressure() {
        let (tx, rx) = action_queue();
        for _ in 0..QUEUE_CAPACITY {
            tx.try_send(Action::StartUms).unwrap();
        }
        assert!(matches!(
            tx.try_send(Action::TransferFile),
            Err(TrySendError::Full(Action::TransferFile))
        ));

        let producer = {
            let tx = tx.clone();
            thread::spawn(move || tx.send(Action::TransferFile))
        };
        for _ in 0..QUEUE_CAPACITY {
            assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Action::StartUms);
        }
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Action::TransferFile
        );
        assert_eq!(producer.join().unwrap(), Ok(()));
    }

    #[test]
    fn send_fails_once_the_receiver_is_dropped() {
        let (tx, rx) = action_queue();
        drop(rx);
        assert_eq!(tx.send(Action::BootBoard), Err(Action::BootBoard));
    }
}
