//! Event fan-out. Subscribers are plain `mpsc` senders; a subscriber whose receiving end is gone
//! is considered dead and is dropped from the registry before the next delivery.

use crate::Event;

use tokio::sync::mpsc;

pub(crate) struct Handlers {
    subs: Vec<mpsc::Sender<Event>>,
}

impl Handlers {
    pub(crate) fn new(subs: Vec<mpsc::Sender<Event>>) -> Handlers {
        let mut handlers = Handlers { subs: Vec::new() };
        for snd in subs {
            handlers.add(snd);
        }
        handlers
    }

    /// Register a subscriber. Registering a sender of an already-subscribed channel again is a
    /// no-op.
    pub(crate) fn add(&mut self, snd: mpsc::Sender<Event>) {
        if !self.subs.iter().any(|sub| sub.same_channel(&snd)) {
            self.subs.push(snd);
        }
    }

    pub(crate) fn remove(&mut self, snd: &mpsc::Sender<Event>) {
        self.subs.retain(|sub| !sub.same_channel(snd));
    }

    /// Deliver an event to every live subscriber, in registration order. Delivery is
    /// fire-and-forget: a subscriber with a full queue misses the event rather than slowing the
    /// client down.
    pub(crate) fn emit(&mut self, ev: Event) {
        self.subs.retain(|sub| !sub.is_closed());
        for snd in &self.subs {
            let _ = snd.try_send(ev.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn test_add_is_idempotent() {
        let (snd, mut rcv) = mpsc::channel(10);
        let mut handlers = Handlers::new(vec![snd.clone()]);
        handlers.add(snd.clone());
        handlers.add(snd);
        handlers.emit(Event::LoggedIn);
        assert_eq!(rcv.try_recv(), Ok(Event::LoggedIn));
        assert_eq!(rcv.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_remove() {
        let (snd1, mut rcv1) = mpsc::channel(10);
        let (snd2, mut rcv2) = mpsc::channel(10);
        let mut handlers = Handlers::new(vec![snd1.clone(), snd2]);
        handlers.remove(&snd1);
        handlers.emit(Event::LoggedIn);
        assert_eq!(rcv1.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(rcv2.try_recv(), Ok(Event::LoggedIn));
    }

    #[test]
    fn test_dead_subscribers_are_pruned() {
        let (snd1, rcv1) = mpsc::channel(10);
        let (snd2, mut rcv2) = mpsc::channel(10);
        let mut handlers = Handlers::new(vec![snd1.clone(), snd2]);
        drop(rcv1);
        handlers.emit(Event::LoggedIn);
        assert_eq!(rcv2.try_recv(), Ok(Event::LoggedIn));
        // The dead subscriber is gone; re-adding the same sender works like a fresh registration
        // but delivery to it still goes nowhere, so only the live one counts.
        assert_eq!(handlers.subs.len(), 1);
        let (snd3, mut rcv3) = mpsc::channel(10);
        handlers.add(snd3);
        handlers.emit(Event::Disconnected);
        assert_eq!(rcv2.try_recv(), Ok(Event::Disconnected));
        assert_eq!(rcv3.try_recv(), Ok(Event::Disconnected));
        // A sender clone kept around does not keep a dead subscription alive
        assert!(snd1.is_closed());
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let (snd, mut rcv) = mpsc::channel(1);
        let mut handlers = Handlers::new(vec![snd]);
        handlers.emit(Event::LoggedIn);
        handlers.emit(Event::Disconnected); // dropped, queue is full
        assert_eq!(rcv.try_recv(), Ok(Event::LoggedIn));
        assert_eq!(rcv.try_recv(), Err(TryRecvError::Empty));
    }
}
