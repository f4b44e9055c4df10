use std::{collections::HashMap, num::NonZeroUsize, task::Waker};

#[derive(Debug, Eq, PartialEq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    fn duplicate(&self) -> Token {
        Token(self.0)
    }
}

/// The wakers of every future waiting on one shared batch.
///
/// Only one task needs to drive a batch (its window timer, then its fetch),
/// so the set tracks a single "driving" waker: whichever waker most recently
/// polled the shared state. Every waiter registers its waker and holds the
/// returned token, which it uses to refresh the waker on later polls and to
/// leave the set when it is dropped.
///
/// When the driving waiter leaves, [`discard_and_wake`](WakerSet::discard_and_wake)
/// promotes and wakes another one, so a batch always has someone to push it
/// forward for as long as anyone is still waiting on it. Tokens are not
/// cloneable, which keeps each one tied to a single future.
#[derive(Debug)]
pub(crate) struct WakerSet {
    wakers: HashMap<Token, Waker>,
    driving_waker: Option<Token>,

    // WakerSets live for one batch, so this never realistically overflows.
    next_token: NonZeroUsize,
}

impl Default for WakerSet {
    fn default() -> Self {
        Self {
            wakers: HashMap::with_capacity(1),
            driving_waker: None,
            next_token: NonZeroUsize::MIN,
        }
    }
}

impl WakerSet {
    /// Register a waker that has just polled the shared state, making it the
    /// driving waker.
    #[must_use]
    pub(crate) fn add_waker(&mut self, waker: Waker) -> Token {
        let token = Token(self.next_token);
        self.next_token = self
            .next_token
            .checked_add(1)
            .expect("Overflow when creating token");

        self.wakers.insert(token.duplicate(), waker);
        self.driving_waker = Some(token.duplicate());
        token
    }

    /// Refresh the waker for an existing token and make it the driving waker.
    /// Panics if the token is not present in the set.
    pub(crate) fn replace_waker(&mut self, token: &Token, waker: &Waker) {
        let slot = self
            .wakers
            .get_mut(token)
            .expect("Attempted to add Waker to WakerSet with an invalid token");

        if !slot.will_wake(waker) {
            slot.clone_from(waker);
        }

        self.driving_waker = Some(token.duplicate());
    }

    /// Remove a waker without handing off the driving role. Only for futures
    /// that have completed; anything else should use `discard_and_wake`.
    pub(crate) fn discard_waker(&mut self, token: &Token) {
        self.wakers.remove(token);
        if self.driving_waker.as_ref() == Some(token) {
            self.driving_waker = None;
        }
    }

    /// Remove a waker. If it was driving (or nobody is), promote an arbitrary
    /// remaining waker and wake it. Doing this eagerly means a burst of drops
    /// still leaves at least one live waiter awake.
    pub(crate) fn discard_and_wake(&mut self, token: &Token) {
        self.wakers.remove(token);
        if self.driving_waker.as_ref() == Some(token) || self.driving_waker.is_none() {
            self.driving_waker = match self.wakers.iter().next() {
                None => None,
                Some((token, waker)) => {
                    waker.wake_by_ref();
                    Some(token.duplicate())
                }
            };
        }
    }

    /// Wake only the driving waker, if there is one. Used when a batch becomes
    /// ready to run before its window has closed.
    pub(crate) fn wake_driver(&self) {
        if let Some(waker) = self
            .driving_waker
            .as_ref()
            .and_then(|token| self.wakers.get(token))
        {
            waker.wake_by_ref();
        }
    }

    pub(crate) fn wake_all(self) {
        self.wakers.into_values().for_each(Waker::wake);
    }

    #[cfg(test)]
    fn is_driving(&self, token: &Token) -> bool {
        self.driving_waker.as_ref() == Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Arc<CountingWaker>, Waker) {
        let counter = Arc::new(CountingWaker::default());
        (counter.clone(), Waker::from(counter))
    }

    fn wakes(counter: &CountingWaker) -> usize {
        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn latest_waker_drives() {
        let mut set = WakerSet::default();
        let (_, w1) = counting();
        let (_, w2) = counting();

        let t1 = set.add_waker(w1.clone());
        let t2 = set.add_waker(w2);
        assert!(set.is_driving(&t2));

        set.replace_waker(&t1, &w1);
        assert!(set.is_driving(&t1));
    }

    #[test]
    fn dropping_the_driver_hands_off() {
        let mut set = WakerSet::default();
        let (c1, w1) = counting();
        let (c2, w2) = counting();

        let _t1 = set.add_waker(w1);
        let t2 = set.add_waker(w2);

        set.discard_and_wake(&t2);
        assert_eq!(wakes(&c1), 1);
        assert_eq!(wakes(&c2), 0);
    }

    #[test]
    fn dropping_a_passenger_wakes_nobody() {
        let mut set = WakerSet::default();
        let (c1, w1) = counting();
        let (c2, w2) = counting();

        let t1 = set.add_waker(w1);
        let _t2 = set.add_waker(w2);

        set.discard_and_wake(&t1);
        assert_eq!(wakes(&c1), 0);
        assert_eq!(wakes(&c2), 0);
    }

    #[test]
    fn completion_wakes_everyone_else() {
        let mut set = WakerSet::default();
        let (c1, w1) = counting();
        let (c2, w2) = counting();
        let (c3, w3) = counting();

        let _t1 = set.add_waker(w1);
        let _t2 = set.add_waker(w2);
        let t3 = set.add_waker(w3);

        set.discard_waker(&t3);
        set.wake_all();
        assert_eq!((wakes(&c1), wakes(&c2), wakes(&c3)), (1, 1, 0));
    }
}
