use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    hash::Hash,
    mem,
    num::NonZeroUsize,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, Weak},
    task::{Context, Poll, Waker},
    time::Duration,
};

use crate::{
    data::{KeySet, Token as KeyToken, ValueSet},
    wakerset::{Token as WakerToken, WakerSet},
};

/// The function that does the actual work for a batch: given every distinct
/// key collected during a window, produce a [`ValueSet`] with one value per
/// key, or fail the whole batch.
///
/// Any `Fn(KeySet<Key>) -> impl Future<Output = Result<ValueSet<V>, E>>`
/// is a `Batcher`. Implement the trait directly when the batch function needs
/// a nameable type, for instance to store the controller in a struct.
pub trait Batcher<Key: Eq + Hash> {
    type Value;
    type Error;
    type Future: Future<Output = Result<ValueSet<Self::Value>, Self::Error>>;

    fn batch(&self, keys: KeySet<Key>) -> Self::Future;
}

impl<Key, F, Fut, Value, Error> Batcher<Key> for F
where
    Key: Eq + Hash,
    F: Fn(KeySet<Key>) -> Fut,
    Fut: Future<Output = Result<ValueSet<Value>, Error>>,
{
    type Value = Value;
    type Error = Error;
    type Future = Fut;

    fn batch(&self, keys: KeySet<Key>) -> Fut {
        self(keys)
    }
}

/// Opens the window during which keys are collected into one batch. The
/// window closes when the returned future completes.
///
/// Any `Fn() -> impl Future<Output = ()>` is a `Window`; a [`Duration`] opens a
/// runtime-agnostic timer of that length.
pub trait Window {
    type Delay: Future<Output = ()>;

    fn open(&self) -> Self::Delay;
}

impl<F, Delay> Window for F
where
    F: Fn() -> Delay,
    Delay: Future<Output = ()>,
{
    type Delay = Delay;

    fn open(&self) -> Delay {
        self()
    }
}

impl Window for Duration {
    type Delay = futures_timer::Delay;

    fn open(&self) -> futures_timer::Delay {
        futures_timer::Delay::new(*self)
    }
}

/// Configuration for a [`BatchController`].
#[derive(Debug, Clone, Default)]
pub struct BatchRules<Batcher, Window> {
    /// The batch function.
    pub batcher: Batcher,

    /// How long a batch collects keys after its first key arrives.
    pub window: Window,

    /// Dispatch a batch as soon as it holds this many distinct keys, without
    /// waiting for the window.
    pub max_keys: Option<NonZeroUsize>,
}

struct AccumulatingState<Key: Eq + Hash, B, W: Window> {
    keys: KeySet<Key>,
    rules: Arc<BatchRules<B, W>>,
    delay: Option<W::Delay>,
    wakers: WakerSet,
}

impl<Key, B, W> Debug for AccumulatingState<Key, B, W>
where
    Key: Debug + Eq + Hash,
    W: Window,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatingState")
            .field("keys", &self.keys)
            .field("delay", &self.delay.as_ref().map(|_| "<window>"))
            .field("wakers", &self.wakers)
            .finish()
    }
}

#[derive(Debug)]
struct RunningState<Fut> {
    fut: Fut,
    wakers: WakerSet,
    dropped_tokens: Vec<KeyToken>,
}

enum State<Key: Eq + Hash, B: Batcher<Key>, W: Window> {
    Accum(AccumulatingState<Key, B, W>),
    Running(RunningState<B::Future>),
    Done(Result<ValueSet<B::Value>, B::Error>),
}

type SharedState<Key, B, W> = Arc<Mutex<State<Key, B, W>>>;

/// Collects individual key lookups into batches.
///
/// Each call to [`load`](BatchController::load) joins the batch that is
/// currently accumulating, or opens a new one. A batch stops accepting keys
/// once its window closes or it reaches `max_keys`; its futures then run the
/// batch function together and each one completes with the value for its own
/// key. The controller only holds a weak reference to the accumulating batch;
/// batches are owned by the futures waiting on them.
pub struct BatchController<Key: Eq + Hash, B: Batcher<Key>, W: Window> {
    rules: Arc<BatchRules<B, W>>,

    #[allow(clippy::type_complexity)]
    current: Mutex<Weak<Mutex<State<Key, B, W>>>>,
}

impl<Key, B, W> Debug for BatchController<Key, B, W>
where
    Key: Eq + Hash,
    B: Batcher<Key>,
    W: Window,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchController")
            .field("max_keys", &self.rules.max_keys)
            .finish_non_exhaustive()
    }
}

impl<Key, B, W> BatchController<Key, B, W>
where
    Key: Eq + Hash,
    B: Batcher<Key>,
    W: Window,
{
    pub fn new(rules: BatchRules<B, W>) -> Self {
        Self {
            rules: Arc::new(rules),
            current: Mutex::new(Weak::new()),
        }
    }

    pub fn rules(&self) -> &BatchRules<B, W> {
        &self.rules
    }

    /// Request the value for `key`. The returned future resolves once the
    /// batch it joined has run.
    pub fn load(&self, key: Key) -> BatchFuture<Key, B, W> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        // Join the accumulating batch if there is one. Timing isn't checked
        // here: if the window has already elapsed, the next poll of any of its
        // futures moves it to Running, and the key still rides along.
        if let Some(shared) = current.upgrade() {
            if let Ok(mut guard) = shared.lock() {
                if let State::Accum(state) = &mut *guard {
                    let key_token = state.keys.add_key(key);

                    // At the key limit, skip the rest of the window: wake the
                    // driver so it dispatches, and detach the batch so no
                    // further keys join it.
                    if let Some(max_keys) = self.rules.max_keys {
                        if state.keys.len() >= max_keys.get() {
                            state.delay = None;
                            state.wakers.wake_driver();
                            *current = Weak::new();
                        }
                    }

                    drop(guard);
                    return BatchFuture::new(key_token, Arc::clone(&shared));
                }
            }
        }

        let mut keys = KeySet::new();
        let key_token = keys.add_key(key);

        // A batch that can only ever hold one key doesn't need a window, and
        // nobody else can join it.
        let single = matches!(self.rules.max_keys, Some(max_keys) if max_keys.get() <= 1);

        let shared = Arc::new(Mutex::new(State::Accum(AccumulatingState {
            keys,
            rules: self.rules.clone(),
            delay: if single { None } else { Some(self.rules.window.open()) },
            wakers: WakerSet::default(),
        })));

        if !single {
            *current = Arc::downgrade(&shared);
        }

        BatchFuture::new(key_token, shared)
    }
}

/// A pending lookup for one key, created by [`BatchController::load`].
///
/// The batch is driven entirely by polling these futures; nothing runs in
/// the background. Only one of the futures sharing a batch (the most recently
/// polled) is woken to advance the window and the batch function. The others
/// are woken once the results are ready, or when the driving future is
/// dropped and one of them has to take over.
pub struct BatchFuture<Key: Eq + Hash, B: Batcher<Key>, W: Window> {
    key_token: KeyToken,
    waker_token: Option<WakerToken>,

    // None once this future has produced its output.
    state: Option<SharedState<Key, B, W>>,
}

impl<Key, B, W> BatchFuture<Key, B, W>
where
    Key: Eq + Hash,
    B: Batcher<Key>,
    W: Window,
{
    fn new(key_token: KeyToken, state: SharedState<Key, B, W>) -> Self {
        Self {
            key_token,
            waker_token: None,
            state: Some(state),
        }
    }
}

/// Make this future's waker the driving waker of the shared batch.
fn register_waker(slot: &mut Option<WakerToken>, wakers: &mut WakerSet, waker: &Waker) {
    match slot {
        Some(token) => wakers.replace_waker(token, waker),
        None => *slot = Some(wakers.add_waker(waker.clone())),
    }
}

impl<Key, B, W> Future for BatchFuture<Key, B, W>
where
    Key: Eq + Hash,
    B: Batcher<Key>,
    B::Value: Clone,
    B::Error: Clone,
    W: Window,
{
    type Output = Result<B::Value, B::Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // The lock is only held for the duration of a poll, never across one.
        // A panic inside the batch function or the window poisons it, which
        // propagates the panic to every other future in the batch.
        let shared = this
            .state
            .as_ref()
            .expect("Can't re-poll a completed BatchFuture");
        let mut guard = shared.lock().expect("batch panicked in another future");
        let state = &mut *guard;

        if let State::Accum(accum) = &mut *state {
            if let Some(delay) = accum.delay.as_mut() {
                // Safety: the delay lives inside the Arc'd state and is never
                // moved out; it is dropped in place when the state below is
                // overwritten.
                let delay = unsafe { Pin::new_unchecked(delay) };
                if delay.poll(ctx).is_pending() {
                    register_waker(&mut this.waker_token, &mut accum.wakers, ctx.waker());
                    return Poll::Pending;
                }
            }

            let wakers = mem::take(&mut accum.wakers);
            let keys = accum.keys.take();

            // The future is created here and moved into the state before it is
            // ever pinned.
            let fut = accum.rules.batcher.batch(keys);

            *state = State::Running(RunningState {
                fut,
                wakers,
                dropped_tokens: Vec::new(),
            });
        }

        if let State::Running(running) = &mut *state {
            // Safety: same as the delay above; the future stays put inside the
            // shared state until it is dropped in place.
            let fut = unsafe { Pin::new_unchecked(&mut running.fut) };

            let mut result = match fut.poll(ctx) {
                Poll::Pending => {
                    register_waker(&mut this.waker_token, &mut running.wakers, ctx.waker());
                    return Poll::Pending;
                }
                Poll::Ready(result) => result,
            };

            // Futures that went away while the batch was running still have
            // claims in the ValueSet.
            if let Ok(values) = &mut result {
                running
                    .dropped_tokens
                    .iter()
                    .for_each(|token| values.discard(token));
            }

            // Everyone else can now collect their results. We're about to
            // collect ours, so we don't need to be woken.
            let mut wakers = mem::take(&mut running.wakers);
            if let Some(token) = this.waker_token.take() {
                wakers.discard_waker(&token);
            }
            wakers.wake_all();

            *state = State::Done(result);
        }

        let output = match &mut *state {
            State::Done(Ok(values)) => values.take(&this.key_token).map(Ok),
            State::Done(Err(err)) => Some(Err(err.clone())),
            _ => unreachable!("BatchFuture contained invalid state"),
        };

        // Release the lock explicitly so a panic below can't poison it.
        drop(guard);
        this.state = None;

        match output {
            Some(output) => Poll::Ready(output),
            None => panic!("Unknown logic error: no value in ValueSet associated with Token"),
        }
    }
}

impl<Key, B, W> Drop for BatchFuture<Key, B, W>
where
    Key: Eq + Hash,
    B: Batcher<Key>,
    W: Window,
{
    fn drop(&mut self) {
        // Whoever is dropped may have been driving the batch, so another
        // waiter must be woken to take over; WakerSet::discard_and_wake
        // handles that. If the lock is poisoned a batch function already
        // panicked and there is nothing left to clean up.
        let Some(shared) = self.state.as_ref() else {
            return;
        };
        let Ok(mut guard) = shared.lock() else {
            return;
        };

        match *guard {
            State::Accum(ref mut state) => {
                if let Some(waker_token) = self.waker_token.take() {
                    state.wakers.discard_and_wake(&waker_token);
                }
                state.keys.discard_token(&self.key_token);
            }
            State::Running(ref mut state) => {
                if let Some(waker_token) = self.waker_token.take() {
                    state.wakers.discard_and_wake(&waker_token);
                }

                // The KeySet now belongs to the running batch function; the
                // claim is dropped from the ValueSet once it exists.
                state.dropped_tokens.push(self.key_token.duplicate());
            }
            State::Done(Ok(ref mut values)) => values.discard(&self.key_token),
            State::Done(Err(..)) => {}
        }
    }
}
