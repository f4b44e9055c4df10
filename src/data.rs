//! Data structures for passing keys into and outcomes out of a batch.

use std::collections::hash_map::{Entry, HashMap};
use std::hash::Hash;
use std::mem;
use std::num::NonZeroUsize;

/// Identifies one distinct key within a single [`KeySet`], and later the
/// matching outcome within the [`ValueSet`] built from it. Every waiting
/// future holds exactly one.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    pub(crate) fn duplicate(&self) -> Self {
        Token(self.0)
    }
}

/// The distinct keys collected during one batch window. A batch function
/// reads them with [`keys`](KeySet::keys), performs its lookup, and then
/// converts the set into a [`ValueSet`] with [`into_values`](KeySet::into_values),
/// which is the only way a `ValueSet` can be created. That guarantees every
/// waiting future finds an outcome for its key.
#[derive(Debug)]
pub struct KeySet<Key: Eq + Hash> {
    // Tokens are handed out from the len of `keys`, so keys are never removed
    // from this table; a key whose waiters all went away is dropped from
    // `waiters` instead.
    keys: HashMap<Key, Token>,

    // Number of futures waiting on each token. Always at least 1.
    waiters: HashMap<Token, usize>,
}

impl<Key: Eq + Hash> KeySet<Key> {
    pub(crate) fn new() -> Self {
        Self {
            keys: HashMap::new(),
            waiters: HashMap::new(),
        }
    }

    /// Register one more waiter for `key`, returning the token it should use
    /// to collect its outcome.
    pub(crate) fn add_key(&mut self, key: Key) -> Token {
        let next = NonZeroUsize::new(self.keys.len() + 1).expect("len + 1 is never zero");
        let token = self.keys.entry(key).or_insert(Token(next)).duplicate();
        *self.waiters.entry(token.duplicate()).or_insert(0) += 1;
        token
    }

    /// Forget one waiter for a token. Once the last waiter is gone, the key
    /// no longer appears in [`keys`](KeySet::keys).
    pub(crate) fn discard_token(&mut self, token: &Token) {
        match self.waiters.get_mut(token) {
            Some(1) => {
                self.waiters.remove(token);
            }
            Some(count) => *count -= 1,
            None => panic!("Attempted to remove nonexistent token from KeySet"),
        }
    }

    /// Check if there are any keys in this keyset
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Get the number of unique keys in this keyset.
    #[inline]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check whether anyone is still waiting on `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.keys
            .get(key)
            .map_or(false, |token| self.waiters.contains_key(token))
    }

    /// Iterate over the keys in this set. Keys are unique, in arbitrary order,
    /// and never more than the `max_keys` of the controller that built them.
    pub fn keys(&self) -> impl Iterator<Item = &Key> + Clone {
        let waiters = &self.waiters;

        self.keys
            .iter()
            .filter(move |(_key, token)| waiters.contains_key(token))
            .map(|(key, _token)| key)
    }

    /// Pair every key with its outcome.
    pub fn into_values<Value>(self, mut get_value: impl FnMut(&Key) -> Value) -> ValueSet<Value> {
        let KeySet { keys, mut waiters } = self;

        let values = keys
            .into_iter()
            .filter_map(|(key, token)| {
                let remaining = waiters.remove(&token)?;
                let value = get_value(&key);
                Some((token, ValueSetEntry { remaining, value }))
            })
            .collect();

        ValueSet { values }
    }

    /// Move the accumulated keys out, leaving an empty set behind. Used when
    /// a batch stops accumulating and hands its keys to the batch function.
    pub(crate) fn take(&mut self) -> Self {
        Self {
            keys: mem::take(&mut self.keys),
            waiters: mem::take(&mut self.waiters),
        }
    }
}

#[derive(Debug)]
struct ValueSetEntry<Value> {
    remaining: usize,
    value: Value,
}

/// The outcomes of one batch, matched to the tokens of the waiting futures.
/// Each waiter takes its outcome exactly once; all but the last receive a
/// clone.
#[derive(Debug)]
pub struct ValueSet<Value> {
    values: HashMap<Token, ValueSetEntry<Value>>,
}

impl<Value> ValueSet<Value> {
    /// Drop one waiter's claim without producing the value. No-op if the
    /// token isn't present.
    pub(crate) fn discard(&mut self, token: &Token) {
        if let Entry::Occupied(mut entry) = self.values.entry(token.duplicate()) {
            match entry.get().remaining {
                0 | 1 => {
                    entry.remove();
                }
                _ => entry.get_mut().remaining -= 1,
            }
        }
    }
}

impl<Value: Clone> ValueSet<Value> {
    /// Take the outcome for a token. The last waiter receives the stored value
    /// itself; earlier ones receive clones.
    pub(crate) fn take(&mut self, token: &Token) -> Option<Value> {
        match self.values.entry(token.duplicate()) {
            Entry::Vacant(..) => None,
            Entry::Occupied(entry) if entry.get().remaining <= 1 => Some(entry.remove().value),
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                entry.remaining -= 1;
                Some(entry.value.clone())
            }
        }
    }
}
