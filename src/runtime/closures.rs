//! Closure table.
//!
//! Managed callbacks handed to native code are identified by a token that
//! travels in the callable's user-data slot. The table keeps callbacks alive
//! for as long as their scope says native code may still invoke them:
//!
//! | Scope      | Lifetime                                         |
//! |------------|--------------------------------------------------|
//! | `call`     | until the native call returns                    |
//! | `async`    | held by the native side until it invokes it      |
//! | `notified` | until the destroy-notify trampoline runs         |
//! | `forever`  | for the life of the runtime                      |

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use nativebind_core::model::CallbackScope;
use rustc_hash::FxHashMap;

use crate::value::{Callback, Value};

/// Live managed callbacks by token.
#[derive(Debug)]
pub struct ClosureTable {
    next: AtomicUsize,
    live: Mutex<FxHashMap<usize, Callback>>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(1),
            live: Mutex::new(FxHashMap::default()),
        }
    }

    fn live(&self) -> MutexGuard<'_, FxHashMap<usize, Callback>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out a token for `callback`, retaining it if `scope` outlives the call.
    ///
    /// Async callbacks are not retained: the native side owns them until it
    /// invokes them, and dropping one unfired is how a lost completion shows up.
    pub fn register(&self, callback: &Callback, scope: CallbackScope) -> usize {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        if scope != CallbackScope::Async {
            self.live().insert(token, callback.clone());
        }
        trace!("closure {token} registered ({scope:?})");
        token
    }

    /// Drop the callback behind `token`. Returns whether it was live.
    pub fn remove(&self, token: usize) -> bool {
        let removed = self.live().remove(&token).is_some();
        if removed {
            trace!("closure {token} released");
        }
        removed
    }

    pub fn get(&self, token: usize) -> Option<Callback> {
        self.live().get(&token).cloned()
    }

    pub fn contains(&self, token: usize) -> bool {
        self.live().contains_key(&token)
    }

    /// Number of retained callbacks.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The destroy-notify trampoline releasing `token`.
    pub fn destroy_notify(self: &Arc<Self>, token: usize) -> Callback {
        let table = Arc::clone(self);
        Callback::new(move |_| {
            table.remove(token);
            Value::Null
        })
    }
}

impl Default for ClosureTable {
    fn default() -> Self {
        Self::new()
    }
}
