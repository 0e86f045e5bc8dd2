//! Single-flight execution of async operations
//!
//! While an operation is in flight, later callers with the same key await
//! the same future instead of starting their own. The result (success or
//! error) is shared by everyone who joined. A caller with a different key
//! replaces the slot, so work started under an older login is never handed
//! to callers of a newer one.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

struct Flight<T: Clone> {
    key: u64,
    id: u64,
    future: Shared<BoxFuture<'static, T>>,
}

pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<Flight<T>>>,
    next_id: Mutex<u64>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight operation for `key`, or start one with `make`
    pub async fn run<F, Fut>(&self, key: u64, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (id, future) = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(flight) if flight.key == key => (flight.id, flight.future.clone()),
                _ => {
                    let id = {
                        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
                        *next += 1;
                        *next
                    };
                    let future = make().boxed().shared();
                    *slot = Some(Flight {
                        key,
                        id,
                        future: future.clone(),
                    });
                    (id, future)
                }
            }
        };

        let output = future.await;

        // First finisher empties the slot; later joiners already hold a clone
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }

        output
    }

    /// Whether an operation is currently registered
    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
