//! Per-scope value caches.
//!
//! A [`CacheSlot`] holds at most one value for a singleton binding, or for a
//! context-scoped binding within one resolving context. The first resolution
//! computes the value; concurrent resolutions that arrive while it is still
//! pending share the same future, so the factory runs exactly once.
//!
//! Every cached state belongs to a binding generation. A caller resolving a
//! newer generation resets the slot; a caller still holding an older one
//! computes without caching. Each computation also carries an epoch, and
//! only the computation whose epoch is current may settle the slot, so a
//! result that arrives after [`CacheSlot::clear`] is dropped.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::resolution::ValueOrFuture;
use crate::value::BoundValue;

type SharedValue = Shared<BoxFuture<'static, Result<BoundValue>>>;

#[derive(Default)]
enum SlotState {
    #[default]
    Empty,
    /// A synchronous computation is running on `owner`.
    Computing { owner: ThreadId },
    Pending(SharedValue),
    Ready(BoundValue),
}

#[derive(Default)]
struct Slot {
    state: SlotState,
    generation: u64,
    epoch: u64,
}

#[derive(Default)]
struct SlotInner {
    slot: Mutex<Slot>,
    settled: Condvar,
}

impl SlotInner {
    /// Stores `next` if computation `epoch` still owns the slot.
    fn settle(&self, epoch: u64, next: SlotState) {
        let mut slot = self.slot.lock();
        if slot.epoch == epoch {
            slot.state = next;
        }
        drop(slot);
        self.settled.notify_all();
    }
}

/// Settles the slot back to empty if the computation unwinds.
struct Computation<'a> {
    inner: &'a SlotInner,
    epoch: u64,
    settled: bool,
}

impl Computation<'_> {
    fn settle(mut self, next: SlotState) {
        self.settled = true;
        self.inner.settle(self.epoch, next);
    }
}

impl Drop for Computation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.settle(self.epoch, SlotState::Empty);
        }
    }
}

/// A cache cell for one scoped value.
#[derive(Clone, Default)]
pub(crate) struct CacheSlot {
    inner: Arc<SlotInner>,
}

impl CacheSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The value cached for `generation`, if it is ready.
    pub(crate) fn peek(&self, generation: u64) -> Option<BoundValue> {
        let slot = self.inner.slot.lock();
        match &slot.state {
            SlotState::Ready(value) if slot.generation == generation => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns the cached value, or computes and caches it.
    ///
    /// The slot is not held while `compute` runs. Callers from other threads
    /// wait for a synchronous computation to settle; a nested call from the
    /// computing thread itself fails with [`Error::CircularDependency`]. A
    /// failed computation leaves the slot empty.
    pub(crate) fn get_or_compute<F>(
        &self,
        key: &str,
        generation: u64,
        compute: F,
    ) -> ValueOrFuture<BoundValue>
    where
        F: FnOnce() -> ValueOrFuture<BoundValue>,
    {
        let current = thread::current().id();
        let mut slot = self.inner.slot.lock();
        loop {
            if generation < slot.generation {
                // Resolved with a configuration that has since been replaced
                drop(slot);
                return compute();
            }
            if generation > slot.generation {
                slot.generation = generation;
                slot.epoch += 1;
                slot.state = SlotState::Empty;
            }
            let owner = match &slot.state {
                SlotState::Ready(value) => return ValueOrFuture::ready(value.clone()),
                SlotState::Pending(shared) => return ValueOrFuture::Pending(shared.clone().boxed()),
                SlotState::Computing { owner } => *owner,
                SlotState::Empty => break,
            };
            if owner == current {
                return ValueOrFuture::err(Error::CircularDependency {
                    path: vec![key.to_string(), key.to_string()],
                });
            }
            self.inner.settled.wait(&mut slot);
        }

        slot.epoch += 1;
        let epoch = slot.epoch;
        slot.state = SlotState::Computing { owner: current };
        drop(slot);

        let computation = Computation {
            inner: &self.inner,
            epoch,
            settled: false,
        };
        match compute() {
            ValueOrFuture::Ready(Ok(value)) => {
                tracing::debug!(key, "cached value");
                computation.settle(SlotState::Ready(value.clone()));
                ValueOrFuture::ready(value)
            }
            ValueOrFuture::Ready(Err(err)) => {
                computation.settle(SlotState::Empty);
                ValueOrFuture::err(err)
            }
            ValueOrFuture::Pending(fut) => {
                let weak = Arc::downgrade(&self.inner);
                let key = key.to_string();
                let shared = async move {
                    let result = fut.await;
                    if let Some(inner) = weak.upgrade() {
                        let next = match &result {
                            Ok(value) => {
                                tracing::debug!(key = %key, "cached value");
                                SlotState::Ready(value.clone())
                            }
                            Err(_) => SlotState::Empty,
                        };
                        inner.settle(epoch, next);
                    }
                    result
                }
                .boxed()
                .shared();
                computation.settle(SlotState::Pending(shared.clone()));
                ValueOrFuture::Pending(shared.boxed())
            }
        }
    }

    /// Drops any cached value and detaches any in-flight computation.
    pub(crate) fn clear(&self) {
        let mut slot = self.inner.slot.lock();
        slot.epoch += 1;
        slot.state = SlotState::Empty;
        drop(slot);
        self.inner.settled.notify_all();
    }

    #[cfg(test)]
    fn is_filled(&self) -> bool {
        matches!(&self.inner.slot.lock().state, SlotState::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sync_value_computed_once() {
        let slot = CacheSlot::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            ValueOrFuture::ready(BoundValue::new(7u32))
        };
        let a = slot.get_or_compute("k", 0, compute).into_sync("k").unwrap();
        let b = slot
            .get_or_compute("k", 0, || unreachable!("slot already filled"))
            .into_sync("k")
            .unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_filled());
        assert!(slot.peek(0).unwrap().ptr_eq(&a));
    }

    #[test]
    fn test_failure_leaves_slot_empty() {
        let slot = CacheSlot::new();
        let first = slot.get_or_compute("k", 0, || {
            ValueOrFuture::err(Error::UnboundKey { key: "k".into() })
        });
        assert!(first.into_sync("k").is_err());
        assert!(!slot.is_filled());
        let second = slot.get_or_compute("k", 0, || ValueOrFuture::ready(BoundValue::new(1u8)));
        assert!(second.into_sync("k").is_ok());
    }

    #[tokio::test]
    async fn test_pending_value_shared_between_callers() {
        let slot = CacheSlot::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let compute = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ValueOrFuture::pending(async {
                    tokio::task::yield_now().await;
                    Ok(BoundValue::new("v".to_string()))
                })
            }
        };
        let first = slot.get_or_compute("k", 0, compute);
        let second = slot.get_or_compute("k", 0, || unreachable!("computation in flight"));
        let (a, b) = futures::future::try_join(first.into_future(), second.into_future())
            .await
            .unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_filled());
    }

    #[tokio::test]
    async fn test_pending_failure_resets_slot() {
        let slot = CacheSlot::new();
        let failing = slot.get_or_compute("k", 0, || {
            ValueOrFuture::pending(async { Err(Error::UnboundKey { key: "k".into() }) })
        });
        assert!(failing.into_future().await.is_err());
        assert!(!slot.is_filled());
    }

    #[test]
    fn test_clear() {
        let slot = CacheSlot::new();
        let _ = slot.get_or_compute("k", 0, || ValueOrFuture::ready(BoundValue::new(1u8)));
        slot.clear();
        assert!(!slot.is_filled());
    }

    #[tokio::test]
    async fn test_cleared_slot_ignores_late_completion() {
        let slot = CacheSlot::new();
        let stale = slot.get_or_compute("k", 0, || {
            ValueOrFuture::pending(async {
                tokio::task::yield_now().await;
                Ok(BoundValue::new(1u8))
            })
        });
        slot.clear();
        let fresh = slot.get_or_compute("k", 0, || {
            ValueOrFuture::pending(async {
                tokio::task::yield_now().await;
                Err(Error::UnboundKey { key: "k".into() })
            })
        });
        assert!(stale.into_future().await.is_ok());
        assert!(!slot.is_filled());
        // The failing newer computation resets the slot, not the stale one
        assert!(fresh.into_future().await.is_err());
        let value = slot
            .get_or_compute("k", 0, || ValueOrFuture::ready(BoundValue::new(2u8)))
            .into_sync("k")
            .unwrap();
        assert_eq!(value.extract::<u8>("k").unwrap(), 2);
    }

    #[test]
    fn test_newer_generation_resets_slot() {
        let slot = CacheSlot::new();
        let _ = slot.get_or_compute("k", 1, || ValueOrFuture::ready(BoundValue::new(1u8)));
        assert!(slot.peek(2).is_none());
        let value = slot
            .get_or_compute("k", 2, || ValueOrFuture::ready(BoundValue::new(2u8)))
            .into_sync("k")
            .unwrap();
        assert_eq!(value.extract::<u8>("k").unwrap(), 2);

        // An older generation computes without touching the cache
        let stale = slot
            .get_or_compute("k", 1, || ValueOrFuture::ready(BoundValue::new(9u8)))
            .into_sync("k")
            .unwrap();
        assert_eq!(stale.extract::<u8>("k").unwrap(), 9);
        assert_eq!(slot.peek(2).unwrap().extract::<u8>("k").unwrap(), 2);
    }

    #[test]
    fn test_reentrant_computation_is_circular() {
        let slot = CacheSlot::new();
        let nested = slot.clone();
        let result = slot.get_or_compute("k", 0, || {
            match nested
                .get_or_compute("k", 0, || unreachable!("slot is computing"))
                .into_sync("k")
            {
                Err(err) => ValueOrFuture::err(err),
                Ok(value) => ValueOrFuture::ready(value),
            }
        });
        assert!(matches!(
            result.into_sync("k"),
            Err(Error::CircularDependency { path }) if path == vec!["k", "k"]
        ));
        assert!(!slot.is_filled());
    }

    #[test]
    fn test_other_thread_waits_for_sync_computation() {
        let slot = CacheSlot::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let worker = {
            let slot = slot.clone();
            let calls = calls.clone();
            std::thread::spawn(move || {
                slot.get_or_compute("k", 0, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    ValueOrFuture::ready(BoundValue::new(1u8))
                })
                .into_sync("k")
                .unwrap()
            })
        };
        started_rx.recv().unwrap();
        let waited = slot
            .get_or_compute("k", 0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                ValueOrFuture::ready(BoundValue::new(2u8))
            })
            .into_sync("k")
            .unwrap();
        let computed = worker.join().unwrap();
        assert!(waited.ptr_eq(&computed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
