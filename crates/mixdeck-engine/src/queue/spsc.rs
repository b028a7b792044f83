//! Lock-free bounded queue for exactly one producer and one consumer.
//!
//! Commands flow from the control thread to the engine thread over this
//! queue, replies flow back over a second one, and the async codec workers
//! move frames through it as well.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Storage shared by the two halves.
///
/// Backed by `capacity + 1` slots so that `next(write) == read` always means
/// full and `write == read` always means empty.
struct Shared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next slot to read. Only the consumer stores it.
    read: AtomicUsize,
    /// Next slot to write. Only the producer stores it.
    write: AtomicUsize,
}

impl<T> Shared<T> {
    fn new(capacity: usize) -> Self {
        let slots = (0..=capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        }
    }

    const fn next(&self, index: usize) -> usize {
        if index + 1 >= self.slots.len() {
            0
        } else {
            index + 1
        }
    }

    fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.slots.len() - read + write
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut read = *self.read.get_mut();
        let write = *self.write.get_mut();
        while read != write {
            // SAFETY: every slot in read..write was initialized by a push and
            // not yet moved out by a pop; we have exclusive access in drop.
            #[allow(unsafe_code)]
            unsafe {
                self.slots[read].get_mut().assume_init_drop();
            }
            read = self.next(read);
        }
    }
}

// SAFETY: the producer only touches the slot at `write` before publishing it
// with a release store, and the consumer only touches the slot at `read`
// after observing that store with an acquire load. No slot is accessed by
// both halves at once, so sharing the storage is sound when T is Send.
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for Shared<T> {}
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for Shared<T> {}

/// Writing half of the queue.
///
/// Not `Clone` and not `Sync`: there is exactly one producer, used from one
/// thread at a time.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

/// Reading half of the queue.
///
/// Not `Clone` and not `Sync`: there is exactly one consumer, used from one
/// thread at a time.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

/// Create a queue holding at most `capacity` elements.
///
/// A zero capacity is raised to one.
pub fn spsc_queue<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared::new(capacity.max(1)));
    (
        Producer {
            shared: Arc::clone(&shared),
            _not_sync: PhantomData,
        },
        Consumer {
            shared,
            _not_sync: PhantomData,
        },
    )
}

impl<T: Send> Producer<T> {
    /// Push without blocking. Hands the value back if the queue is full.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let write = self.shared.write.load(Ordering::Relaxed);
        let next = self.shared.next(write);
        if next == self.shared.read.load(Ordering::Acquire) {
            return Err(value);
        }

        // SAFETY: the slot at `write` is outside read..write, so the consumer
        // never reads it until the release store below publishes it.
        #[allow(unsafe_code)]
        unsafe {
            (*self.shared.slots[write].get()).write(value);
        }

        self.shared.write.store(next, Ordering::Release);
        Ok(())
    }

    /// Spin, yielding the thread, until there is room, then push.
    pub fn wait_and_push(&self, mut value: T) {
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(rejected) => {
                    value = rejected;
                    thread::yield_now();
                }
            }
        }
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len() - 1
    }
}

impl<T: Send> Consumer<T> {
    /// Pop without blocking. `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let read = self.shared.read.load(Ordering::Relaxed);
        if read == self.shared.write.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the acquire load above observed the producer's release
        // store, so the slot at `read` is initialized and owned by us until
        // we advance `read`.
        #[allow(unsafe_code)]
        let value = unsafe { (*self.shared.slots[read].get()).assume_init_read() };

        self.shared
            .read
            .store(self.shared.next(read), Ordering::Release);
        Some(value)
    }

    /// Spin, yielding the thread, until an element is available.
    pub fn wait_and_pop(&self) -> T {
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            thread::yield_now();
        }
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len() - 1
    }
}
