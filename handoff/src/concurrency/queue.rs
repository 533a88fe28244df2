use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

/// Multi-producer multi-consumer FIFO queue with an optional capacity limit.
///
/// [`BoundedQueue::put`] waits while the queue holds `capacity` messages and
/// [`BoundedQueue::get`] waits while it is empty. A capacity of `0` makes the queue unbounded, in
/// which case `put` never waits.
///
/// Waiting is implemented with two fair semaphores: one permit in `available` per stored message,
/// and one permit in `free_slots` per free slot. Messages are stored in a [`VecDeque`] behind a
/// mutex which is only held for the push or pop itself, never across an await point.
pub struct BoundedQueue<T> {
    messages: Mutex<VecDeque<T>>,
    available: Semaphore,
    free_slots: Option<Semaphore>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` messages, `0` meaning unbounded.
    ///
    /// Nothing is allocated up front. Capacities above [`Semaphore::MAX_PERMITS`] are clamped to
    /// it, which no queue can reach in practice.
    pub fn new(capacity: usize) -> Self {
        let free_slots =
            (capacity > 0).then(|| Semaphore::new(capacity.min(Semaphore::MAX_PERMITS)));

        Self {
            messages: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
            free_slots,
            capacity,
        }
    }

    /// Creates a queue without a capacity limit.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Appends `message` at the tail, waiting for a free slot if the queue is full.
    pub async fn put(&self, message: T) {
        if let Some(free_slots) = &self.free_slots {
            acquire_one(free_slots).await;
        }

        self.lock().push_back(message);
        self.available.add_permits(1);
    }

    /// Removes and returns the head message, waiting until one is available.
    pub async fn get(&self) -> T {
        loop {
            acquire_one(&self.available).await;

            // Every permit of `available` is added after its message is pushed, so a consumer
            // holding one always finds a message.
            if let Some(message) = self.pop_front() {
                return message;
            }
        }
    }

    /// Removes and returns the head message if one is immediately available.
    pub fn try_get(&self) -> Option<T> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();

        self.pop_front()
    }

    /// Returns the number of messages currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether the queue currently stores no message.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity, `0` meaning unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns whether the queue has no capacity limit.
    pub fn is_unbounded(&self) -> bool {
        self.free_slots.is_none()
    }

    fn pop_front(&self) -> Option<T> {
        let message = self.lock().pop_front()?;
        if let Some(free_slots) = &self.free_slots {
            free_slots.add_permits(1);
        }

        Some(message)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // No code path can panic while holding the lock, but a poisoned queue is still
        // structurally valid so we keep using it.
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Takes one permit out of `semaphore` for good.
///
/// Queue semaphores are private and never closed, so acquiring cannot fail.
async fn acquire_one(semaphore: &Semaphore) {
    if let Ok(permit) = semaphore.acquire().await {
        permit.forget();
    }
}
