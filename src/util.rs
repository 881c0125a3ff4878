use anyhow::{anyhow, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};
use tokio::sync::Notify;

/// Single slot channel that only keeps the newest value.
///
/// Producers overwrite whatever the consumer hasn't picked up yet. The
/// consumer can wait for a value, take it without waiting or peek at it.
pub fn latest_value_channel<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let value = Arc::new(Mutex::new(None));
    let notify = Arc::new(Notify::new());
    let both_alive = Arc::new(AtomicBool::new(true));

    let sender = LatestSender {
        value: Arc::clone(&value),
        notify: Arc::clone(&notify),
        both_alive: Arc::clone(&both_alive),
    };
    let receiver = LatestReceiver {
        value,
        notify,
        both_alive,
    };
    (sender, receiver)
}

struct Slot<T> {
    value: T,
    received: Instant,
}

fn lock<T>(value: &Mutex<Option<Slot<T>>>) -> MutexGuard<'_, Option<Slot<T>>> {
    // a panicking producer can't leave the slot half written
    value.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LatestSender<T> {
    value: Arc<Mutex<Option<Slot<T>>>>,
    notify: Arc<Notify>,
    both_alive: Arc<AtomicBool>,
}

impl<T> LatestSender<T> {
    pub fn send(&self, value: T) -> Result<()> {
        if !self.both_alive.load(Ordering::SeqCst) {
            Err(anyhow!("Other end died"))
        } else {
            *lock(&self.value) = Some(Slot {
                value,
                received: Instant::now(),
            });
            self.notify.notify_one();
            Ok(())
        }
    }
}

impl<T> Drop for LatestSender<T> {
    fn drop(&mut self) {
        self.both_alive.store(false, Ordering::SeqCst);
        // stores a permit so a receiver about to wait still wakes up
        self.notify.notify_one()
    }
}

pub struct LatestReceiver<T> {
    value: Arc<Mutex<Option<Slot<T>>>>,
    notify: Arc<Notify>,
    both_alive: Arc<AtomicBool>,
}

impl<T> LatestReceiver<T> {
    /// Wait for the next value
    pub async fn recv(&self) -> Result<T> {
        loop {
            if let Some(value) = self.take() {
                return Ok(value);
            }
            if !self.both_alive.load(Ordering::SeqCst) {
                return Err(anyhow!("Sender died"));
            }
            self.notify.notified().await;
        }
    }

    /// Newest value if one arrived since the last take
    pub fn take(&self) -> Option<T> {
        lock(&self.value).take().map(|slot| slot.value)
    }

    pub fn is_alive(&self) -> bool {
        self.both_alive.load(Ordering::SeqCst)
    }
}

impl<T: Clone> LatestReceiver<T> {
    /// Newest value, left in place for the next reader
    pub fn latest(&self) -> Option<T> {
        lock(&self.value).as_ref().map(|slot| slot.value.clone())
    }

    /// Newest value unless it arrived more than `max_age` before `now`
    pub fn latest_at(&self, now: Instant, max_age: Duration) -> Option<T> {
        lock(&self.value)
            .as_ref()
            .filter(|slot| now.saturating_duration_since(slot.received) <= max_age)
            .map(|slot| slot.value.clone())
    }
}

impl<T> Drop for LatestReceiver<T> {
    fn drop(&mut self) {
        self.both_alive.store(false, Ordering::SeqCst);
    }
}
