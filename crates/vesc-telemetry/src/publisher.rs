use crate::snapshot::{ChangeSet, TelemetrySnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

/// Handle returned by [`TelemetryPublisher::subscribe`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

/// Consumer of snapshot updates.
///
/// Returning `Err` marks this delivery failed; the error is logged and
/// counted, and the remaining observers are still notified. Implemented for
/// any matching `FnMut` closure.
pub trait TelemetryObserver: Send {
    fn on_update(
        &mut self,
        snapshot: &TelemetrySnapshot,
        changed: &ChangeSet,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

impl<F> TelemetryObserver for F
where
    F: FnMut(&TelemetrySnapshot, &ChangeSet) -> Result<(), Box<dyn std::error::Error>> + Send,
{
    fn on_update(
        &mut self,
        snapshot: &TelemetrySnapshot,
        changed: &ChangeSet,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self(snapshot, changed)
    }
}

/// Holds the latest published snapshot and fans out change notifications.
///
/// Cloning is cheap and shares the same snapshot and registry. The receive
/// loop is the only caller of `publish`; any thread may `read` at any time
/// and gets a complete copy, never a torn one — the write lock is held only
/// for the swap itself, notifications run outside it.
#[derive(Clone, Default)]
pub struct TelemetryPublisher {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    snapshot: RwLock<TelemetrySnapshot>,
    subscribers: Mutex<Vec<(SubscriptionId, Box<dyn TelemetryObserver>)>>,
    next_id: AtomicU64,
    notify_errors: AtomicU64,
}

impl TelemetryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest published snapshot, by value.
    pub fn read(&self) -> TelemetrySnapshot {
        *self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, observer: Box<dyn TelemetryObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Remove a subscription; returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliveries that returned an error so far.
    pub fn notify_error_count(&self) -> u64 {
        self.inner.notify_errors.load(Ordering::Relaxed)
    }

    /// Replace the held snapshot and notify subscribers of the changes.
    ///
    /// An empty change set still replaces the snapshot (freshness stamps
    /// advance on repeats) but wakes nobody.
    pub fn publish(&self, snapshot: TelemetrySnapshot, changed: &ChangeSet) {
        {
            let mut slot = self
                .inner
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *slot = snapshot;
        }
        if changed.is_empty() {
            return;
        }
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, observer) in subscribers.iter_mut() {
            if let Err(err) = observer.on_update(&snapshot, changed) {
                self.inner.notify_errors.fetch_add(1, Ordering::Relaxed);
                warn!(subscription = id.0, error = %err, "telemetry subscriber failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::snapshot::Field;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn changed_rpm() -> ChangeSet {
        let mut changed = ChangeSet::default();
        changed.insert(Field::Rpm);
        changed
    }

    #[test]
    fn read_returns_latest_published() {
        let publisher = TelemetryPublisher::new();
        assert_eq!(publisher.read().rpm, 0);

        let mut snapshot = TelemetrySnapshot::new();
        snapshot.rpm = 4200;
        publisher.publish(snapshot, &changed_rpm());
        assert_eq!(publisher.read().rpm, 4200);
    }

    #[test]
    fn subscribers_see_each_change() {
        let publisher = TelemetryPublisher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = seen.clone();
        publisher.subscribe(Box::new(
            move |snapshot: &TelemetrySnapshot,
                  changed: &ChangeSet|
                  -> Result<(), Box<dyn std::error::Error>> {
                assert!(changed.contains(Field::Rpm));
                assert_eq!(snapshot.rpm, 4200);
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        ));

        let mut snapshot = TelemetrySnapshot::new();
        snapshot.rpm = 4200;
        publisher.publish(snapshot, &changed_rpm());
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn empty_changeset_skips_notification_but_stores() {
        let publisher = TelemetryPublisher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = seen.clone();
        publisher.subscribe(Box::new(
            move |_: &TelemetrySnapshot, _: &ChangeSet| -> Result<(), Box<dyn std::error::Error>> {
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        ));

        let mut snapshot = TelemetrySnapshot::new();
        snapshot.rpm = 17;
        publisher.publish(snapshot, &ChangeSet::default());
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        assert_eq!(publisher.read().rpm, 17);
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let publisher = TelemetryPublisher::new();
        publisher.subscribe(Box::new(
            |_: &TelemetrySnapshot, _: &ChangeSet| -> Result<(), Box<dyn std::error::Error>> {
                Err("observer exploded".into())
            },
        ));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = seen.clone();
        publisher.subscribe(Box::new(
            move |_: &TelemetrySnapshot, _: &ChangeSet| -> Result<(), Box<dyn std::error::Error>> {
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        ));

        for _ in 0..3 {
            publisher.publish(TelemetrySnapshot::new(), &changed_rpm());
        }
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert_eq!(publisher.notify_error_count(), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let publisher = TelemetryPublisher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = seen.clone();
        let id = publisher.subscribe(Box::new(
            move |_: &TelemetrySnapshot, _: &ChangeSet| -> Result<(), Box<dyn std::error::Error>> {
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        ));

        publisher.publish(TelemetrySnapshot::new(), &changed_rpm());
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(TelemetrySnapshot::new(), &changed_rpm());
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    /// Readers racing a publisher never observe a half-written snapshot.
    /// The writer keeps rpm and tachometer in lockstep; a torn read would
    /// break the equality.
    #[test]
    fn concurrent_reads_are_never_torn() {
        let publisher = TelemetryPublisher::new();
        let writer = {
            let publisher = publisher.clone();
            thread::spawn(move || {
                for i in 0..10_000i32 {
                    let mut snapshot = TelemetrySnapshot::new();
                    snapshot.rpm = i;
                    snapshot.tachometer = i;
                    snapshot.voltage = f64::from(i) * 0.1;
                    publisher.publish(snapshot, &changed_rpm());
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let snapshot = publisher.read();
                        assert_eq!(snapshot.rpm, snapshot.tachometer);
                        assert_eq!(snapshot.voltage, f64::from(snapshot.rpm) * 0.1);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
