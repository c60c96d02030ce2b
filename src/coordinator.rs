//! Single-flight sensor read coordinator.
//!
//! A DHT data line sustains one transaction at a time; overlapping reads
//! corrupt each other. The coordinator collapses concurrent requests for the
//! same [`SensorIdentity`] into one physical read and hands the outcome,
//! success or failure, to every caller that arrived while it was in flight.
//!
//! Per identity the state is either idle (no entry) or in flight (one entry).
//! The entry is removed when the physical read settles and before any waiter
//! observes the outcome, so the next request always starts a fresh read.

use crate::error::SensorReadFailed;
use crate::input::{PhysicalSensor, ReadError, Reading, SensorIdentity};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

type Outcome = Result<Reading, SensorReadFailed>;
type PendingRead = Shared<BoxFuture<'static, Outcome>>;

struct InFlightRead {
    /// Distinguishes successive flights of the same identity.
    flight_id: u64,
    pending: PendingRead,
}

type FlightMap = Arc<Mutex<HashMap<SensorIdentity, InFlightRead>>>;

/// Settles one flight: clears its map entry, then releases the waiters.
///
/// Owned by the spawned read task. If the task never completes (the physical
/// layer panics or the runtime drops the task) the entry is still cleared on
/// drop and the waiters see the sender go away.
struct Settle {
    flights: FlightMap,
    identity: SensorIdentity,
    flight_id: u64,
    tx: Option<oneshot::Sender<Result<Reading, ReadError>>>,
}

impl Settle {
    fn clear(&self) {
        let mut flights = self.flights.lock();
        if flights
            .get(&self.identity)
            .is_some_and(|f| f.flight_id == self.flight_id)
        {
            flights.remove(&self.identity);
        }
    }

    fn complete(mut self, outcome: Result<Reading, ReadError>) {
        self.clear();
        if let Some(tx) = self.tx.take() {
            // Every waiter may already be gone; nothing to deliver then.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Serializes physical sensor access per identity and fans out results.
///
/// Cloning is cheap; clones share the same in-flight state.
#[derive(Clone)]
pub struct Coordinator {
    sensor: Arc<dyn PhysicalSensor>,
    flights: FlightMap,
    next_flight_id: Arc<AtomicU64>,
}

impl Coordinator {
    pub fn new(sensor: Arc<dyn PhysicalSensor>) -> Self {
        Self {
            sensor,
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_flight_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read `identity`, sharing any physical read already in flight for it.
    ///
    /// Must be called from within a tokio runtime. The physical read runs as
    /// its own task, so dropping this future does not cancel it for others.
    pub async fn request(&self, identity: SensorIdentity) -> Result<Reading, SensorReadFailed> {
        let (pending, settle) = {
            let mut flights = self.flights.lock();
            match flights.get(&identity) {
                Some(flight) => {
                    debug!(
                        "Attaching to in-flight read #{} of {}",
                        flight.flight_id, identity
                    );
                    (flight.pending.clone(), None)
                }
                None => {
                    let (flight, settle) = self.new_flight(identity);
                    let pending = flight.pending.clone();
                    flights.insert(identity, flight);
                    (pending, Some(settle))
                }
            }
        };

        // Spawned outside the lock: a task dropped on spawn runs Settle::drop,
        // which takes the lock again.
        if let Some(settle) = settle {
            let sensor = self.sensor.clone();
            tokio::spawn(async move {
                let outcome = sensor.read(settle.identity).await;
                settle.complete(outcome);
            });
        }

        pending.await
    }

    /// Whether a physical read for `identity` is currently in flight.
    pub fn in_flight(&self, identity: SensorIdentity) -> bool {
        self.flights.lock().contains_key(&identity)
    }

    /// Number of identities with a physical read in flight.
    pub fn in_flight_count(&self) -> usize {
        self.flights.lock().len()
    }

    /// Total physical reads started by this coordinator.
    pub fn physical_reads(&self) -> u64 {
        self.next_flight_id.load(Ordering::SeqCst)
    }

    fn new_flight(&self, identity: SensorIdentity) -> (InFlightRead, Settle) {
        let flight_id = self.next_flight_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting physical read #{} of {}", flight_id, identity);

        let (tx, rx) = oneshot::channel();
        let pending = async move {
            let outcome = match rx.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Physical read #{} of {} ended without an outcome",
                        flight_id, identity
                    );
                    Err(ReadError::Aborted("sensor task ended without an outcome".into()))
                }
            };
            outcome.map_err(|cause| SensorReadFailed::new(identity, cause))
        }
        .boxed()
        .shared();

        let settle = Settle {
            flights: self.flights.clone(),
            identity,
            flight_id,
            tx: Some(tx),
        };
        (InFlightRead { flight_id, pending }, settle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SensorKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Physical layer stand-in that counts reads and can hold them open.
    struct MockSensor {
        calls: AtomicUsize,
        gate: Option<Semaphore>,
        script: Mutex<VecDeque<Result<Reading, ReadError>>>,
        panic_next: Mutex<bool>,
    }

    impl MockSensor {
        fn immediate() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                script: Mutex::new(VecDeque::new()),
                panic_next: Mutex::new(false),
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::immediate()
            }
        }

        fn push(&self, outcome: Result<Reading, ReadError>) {
            self.script.lock().push_back(outcome);
        }

        fn release(&self, reads: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(reads);
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn wait_started(&self, reads: usize) {
            while self.calls() < reads {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl PhysicalSensor for MockSensor {
        async fn read(&self, _identity: SensorIdentity) -> Result<Reading, ReadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if std::mem::take(&mut *self.panic_next.lock()) {
                panic!("sensor driver crashed");
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Ok(Reading::new(21.5, 46.0)))
        }
    }

    fn dht22_pin4() -> SensorIdentity {
        SensorIdentity::new(SensorKind::Dht22, 4)
    }

    fn setup(mock: MockSensor) -> (Arc<MockSensor>, Coordinator) {
        let mock = Arc::new(mock);
        let coordinator = Coordinator::new(mock.clone());
        (mock, coordinator)
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_read() {
        let (mock, coordinator) = setup(MockSensor::gated());
        let id = dht22_pin4();

        let (a, b, c, ()) = tokio::join!(
            coordinator.request(id),
            coordinator.request(id),
            coordinator.request(id),
            async {
                mock.wait_started(1).await;
                mock.release(1);
            }
        );

        assert_eq!(mock.calls(), 1);
        let expected = Reading::new(21.5, 46.0);
        assert_eq!(a.unwrap(), expected);
        assert_eq!(b.unwrap(), expected);
        assert_eq!(c.unwrap(), expected);
        assert_eq!(coordinator.physical_reads(), 1);
    }

    #[tokio::test]
    async fn test_late_caller_attaches_to_running_read() {
        let (mock, coordinator) = setup(MockSensor::gated());
        let id = dht22_pin4();

        let (first, late) = tokio::join!(coordinator.request(id), async {
            mock.wait_started(1).await;
            assert!(coordinator.in_flight(id));
            let late = coordinator.request(id);
            mock.release(1);
            late.await
        });

        assert_eq!(mock.calls(), 1);
        assert_eq!(first.unwrap(), late.unwrap());
    }

    #[tokio::test]
    async fn test_failure_fans_out_to_every_caller() {
        let (mock, coordinator) = setup(MockSensor::gated());
        let id = dht22_pin4();
        mock.push(Err(ReadError::Checksum));

        let (a, b, ()) = tokio::join!(coordinator.request(id), coordinator.request(id), async {
            mock.wait_started(1).await;
            mock.release(1);
        });

        assert_eq!(mock.calls(), 1);
        let expected = SensorReadFailed::new(id, ReadError::Checksum);
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn test_timeout_then_fresh_attempt() {
        let (mock, coordinator) = setup(MockSensor::immediate());
        let id = dht22_pin4();
        mock.push(Err(ReadError::Timeout));

        let err = coordinator.request(id).await.unwrap_err();
        assert_eq!(err.cause, ReadError::Timeout);
        assert!(!coordinator.in_flight(id));

        let reading = coordinator.request(id).await.unwrap();
        assert_eq!(reading, Reading::new(21.5, 46.0));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_settled_read_is_never_reused() {
        let (mock, coordinator) = setup(MockSensor::immediate());
        let id = dht22_pin4();
        mock.push(Ok(Reading::new(20.0, 40.0)));
        mock.push(Ok(Reading::new(20.5, 41.0)));

        assert_eq!(coordinator.request(id).await.unwrap(), Reading::new(20.0, 40.0));
        // Entry is gone by the time the first caller resumes.
        assert!(!coordinator.in_flight(id));
        assert_eq!(coordinator.request(id).await.unwrap(), Reading::new(20.5, 41.0));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_identities_do_not_share_flights() {
        let (mock, coordinator) = setup(MockSensor::gated());
        let pin4 = dht22_pin4();
        let pin17 = SensorIdentity::new(SensorKind::Dht11, 17);

        let (a, b, ()) = tokio::join!(coordinator.request(pin4), coordinator.request(pin17), async {
            mock.wait_started(2).await;
            assert_eq!(coordinator.in_flight_count(), 2);
            mock.release(2);
        });

        assert_eq!(mock.calls(), 2);
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_stick_flight() {
        let (mock, coordinator) = setup(MockSensor::gated());
        let id = dht22_pin4();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), coordinator.request(id)).await;
        assert!(timed_out.is_err());
        assert!(coordinator.in_flight(id));

        mock.release(1);
        while coordinator.in_flight(id) {
            tokio::task::yield_now().await;
        }

        mock.release(1);
        assert!(coordinator.request(id).await.is_ok());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_panicking_driver_settles_as_failure() {
        let (mock, coordinator) = setup(MockSensor::immediate());
        let id = dht22_pin4();
        *mock.panic_next.lock() = true;

        let err = coordinator.request(id).await.unwrap_err();
        assert!(matches!(err.cause, ReadError::Aborted(_)));
        assert!(!coordinator.in_flight(id));

        tokio_test::assert_ok!(coordinator.request(id).await);
        assert_eq!(mock.calls(), 2);
    }
}
