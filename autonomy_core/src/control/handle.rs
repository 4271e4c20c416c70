// autonomy_core/src/control/handle.rs

use std::sync::{Arc, Mutex, TryLockError};

use crate::clock::{Clock, SystemClock};
use crate::control::FlightController;
use crate::error::AutonomyError;
use crate::link::VehicleLink;
use crate::messages::{ControlData, Telemetry};

/// What happened to a delivered telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The sample ran a full tick.
    Processed(Option<ControlData>),
    /// A tick was already in flight; the sample was dropped.
    Dropped,
}

/// Shared access to a [`FlightController`] from telemetry and command sources.
///
/// Telemetry never queues behind a running tick. A sample that arrives while
/// the controller is busy is dropped, and the next one supersedes it.
pub struct ControllerHandle<L: VehicleLink, C: Clock = SystemClock> {
    inner: Arc<Mutex<FlightController<L, C>>>,
}

impl<L: VehicleLink, C: Clock> Clone for ControllerHandle<L, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: VehicleLink, C: Clock> ControllerHandle<L, C> {
    pub fn new(controller: FlightController<L, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Runs one tick for `telemetry` unless another tick holds the controller.
    pub fn deliver(&self, telemetry: &Telemetry) -> Result<Delivery, AutonomyError> {
        match self.inner.try_lock() {
            Ok(mut controller) => controller.on_telemetry(telemetry).map(Delivery::Processed),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("controller busy, telemetry sample dropped");
                Ok(Delivery::Dropped)
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned
                .into_inner()
                .on_telemetry(telemetry)
                .map(Delivery::Processed),
        }
    }

    /// Runs `f` with exclusive access, waiting for any tick in flight.
    pub fn with<R>(&self, f: impl FnOnce(&mut FlightController<L, C>) -> R) -> R {
        let mut controller = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut controller)
    }
}
