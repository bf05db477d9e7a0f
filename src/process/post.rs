//! Power-on self-test.
//!
//! Runs every present driver's `init` once at cold start. With
//! best-effort enabled, a sensor that is simply not there is
//! descheduled (its action types get zero desirability) and the node
//! carries on degraded; any other failure, and any cellular failure
//! at all, is fatal: without the modem the node cannot deliver
//! anything it measures.

use log::warn;
use thiserror::Error;

use super::{lock, Drivers};
use crate::action::{ActionType, Registry};
use crate::driver::DriverError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum PostError {
    #[error("cellular modem failed self-test: {0}")]
    Cellular(DriverError),
    #[error("environment sensor failed self-test: {0}")]
    Environment(DriverError),
    #[error("light sensor failed self-test: {0}")]
    Light(DriverError),
    #[error("motion sensor failed self-test: {0}")]
    Motion(DriverError),
    #[error("position receiver failed self-test: {0}")]
    Position(DriverError),
    #[error("magnetic sensor failed self-test: {0}")]
    Magnetic(DriverError),
    #[error("ble scanner failed self-test: {0}")]
    Ble(DriverError),
}

pub fn power_on_self_test(
    drivers: &mut Drivers,
    registry: &mut Registry,
    best_effort: bool,
) -> Result<(), PostError> {
    if let Some(cell) = &drivers.cellular {
        lock(cell).init().map_err(PostError::Cellular)?;
    }

    macro_rules! check {
        ($field:ident, $variant:ident, $types:expr) => {
            if let Some(dev) = &drivers.$field {
                if let Err(e) = lock(dev).init() {
                    if best_effort && e == DriverError::DeviceNotPresent {
                        warn!("{} absent, descheduling", stringify!($field));
                        for ty in $types {
                            registry.set_desirability(ty, 0);
                        }
                    } else {
                        return Err(PostError::$variant(e));
                    }
                }
            }
        };
    }

    check!(
        environment,
        Environment,
        [
            ActionType::MeasureHumidity,
            ActionType::MeasurePressure,
            ActionType::MeasureTemperature,
        ]
    );
    check!(light, Light, [ActionType::MeasureLight]);
    check!(motion, Motion, [ActionType::MeasureOrientation]);
    check!(position, Position, [ActionType::MeasurePosition]);
    check!(magnetic, Magnetic, [ActionType::MeasureMagnetic]);
    check!(ble, Ble, [ActionType::MeasureBle]);

    // Arm the wake interrupts on the sensors that have them.
    if let Some(dev) = &drivers.motion {
        if let Err(e) = lock(dev).set_interrupt_enabled(true) {
            warn!("orientation interrupt: {}", e);
        }
    }
    if let Some(dev) = &drivers.magnetic {
        if let Err(e) = lock(dev).set_interrupt_enabled(true) {
            warn!("magnetic interrupt: {}", e);
        }
    }

    Ok(())
}
