//! Cached, line-oriented streams over periodically sampled sensors.
//!
//! A producer pushes raw samples into a [`SensorRecord`] from a path that
//! must never block; independent consumers each open a [`Channel`] bound to
//! one (sensor, measurement) pair and read newline-terminated fixed-point
//! text from it. A read at the start of a line blocks until a sample newer
//! than the channel's cached one exists, formats it once, then serves the
//! bytes out with auto-rewind at end of line.
//!
//! ```text
//! platform --publish--> SensorRecord --wake--> Channel::read --line--> consumer
//! ```

pub mod channel;
pub mod lookup;
pub mod record;
pub mod registry;

pub use channel::{Channel, ReadMode, ReadPass};
pub use lookup::{CalibrationTables, Lookup};
pub use record::SensorRecord;
pub use registry::SensorTable;

use thiserror::Error;

/// The measurement types a sensor reports.
///
/// The discriminants match the on-the-wire channel codes carried in the low
/// bits of a device minor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Measurement {
    Battery = 0,
    Temperature = 1,
    Light = 2,
}

impl Measurement {
    pub const COUNT: usize = 3;
    pub const ALL: [Measurement; Self::COUNT] =
        [Measurement::Battery, Measurement::Temperature, Measurement::Light];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Short name used in stream labels, e.g. `sensor0/temp`.
    pub fn label(self) -> &'static str {
        match self {
            Measurement::Battery => "batt",
            Measurement::Temperature => "temp",
            Measurement::Light => "light",
        }
    }
}

impl TryFrom<u8> for Measurement {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(Measurement::Battery),
            1 => Ok(Measurement::Temperature),
            2 => Ok(Measurement::Light),
            other => Err(Error::UnknownMeasurement(other)),
        }
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a channel operation can surface to the session layer.
///
/// The internal "cache already current" condition that drives the blocking
/// loop is absorbed before it gets here and never appears among these.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-blocking read and no sample newer than the cached one.
    #[error("no fresh sample available")]
    WouldBlock,
    /// A wait or lock acquisition was aborted by the interrupt signal.
    #[error("interrupted while waiting for a fresh sample")]
    Interrupted,
    /// The caller-provided output sink rejected the copy; the read cursor
    /// was not advanced.
    #[error("failed to copy cached line to output")]
    Fault(#[source] std::io::Error),
    /// No sensor is bound at this id.
    #[error("unknown sensor id {0}")]
    UnknownSensor(usize),
    /// A measurement code outside the known channel range.
    #[error("unknown measurement code {0}")]
    UnknownMeasurement(u8),
    /// The table's session budget is exhausted.
    #[error("too many open sessions")]
    SessionLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_codes_round_trip() {
        for m in Measurement::ALL {
            assert_eq!(Measurement::try_from(m as u8).unwrap(), m);
        }
    }

    #[test]
    fn out_of_range_measurement_code_is_rejected() {
        assert!(matches!(
            Measurement::try_from(7),
            Err(Error::UnknownMeasurement(7))
        ));
    }
}
