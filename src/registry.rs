//! Sensor table and session lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::channel::Channel;
use crate::lookup::Lookup;
use crate::record::SensorRecord;
use crate::{Error, Measurement};

/// Explicit table mapping opaque sensor ids to their records.
///
/// The table owns every [`SensorRecord`] for the life of the process and is
/// the boundary both collaborators go through: the platform producer calls
/// [`publish`](Self::publish), the session layer calls
/// [`open`](Self::open). Closing a session is dropping its [`Channel`].
pub struct SensorTable {
    sensors: Vec<Arc<SensorRecord>>,
    lookup: Arc<dyn Lookup>,
    stop: Option<async_broadcast::Receiver<()>>,
    slots: Arc<AtomicUsize>,
}

/// Borrowed place in the table's session budget; returned on drop.
pub(crate) struct SessionSlot(Arc<AtomicUsize>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl SensorTable {
    pub fn new(sensor_count: usize, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            sensors: (0..sensor_count)
                .map(|_| Arc::new(SensorRecord::new()))
                .collect(),
            lookup,
            stop: None,
            slots: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Make waits and lock acquisitions abort with
    /// [`Error::Interrupted`] once this broadcast fires.
    pub fn with_interrupt(mut self, stop: async_broadcast::Receiver<()>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Cap the number of concurrently open sessions.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.slots = Arc::new(AtomicUsize::new(limit));
        self
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Producer entry point: record a raw sample and wake blocked readers.
    pub fn publish(
        &self,
        sensor: usize,
        measurement: Measurement,
        raw: u16,
        stamp: u64,
    ) -> Result<(), Error> {
        let record = self
            .sensors
            .get(sensor)
            .ok_or(Error::UnknownSensor(sensor))?;
        record.publish(measurement, raw, stamp);
        Ok(())
    }

    /// Open a session on one (sensor, measurement) pair.
    ///
    /// The channel starts with an empty, always-stale cache; its first read
    /// will wait for a sample.
    pub fn open(&self, sensor: usize, measurement: Measurement) -> Result<Channel, Error> {
        let record = self
            .sensors
            .get(sensor)
            .ok_or(Error::UnknownSensor(sensor))?
            .clone();
        let slot = self.take_slot()?;
        log::debug!("opened session on sensor{sensor}/{measurement}");
        Ok(Channel::new(
            record,
            measurement,
            self.lookup.clone(),
            self.stop.clone(),
            Some(slot),
        ))
    }

    fn take_slot(&self) -> Result<SessionSlot, Error> {
        self.slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| Error::SessionLimit)?;
        Ok(SessionSlot(self.slots.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::CalibrationTables;

    fn table(sensors: usize) -> SensorTable {
        SensorTable::new(sensors, Arc::new(CalibrationTables))
    }

    #[test]
    fn unknown_sensor_id_is_rejected() {
        let table = table(2);
        assert!(matches!(
            table.open(2, Measurement::Battery),
            Err(Error::UnknownSensor(2))
        ));
        assert!(matches!(
            table.publish(9, Measurement::Battery, 0, 1),
            Err(Error::UnknownSensor(9))
        ));
    }

    #[test]
    fn session_limit_is_enforced_and_slots_are_returned() {
        let table = table(1).with_session_limit(1);
        let first = table.open(0, Measurement::Light).unwrap();
        assert!(matches!(
            table.open(0, Measurement::Temperature),
            Err(Error::SessionLimit)
        ));
        drop(first);
        assert!(table.open(0, Measurement::Temperature).is_ok());
    }

    #[test]
    fn channels_on_the_same_sensor_share_its_record() {
        let table = table(1);
        let a = table.open(0, Measurement::Temperature).unwrap();
        let b = table.open(0, Measurement::Temperature).unwrap();
        table.publish(0, Measurement::Temperature, 5, 3).unwrap();
        assert!(a.is_stale());
        assert!(b.is_stale());
    }
}
