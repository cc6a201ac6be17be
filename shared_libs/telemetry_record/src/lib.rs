/*
Telemetry record streamed from the Simulink driver blocks to the GUI once per tick, and the
single double the GUI sends back.

Wire layout is positional with no header, length prefix or version:
    [debug, V1, V2, V3, I1, I2, I3, f0_V1, f0_V2, f0_V3, f0_I1, f0_I2, f0_I3]
13 doubles in the host's native byte order (104 bytes). The reply is one native-endian double.
*/
use common::constants::{F64_SIZE, RECORD_LEN, RECORD_SIZE, REPLY_SIZE};
use common::RecordField;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// One tick worth of instrumentation data
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub debug: f64,
    /// Instantaneous channel 1..3 voltages
    pub voltages: [f64; 3],
    /// Instantaneous channel 1..3 currents
    pub currents: [f64; 3],
    /// Computed fundamental frequency of each voltage channel
    pub f0_voltages: [f64; 3],
    /// Computed fundamental frequency of each current channel
    pub f0_currents: [f64; 3],
}

impl TelemetryRecord {
    pub fn new(
        debug: f64,
        voltages: [f64; 3],
        currents: [f64; 3],
        f0_voltages: [f64; 3],
        f0_currents: [f64; 3],
    ) -> Self {
        TelemetryRecord {
            debug,
            voltages,
            currents,
            f0_voltages,
            f0_currents,
        }
    }

    /// Build from the 13 values in wire order.
    pub fn from_values(values: [f64; RECORD_LEN]) -> Self {
        let mut record = TelemetryRecord::default();
        for (field, value) in fields().zip(values) {
            record.set(field, value);
        }
        record
    }

    /// The 13 values in wire order.
    pub fn values(&self) -> [f64; RECORD_LEN] {
        let mut values = [0.0; RECORD_LEN];
        for field in fields() {
            values[field.index()] = self.get(field);
        }
        values
    }

    pub fn get(&self, field: RecordField) -> f64 {
        *self.slot(field)
    }

    pub fn set(&mut self, field: RecordField, value: f64) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: RecordField) -> &f64 {
        use RecordField::*;
        match field {
            Debug => &self.debug,
            V1 => &self.voltages[0],
            V2 => &self.voltages[1],
            V3 => &self.voltages[2],
            I1 => &self.currents[0],
            I2 => &self.currents[1],
            I3 => &self.currents[2],
            F0V1 => &self.f0_voltages[0],
            F0V2 => &self.f0_voltages[1],
            F0V3 => &self.f0_voltages[2],
            F0I1 => &self.f0_currents[0],
            F0I2 => &self.f0_currents[1],
            F0I3 => &self.f0_currents[2],
        }
    }

    fn slot_mut(&mut self, field: RecordField) -> &mut f64 {
        use RecordField::*;
        match field {
            Debug => &mut self.debug,
            V1 => &mut self.voltages[0],
            V2 => &mut self.voltages[1],
            V3 => &mut self.voltages[2],
            I1 => &mut self.currents[0],
            I2 => &mut self.currents[1],
            I3 => &mut self.currents[2],
            F0V1 => &mut self.f0_voltages[0],
            F0V2 => &mut self.f0_voltages[1],
            F0V3 => &mut self.f0_voltages[2],
            F0I1 => &mut self.f0_currents[0],
            F0I2 => &mut self.f0_currents[1],
            F0I3 => &mut self.f0_currents[2],
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        for (chunk, value) in bytes.chunks_exact_mut(F64_SIZE).zip(self.values()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordError::WrongLength {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        let mut values = [0.0; RECORD_LEN];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(F64_SIZE)) {
            *value = f64_from_ne_slice(chunk);
        }
        Ok(TelemetryRecord::from_values(values))
    }
}

fn fields() -> impl Iterator<Item = RecordField> {
    use strum::IntoEnumIterator;
    RecordField::iter()
}

fn f64_from_ne_slice(chunk: &[u8]) -> f64 {
    let mut raw = [0u8; F64_SIZE];
    raw.copy_from_slice(chunk);
    f64::from_ne_bytes(raw)
}

pub fn encode_reply(value: f64) -> [u8; REPLY_SIZE] {
    value.to_ne_bytes()
}

pub fn decode_reply(bytes: [u8; REPLY_SIZE]) -> f64 {
    f64::from_ne_bytes(bytes)
}
