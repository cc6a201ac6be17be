/*
Every position in the telemetry record the Simulink blocks stream to the GUI.
Discriminants are the position of the field on the wire, so both ends of the link share one definition.
*/
use strum::{Display, EnumCount, EnumIter, EnumString};

#[derive(EnumIter, EnumCount, Display, EnumString, PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum RecordField {
    /// Debug / tag value, usually the simulation time
    #[strum(serialize = "debug")]
    Debug = 0,
    V1 = 1,
    V2 = 2,
    V3 = 3,
    I1 = 4,
    I2 = 5,
    I3 = 6,
    /// Computed fundamental frequencies
    #[strum(serialize = "f0_V1")]
    F0V1 = 7,
    #[strum(serialize = "f0_V2")]
    F0V2 = 8,
    #[strum(serialize = "f0_V3")]
    F0V3 = 9,
    #[strum(serialize = "f0_I1")]
    F0I1 = 10,
    #[strum(serialize = "f0_I2")]
    F0I2 = 11,
    #[strum(serialize = "f0_I3")]
    F0I3 = 12,
}

impl RecordField {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset of the field inside an encoded record
    pub fn offset(self) -> usize {
        self.index() * crate::constants::F64_SIZE
    }
}
