//! Sweep checkpoint persistence port.

use crate::domain::error::AlgotronError;
use crate::domain::sweep::SweepRecord;

pub trait CheckpointPort {
    /// Every record written so far, in write order.
    fn load(&self) -> Result<Vec<SweepRecord>, AlgotronError>;

    /// Durably record one completed combination.
    fn append(&mut self, record: &SweepRecord) -> Result<(), AlgotronError>;
}
