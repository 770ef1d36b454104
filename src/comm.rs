//! Collective operations across the processes sharing one grid.
//!
//! All methods are collective: every process must call them in the same order.

/// A group of processes taking part in a distributed solve.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn all_reduce_sum(&self, value: f64) -> f64;

    fn all_reduce_max(&self, value: f64) -> f64;

    /// Returns true on every process if `flag` is true on any process.
    fn all_reduce_or(&self, flag: bool) -> bool;
}

/// The communicator of a single process.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfCommunicator;

impl Communicator for SelfCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_or(&self, flag: bool) -> bool {
        flag
    }
}
