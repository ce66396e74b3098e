//! The live scan: a state machine over one camera session, driven by a
//! sampling loop that runs until a code is recognized or the scan is stopped.

pub mod controller;
mod loop_worker;
pub mod state;

pub use controller::{ScanConfig, ScanController, SessionStats};
pub use state::ScanState;
