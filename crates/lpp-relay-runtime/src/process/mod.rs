//! Correction client supervision and live reconfiguration.

mod reconfigure;
mod signal;
mod supervisor;

pub use reconfigure::{LoopState, ReconfigureLoop};
pub use signal::send_signal;
pub use supervisor::{ChildControl, LAUNCH_FAILED, ProcessState, ProcessSupervisor};
