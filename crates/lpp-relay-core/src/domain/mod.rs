//! Domain types shared by every relay component.

mod cellular;
mod command;
mod parameters;
mod record;

pub use cellular::{CellularIdentity, Radio};
pub use command::{CellTarget, HotPatchCommand};
pub use parameters::{OutputMode, Parameters, ProtocolFormat, StartingCell, parse_flag_list};
pub use record::Record;
