//! Commands written to the running client's control channel.

use std::fmt;

use super::cellular::{CellularIdentity, Radio};

/// Cell fields carried by a cell-identity update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTarget {
    pub mcc: String,
    pub mnc: String,
    pub tac: String,
    pub cell_id: String,
}

/// Live reconfiguration command understood by the correction client.
///
/// Only the two cell-identity variants exist; the control protocol does
/// not document any others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotPatchCommand {
    /// `/CID,L,...` for an LTE serving cell.
    LteCell(CellTarget),
    /// `/CID,N,...` for an NR serving cell.
    NrCell(CellTarget),
}

impl HotPatchCommand {
    /// Pick the command variant matching the identity's radio generation.
    pub fn cell_update(identity: &CellularIdentity) -> Self {
        let target = CellTarget {
            mcc: identity.mcc.clone(),
            mnc: identity.mnc.clone(),
            tac: identity.tac.clone(),
            cell_id: identity.cell_id.clone(),
        };
        match identity.radio() {
            Radio::Lte => Self::LteCell(target),
            Radio::Nr => Self::NrCell(target),
        }
    }

    pub const fn radio(&self) -> Radio {
        match self {
            Self::LteCell(_) => Radio::Lte,
            Self::NrCell(_) => Radio::Nr,
        }
    }

    const fn target(&self) -> &CellTarget {
        match self {
            Self::LteCell(t) | Self::NrCell(t) => t,
        }
    }

    /// Bytes written to the child's stdin, CRLF terminated.
    pub fn to_wire(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }
}

impl fmt::Display for HotPatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.target();
        write!(
            f,
            "/CID,{},{},{},{},{}",
            self.radio().code(),
            t.mcc,
            t.mnc,
            t.tac,
            t.cell_id
        )
    }
}
