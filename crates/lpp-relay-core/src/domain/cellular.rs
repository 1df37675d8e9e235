//! Serving-cell identity reported by the modem.

use serde::Serialize;

/// Radio generation of the serving cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Radio {
    Lte,
    Nr,
}

impl Radio {
    pub const fn from_nr_flag(nr: bool) -> Self {
        if nr { Self::Nr } else { Self::Lte }
    }

    /// Single-letter code used by the client's control channel.
    pub const fn code(self) -> char {
        match self {
            Self::Lte => 'L',
            Self::Nr => 'N',
        }
    }
}

/// Immutable snapshot of the current serving cell.
///
/// Compared structurally on every poll; a difference is pushed to the
/// running client as a hot-patch command instead of a relaunch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellularIdentity {
    pub mcc: String,
    pub mnc: String,
    /// Tracking area code.
    pub tac: String,
    pub cell_id: String,
    pub imsi: String,
    /// Set only when MSISDN identity was explicitly requested.
    pub msisdn: Option<String>,
    /// True when the serving cell is 5G NR.
    pub nr: bool,
}

impl CellularIdentity {
    pub const fn radio(&self) -> Radio {
        Radio::from_nr_flag(self.nr)
    }

    /// Short form used in poll logging.
    pub fn summary(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.mcc, self.mnc, self.tac, self.cell_id, self.nr
        )
    }
}

impl Default for CellularIdentity {
    fn default() -> Self {
        Self {
            mcc: "000".to_string(),
            mnc: "000".to_string(),
            tac: "0".to_string(),
            cell_id: "0".to_string(),
            imsi: "0".to_string(),
            msisdn: None,
            nr: false,
        }
    }
}
