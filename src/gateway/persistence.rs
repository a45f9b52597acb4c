//! # Gateway State File
//!
//! The gateway's identity, mode flags and device registry, persisted as
//! one JSON document:
//!
//! ```json
//! {
//!   "txid": "ff800000",
//!   "manufacturer_id": 2047,
//!   "eep": "A5-38-08",
//!   "acting": true,
//!   "learning": false,
//!   "devices": { "0580cc3a": { "eep": "A5-20-06", "manufacturer_id": 73, "setpoint": 21.0 } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enocean::protocol::{Eep, Txid, EEP_A5_38_08};
use crate::error::Result;
use crate::profiles::Device;

/// Everything the gateway persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfiguration {
    pub txid: Txid,
    pub manufacturer_id: u16,
    pub eep: Eep,
    #[serde(default)]
    pub acting: bool,
    #[serde(default)]
    pub learning: bool,
    #[serde(default)]
    pub devices: BTreeMap<Txid, Device>,
}

impl Default for GatewayConfiguration {
    fn default() -> Self {
        Self {
            txid: Txid(0xFF80_0000),
            manufacturer_id: 0x7FF,
            eep: EEP_A5_38_08,
            acting: false,
            learning: false,
            devices: BTreeMap::new(),
        }
    }
}

impl GatewayConfiguration {
    /// Load a state file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let configuration = serde_json::from_str(&text)?;
        debug!("Loaded gateway state from {}", path.as_ref().display());
        Ok(configuration)
    }

    /// Write the state file atomically
    ///
    /// The document goes to a sibling temporary file first, which is then
    /// renamed over `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        let mut file = fs::File::create(tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(tmp, path)?;

        debug!("Saved gateway state to {}", path.display());
        Ok(())
    }
}
