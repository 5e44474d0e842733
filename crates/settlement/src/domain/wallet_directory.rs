use std::collections::HashMap;
use tracing::warn;

/// A sensor and the ledger address its rewards are paid to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    pub sensor_id: String,
    pub address: String,
}

/// Static sensor id → settlement address mapping
///
/// Built once at startup and read-only afterwards. Lookups are
/// case-insensitive on the sensor id. Entries with a blank address are
/// dropped while building, so `resolve` never returns a blank address.
/// When the same sensor id appears twice the first entry wins.
#[derive(Debug, Clone, Default)]
pub struct WalletDirectory {
    entries: Vec<WalletEntry>,
    index: HashMap<String, usize>,
}

impl WalletDirectory {
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut directory = Self::default();

        for (sensor_id, address) in entries {
            let sensor_id = sensor_id.into().trim().to_string();
            let address = address.into().trim().to_string();

            if sensor_id.is_empty() || address.is_empty() {
                continue;
            }

            let key = sensor_id.to_lowercase();
            if directory.index.contains_key(&key) {
                warn!(sensor_id = %sensor_id, "duplicate wallet entry ignored");
                continue;
            }

            directory.index.insert(key, directory.entries.len());
            directory.entries.push(WalletEntry { sensor_id, address });
        }

        directory
    }

    /// Parse a flat `sensorId=address` list separated by commas
    ///
    /// Malformed items (no `=`) are skipped with a warning.
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| match item.split_once('=') {
                Some((sensor_id, address)) => Some((sensor_id, address)),
                None => {
                    warn!(item = %item, "wallet entry is not in sensorId=address form, skipping");
                    None
                }
            });

        Self::from_entries(pairs)
    }

    pub fn resolve(&self, sensor_id: &str) -> Option<&str> {
        self.index
            .get(&sensor_id.trim().to_lowercase())
            .map(|&position| self.entries[position].address.as_str())
    }

    /// Entries in configuration order
    pub fn entries(&self) -> &[WalletEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
