//! Raw resource snapshot as delivered by the engine's stats stream.
//!
//! Only the fields the telemetry pipeline reads are modelled. Every field is
//! optional so that sparse documents (a container without networking, a
//! cgroup driver that omits block I/O) still deserialize; unknown fields are
//! ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub memory_stats: MemoryStats,
    pub cpu_stats: CpuStats,
    /// Per-adapter counters keyed by interface name, ordered by name.
    pub networks: Option<BTreeMap<String, NetworkCounters>>,
    pub blkio_stats: BlkioStats,
    pub pids_stats: PidsStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    pub total_usage: Option<u64>,
    pub usage_in_kernelmode: Option<u64>,
    pub usage_in_usermode: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidsStats {
    pub current: Option<u64>,
}

impl StatsSnapshot {
    /// Counters of the first adapter by interface name.
    pub fn primary_network(&self) -> Option<(&str, &NetworkCounters)> {
        self.networks
            .as_ref()
            .and_then(|networks| networks.iter().next())
            .map(|(name, counters)| (name.as_str(), counters))
    }

    pub fn block_io_entries(&self) -> &[BlkioEntry] {
        self.blkio_stats
            .io_service_bytes_recursive
            .as_deref()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_engine_document() {
        let raw = r#"{
            "read": "2024-01-01T00:00:00Z",
            "pids_stats": {"current": 7, "limit": 100},
            "networks": {
                "eth1": {"rx_bytes": 10, "tx_bytes": 20, "rx_packets": 1},
                "eth0": {"rx_bytes": 2048, "tx_bytes": 1024}
            },
            "memory_stats": {"usage": 104857600, "limit": 209715200, "stats": {}},
            "blkio_stats": {"io_service_bytes_recursive": [
                {"major": 8, "minor": 0, "op": "Read", "value": 512},
                {"major": 8, "minor": 0, "op": "Write", "value": 256}
            ]},
            "cpu_stats": {
                "cpu_usage": {"total_usage": 500000, "usage_in_kernelmode": 200000, "usage_in_usermode": 300000},
                "system_cpu_usage": 10000000,
                "online_cpus": 2
            }
        }"#;

        let snapshot: StatsSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.memory_stats.usage, Some(104857600));
        assert_eq!(snapshot.cpu_stats.cpu_usage.usage_in_kernelmode, Some(200000));
        assert_eq!(snapshot.pids_stats.current, Some(7));
        assert_eq!(snapshot.block_io_entries().len(), 2);

        // Adapter order in the document does not matter
        let (name, counters) = snapshot.primary_network().unwrap();
        assert_eq!(name, "eth0");
        assert_eq!(counters.rx_bytes, 2048);
    }

    #[test]
    fn test_deserialize_sparse_document() {
        let snapshot: StatsSnapshot =
            serde_json::from_str(r#"{"blkio_stats": {"io_service_bytes_recursive": null}}"#)
                .unwrap();
        assert!(snapshot.primary_network().is_none());
        assert!(snapshot.block_io_entries().is_empty());
        assert_eq!(snapshot.memory_stats.limit, None);
    }
}
