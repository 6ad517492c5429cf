use std::fmt;
use std::io::{self, Write};

use prettytable::{Cell, Row, Table};
use serde::Serialize;

use crate::error::Result;
use crate::registry::{AllocationRecord, AllocationRegistry};
use crate::stats::HeapStats;

/// Output format for heap dumps and scans.
///
/// * `Table` - human-readable table (default)
/// * `Json` - compact JSON, one document per report
/// * `JsonPretty` - indented JSON
#[derive(Clone, Copy, Debug, Default)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

/// Which kind of heap produced a report.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Tracked,
    Untracked,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingMode::Tracked => write!(f, "tracked"),
            TrackingMode::Untracked => write!(f, "untracked"),
        }
    }
}

/// One live block as it appears in a report.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct BlockJson {
    pub address: String,
    pub size: usize,
    pub file: &'static str,
    pub line: u32,
}

impl From<&AllocationRecord> for BlockJson {
    fn from(record: &AllocationRecord) -> Self {
        Self {
            address: format!("{:#x}", record.address),
            size: record.size,
            file: record.site.file,
            line: record.site.line,
        }
    }
}

/// Everything a report needs, copied out under the heap lock so the sink
/// write happens with the lock released.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct HeapSnapshot {
    pub mode: TrackingMode,
    pub live_blocks: usize,
    pub current_size: usize,
    pub max_size: usize,
    pub tracked_bytes: usize,
    pub consistent: bool,
    pub blocks: Vec<BlockJson>,
}

impl HeapSnapshot {
    pub(crate) fn collect(
        mode: TrackingMode,
        registry: &AllocationRegistry,
        stats: &HeapStats,
    ) -> Self {
        let info = stats.snapshot();
        let tracked_bytes: usize = registry.iter().map(|record| record.size).sum();
        let blocks: Vec<BlockJson> = registry.iter().map(BlockJson::from).collect();

        Self {
            mode,
            live_blocks: blocks.len(),
            current_size: info.current_size,
            max_size: info.max_size,
            tracked_bytes,
            consistent: tracked_bytes == info.current_size,
            blocks,
        }
    }

    pub(crate) fn empty(mode: TrackingMode) -> Self {
        Self {
            mode,
            live_blocks: 0,
            current_size: 0,
            max_size: 0,
            tracked_bytes: 0,
            consistent: true,
            blocks: Vec::new(),
        }
    }
}

/// Scan payload - the snapshot's totals without per-block content.
#[derive(Serialize)]
struct ScanJson {
    mode: TrackingMode,
    live_blocks: usize,
    current_size: usize,
    max_size: usize,
    tracked_bytes: usize,
    consistent: bool,
}

impl From<&HeapSnapshot> for ScanJson {
    fn from(snapshot: &HeapSnapshot) -> Self {
        Self {
            mode: snapshot.mode,
            live_blocks: snapshot.live_blocks,
            current_size: snapshot.current_size,
            max_size: snapshot.max_size,
            tracked_bytes: snapshot.tracked_bytes,
            consistent: snapshot.consistent,
        }
    }
}

pub(crate) fn render_dump(
    snapshot: &HeapSnapshot,
    format: Format,
    sink: &mut dyn Write,
) -> Result<()> {
    match format {
        Format::Table => render_dump_table(snapshot, sink),
        Format::Json => render_json(snapshot, sink),
        Format::JsonPretty => render_json_pretty(snapshot, sink),
    }
}

pub(crate) fn render_scan(
    snapshot: &HeapSnapshot,
    format: Format,
    sink: &mut dyn Write,
) -> Result<()> {
    match format {
        Format::Table => {
            writeln!(sink, "[heapscope] {} heap scan", snapshot.mode)?;
            writeln!(
                sink,
                "live blocks: {} | current: {} | max: {} | tracked bytes: {} | consistent: {}",
                snapshot.live_blocks,
                format_bytes(snapshot.current_size as u64),
                format_bytes(snapshot.max_size as u64),
                snapshot.tracked_bytes,
                snapshot.consistent,
            )?;
            Ok(())
        }
        Format::Json => render_json(&ScanJson::from(snapshot), sink),
        Format::JsonPretty => render_json_pretty(&ScanJson::from(snapshot), sink),
    }
}

pub(crate) fn render_block(
    record: &AllocationRecord,
    format: Format,
    sink: &mut dyn Write,
) -> Result<()> {
    match format {
        Format::Table => {
            writeln!(
                sink,
                "block {:#x}: {} bytes, allocated at {}",
                record.address, record.size, record.site
            )?;
            Ok(())
        }
        Format::Json => render_json(&BlockJson::from(record), sink),
        Format::JsonPretty => render_json_pretty(&BlockJson::from(record), sink),
    }
}

fn render_dump_table(snapshot: &HeapSnapshot, sink: &mut dyn Write) -> Result<()> {
    writeln!(sink, "[heapscope] {} heap dump", snapshot.mode)?;
    writeln!(
        sink,
        "live blocks: {} | current: {} | max: {}",
        snapshot.live_blocks,
        format_bytes(snapshot.current_size as u64),
        format_bytes(snapshot.max_size as u64),
    )?;

    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("Address"),
        Cell::new("Size"),
        Cell::new("Allocated at"),
    ]));

    for block in &snapshot.blocks {
        table.add_row(Row::new(vec![
            Cell::new(&block.address),
            Cell::new(&block.size.to_string()),
            Cell::new(&format!("{}:{}", block.file, block.line)),
        ]));
    }

    let mut sink = sink;
    table.print(&mut sink)?;

    writeln!(
        sink,
        "tracked bytes: {} | consistent: {}",
        snapshot.tracked_bytes, snapshot.consistent
    )?;
    Ok(())
}

fn render_json<T: Serialize>(payload: &T, sink: &mut dyn Write) -> Result<()> {
    let json = serde_json::to_string(payload).map_err(io::Error::from)?;
    writeln!(sink, "{json}")?;
    Ok(())
}

fn render_json_pretty<T: Serialize>(payload: &T, sink: &mut dyn Write) -> Result<()> {
    let json = serde_json::to_string_pretty(payload).map_err(io::Error::from)?;
    writeln!(sink, "{json}")?;
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::CallSite;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(300), "300 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn test_snapshot_collects_registry_and_stats_consistently() {
        let mut registry = AllocationRegistry::new();
        let mut stats = HeapStats::default();
        for (address, size) in [(0x2000, 200), (0x1000, 100)] {
            registry
                .insert(AllocationRecord {
                    address,
                    size,
                    site: CallSite::new("a.c", 10),
                })
                .unwrap();
            stats.grow(size);
        }

        let snapshot = HeapSnapshot::collect(TrackingMode::Tracked, &registry, &stats);
        assert_eq!(snapshot.live_blocks, 2);
        assert_eq!(snapshot.current_size, 300);
        assert_eq!(snapshot.tracked_bytes, 300);
        assert!(snapshot.consistent);
        // Blocks come out in address order.
        assert_eq!(snapshot.blocks[0].address, "0x1000");
        assert_eq!(snapshot.blocks[1].address, "0x2000");
    }

    #[test]
    fn test_snapshot_flags_diverged_counters() {
        let mut registry = AllocationRegistry::new();
        let mut stats = HeapStats::default();
        registry
            .insert(AllocationRecord {
                address: 0x1000,
                size: 100,
                site: CallSite::new("a.c", 10),
            })
            .unwrap();
        stats.grow(150);

        let snapshot = HeapSnapshot::collect(TrackingMode::Tracked, &registry, &stats);
        assert_eq!(snapshot.tracked_bytes, 100);
        assert_eq!(snapshot.current_size, 150);
        assert!(!snapshot.consistent);
    }
}
