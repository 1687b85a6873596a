//! Accelerator counters through `nvidia-smi`.

use super::{DeviceStats, TelemetryError};
use std::path::Path;
use std::process::Command;

const MIB: u64 = 1024 * 1024;

const QUERY: &str =
    "--query-gpu=index,memory.used,memory.total,utilization.gpu,utilization.memory";

/// Query every visible accelerator, ordered by device index.
pub fn query(smi: &Path) -> Result<Vec<DeviceStats>, TelemetryError> {
    let out = Command::new(smi)
        .arg(QUERY)
        .arg("--format=csv,noheader,nounits")
        .output()?;
    if !out.status.success() {
        return Err(TelemetryError::Command {
            program: smi.display().to_string(),
            status: out.status.to_string(),
        });
    }
    let stdout = std::str::from_utf8(&out.stdout)
        .map_err(|e| TelemetryError::Parse(e.to_string()))?;
    parse_query_output(stdout)
}

/// Parse `index, mem_used_mib, mem_total_mib, util_gpu, util_mem` lines.
pub fn parse_query_output(out: &str) -> Result<Vec<DeviceStats>, TelemetryError> {
    let mut rows = Vec::new();
    for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(TelemetryError::Parse(format!(
                "expected 5 fields, got {}: {line:?}",
                fields.len()
            )));
        }
        let index: usize = fields[0]
            .parse()
            .map_err(|_| TelemetryError::Parse(format!("bad device index {:?}", fields[0])))?;
        let mem_used = parse_mib(fields[1])?;
        let mem_total = parse_mib(fields[2])?;
        rows.push((
            index,
            DeviceStats {
                mem_used,
                mem_total,
                util_compute: parse_percent(fields[3]),
                util_mem: parse_percent(fields[4]),
            },
        ));
    }
    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, stats)| stats).collect())
}

fn parse_mib(field: &str) -> Result<u64, TelemetryError> {
    field
        .parse::<u64>()
        .map(|mib| mib * MIB)
        .map_err(|_| TelemetryError::Parse(format!("bad memory value {field:?}")))
}

// Utilization is reported as "[N/A]" on some boards.
fn parse_percent(field: &str) -> u32 {
    field.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_devices_sorted_by_index() {
        let out = "1, 2048, 24576, 80, 35\n0, 512, 24576, 5, 1\n";
        let devices = parse_query_output(out).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].mem_used, 512 * MIB);
        assert_eq!(devices[0].util_compute, 5);
        assert_eq!(devices[1].mem_used, 2048 * MIB);
        assert_eq!(devices[1].mem_total, 24576 * MIB);
        assert_eq!(devices[1].util_mem, 35);
    }

    #[test]
    fn test_parse_not_available_utilization() {
        let devices = parse_query_output("0, 10, 100, [N/A], [N/A]").unwrap();
        assert_eq!(devices[0].util_compute, 0);
        assert_eq!(devices[0].util_mem, 0);
    }

    #[test]
    fn test_parse_rejects_short_line() {
        assert!(parse_query_output("0, 10, 100").is_err());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_query_output("\n").unwrap().is_empty());
    }
}
