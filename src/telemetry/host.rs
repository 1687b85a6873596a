//! Host memory counters for unified-memory machines.

use super::{HostMemory, TelemetryError};

#[cfg(target_os = "linux")]
pub fn read() -> Result<HostMemory, TelemetryError> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;
    parse_meminfo(&meminfo)
}

#[cfg(target_os = "macos")]
pub fn read() -> Result<HostMemory, TelemetryError> {
    use std::process::Command;

    let memsize = Command::new("sysctl").args(["-n", "hw.memsize"]).output()?;
    let total = String::from_utf8_lossy(&memsize.stdout)
        .trim()
        .parse::<u64>()
        .map_err(|e| TelemetryError::Parse(format!("hw.memsize: {e}")))?;
    let vm_stat = Command::new("vm_stat").output()?;
    parse_vm_stat(&String::from_utf8_lossy(&vm_stat.stdout), total)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn read() -> Result<HostMemory, TelemetryError> {
    Err(TelemetryError::Unsupported)
}

/// Used memory is everything that is not available for new allocations.
pub fn parse_meminfo(meminfo: &str) -> Result<HostMemory, TelemetryError> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key {
            "MemTotal" => total = Some(kib * 1024),
            "MemAvailable" => available = Some(kib * 1024),
            _ => {}
        }
    }
    match (total, available) {
        (Some(total), Some(available)) => Ok(HostMemory {
            used: total.saturating_sub(available),
            total,
        }),
        _ => Err(TelemetryError::Parse(
            "MemTotal or MemAvailable missing from meminfo".to_string(),
        )),
    }
}

/// Used memory is active + wired + compressor pages.
pub fn parse_vm_stat(vm_stat: &str, total: u64) -> Result<HostMemory, TelemetryError> {
    let mut lines = vm_stat.lines();
    let page_size = lines
        .next()
        .and_then(|header| {
            header
                .split("page size of ")
                .nth(1)?
                .split_whitespace()
                .next()?
                .parse::<u64>()
                .ok()
        })
        .ok_or_else(|| TelemetryError::Parse("vm_stat page size header".to_string()))?;

    let mut pages = 0u64;
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if matches!(
            key.trim(),
            "Pages active" | "Pages wired down" | "Pages occupied by compressor"
        ) {
            let count = value
                .trim()
                .trim_end_matches('.')
                .parse::<u64>()
                .map_err(|e| TelemetryError::Parse(format!("{key}: {e}")))?;
            pages += count;
        }
    }
    Ok(HostMemory {
        used: (pages * page_size).min(total),
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16384000 kB\n\
                       MemFree:         1000000 kB\n\
                       MemAvailable:    4096000 kB\n\
                       Buffers:          100000 kB\n";
        let mem = parse_meminfo(meminfo).unwrap();
        assert_eq!(mem.total, 16384000 * 1024);
        assert_eq!(mem.used, (16384000 - 4096000) * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_available() {
        assert!(parse_meminfo("MemTotal: 10 kB\n").is_err());
    }

    #[test]
    fn test_parse_vm_stat() {
        let out = "Mach Virtual Memory Statistics: (page size of 16384 bytes)\n\
                   Pages free:                               10000.\n\
                   Pages active:                            200000.\n\
                   Pages inactive:                          150000.\n\
                   Pages wired down:                        100000.\n\
                   Pages occupied by compressor:             50000.\n";
        let mem = parse_vm_stat(out, 17_179_869_184).unwrap();
        assert_eq!(mem.used, 350000 * 16384);
        assert_eq!(mem.total, 17_179_869_184);
    }

    #[test]
    fn test_parse_vm_stat_bad_header() {
        assert!(parse_vm_stat("garbage\n", 1).is_err());
    }
}
