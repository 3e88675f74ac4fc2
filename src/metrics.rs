/*
 *  metrics.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Memory and host diagnostics read from /proc and /sys
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;
use std::fs;
use std::io;

/// Snapshot logged every few cycles. Zeroes mean the source was unreadable.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MachineMetrics {
    pub cpu_load: f64,
    pub cpu_temp: f64,
    pub up_time: f64,
    pub mem_total_kib: u64,
    pub mem_avail_kib: u64,
    pub mem_avail_pct: f64,
    /// Resident set of this process
    pub rss_kib: u64,
}

fn first_float(path: &str) -> io::Result<f64> {
    let content = fs::read_to_string(path)?;
    let first_word = content.split_whitespace().next().unwrap_or("0.0");
    first_word.parse::<f64>().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Value in kB of a `Key:   1234 kB` line, as found in meminfo and status.
pub fn kib_field(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

impl MachineMetrics {
    /// 1-minute load average as a percentage.
    fn cpu_load() -> f64 {
        first_float("/proc/loadavg").map_or(0.0, |l| 100.0 * l)
    }

    /// First thermal zone, millidegrees on disk.
    fn cpu_temp() -> f64 {
        first_float("/sys/class/thermal/thermal_zone0/temp").map_or(0.0, |m| m / 1000.0)
    }

    /// Hours since boot.
    fn up_time() -> f64 {
        first_float("/proc/uptime").map_or(0.0, |s| s / 3600.0)
    }

    pub fn from_meminfo(mut self, meminfo: &str) -> Self {
        self.mem_total_kib = kib_field(meminfo, "MemTotal").unwrap_or(0);
        self.mem_avail_kib = kib_field(meminfo, "MemAvailable").unwrap_or(0);
        self.mem_avail_pct = if self.mem_total_kib > 0 {
            100.0 * self.mem_avail_kib as f64 / self.mem_total_kib as f64
        } else {
            0.0
        };
        self
    }

    pub fn check() -> MachineMetrics {
        let mut metrics = MachineMetrics {
            cpu_load: Self::cpu_load(),
            cpu_temp: Self::cpu_temp(),
            up_time: Self::up_time(),
            ..Default::default()
        };
        if let Ok(meminfo) = fs::read_to_string("/proc/meminfo") {
            metrics = metrics.from_meminfo(&meminfo);
        }
        if let Ok(status) = fs::read_to_string("/proc/self/status") {
            metrics.rss_kib = kib_field(&status, "VmRSS").unwrap_or(0);
        }
        metrics
    }
}

impl fmt::Display for MachineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rss {} KiB, free {} MiB ({:.0}%), load {:.0}%, temp {:.1}C, up {:.1}h",
            self.rss_kib,
            self.mem_avail_kib / 1024,
            self.mem_avail_pct,
            self.cpu_load,
            self.cpu_temp,
            self.up_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:        3884132 kB\nMemFree:          301116 kB\nMemAvailable:    1942066 kB\n";

    #[test]
    fn test_meminfo_fields() {
        assert_eq!(kib_field(MEMINFO, "MemTotal"), Some(3884132));
        assert_eq!(kib_field(MEMINFO, "MemAvail"), None);
        let m = MachineMetrics::default().from_meminfo(MEMINFO);
        assert_eq!(m.mem_avail_pct.round(), 50.0);
    }

    #[test]
    fn test_empty_meminfo_is_zero() {
        let m = MachineMetrics::default().from_meminfo("");
        assert_eq!(m.mem_total_kib, 0);
        assert_eq!(m.mem_avail_pct, 0.0);
        assert!(m.to_string().starts_with("rss 0 KiB"));
    }
}
