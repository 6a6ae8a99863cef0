// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;

use civet_err::{Error, Result};

/// Fields of interest from the single space-separated line of
/// `/proc/<pid>/stat`: field 1 is the executable name in parentheses, 2 the
/// scheduler state letter, 13 and 14 the user/system CPU time in clock
/// ticks, 23 the resident set size in pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStat {
    pub comm: String,
    pub state: char,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub rss_pages: i64,
}

impl ProcessStat {
    pub fn read(pid: i32) -> Result<Self> {
        Self::parse(&fs::read_to_string(format!("/proc/{pid}/stat"))?)
    }

    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let field = |index: usize| {
            fields
                .get(index)
                .copied()
                .ok_or_else(|| Error::InvalidInput(format!("stat field {index} missing")))
        };
        let number = |index: usize| {
            field(index)?.parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("stat field {index} is not a tick count"))
            })
        };

        Ok(Self {
            comm: field(1)?.trim_matches(['(', ')']).to_string(),
            state: field(2)?
                .chars()
                .next()
                .ok_or_else(|| Error::InvalidInput("empty state field".to_string()))?,
            utime_ticks: number(13)?,
            stime_ticks: number(14)?,
            rss_pages: field(23)?
                .parse()
                .map_err(|_| Error::InvalidInput("stat field 23 is not a page count".to_string()))?,
        })
    }

    pub fn utime_seconds(&self) -> f64 {
        self.utime_ticks as f64 / ticks_per_second()
    }

    pub fn stime_seconds(&self) -> f64 {
        self.stime_ticks as f64 / ticks_per_second()
    }
}

/// Context-switch counters scanned by key from the multi-line key/value
/// `/proc/<pid>/status` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

impl ProcessStatus {
    pub fn read(pid: i32) -> Result<Self> {
        Self::parse(&fs::read_to_string(format!("/proc/{pid}/status"))?)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut voluntary = None;
        let mut nonvoluntary = None;
        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("voluntary_ctxt_switches:"), Some(value)) => {
                    voluntary = value.parse().ok();
                }
                (Some("nonvoluntary_ctxt_switches:"), Some(value)) => {
                    nonvoluntary = value.parse().ok();
                }
                _ => {}
            }
        }

        match (voluntary, nonvoluntary) {
            (Some(voluntary_ctxt_switches), Some(nonvoluntary_ctxt_switches)) => Ok(Self {
                voluntary_ctxt_switches,
                nonvoluntary_ctxt_switches,
            }),
            _ => Err(Error::InvalidInput(
                "status file has no context-switch counters".to_string(),
            )),
        }
    }
}

/// Clock ticks per second as reported by the OS, for converting stat tick
/// counts into seconds.
pub fn ticks_per_second() -> f64 {
    // SAFETY: sysconf reads a system constant and touches no memory.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0
    }
}

/// A PID string must be all digits and fit a positive i32.
pub fn parse_pid(text: &str) -> Result<i32> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!("{text:?} is not a PID")));
    }

    match text.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(Error::InvalidInput(format!("PID {text} out of range"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_LINE: &str = "1234 (cat) R 1 1234 1234 0 -1 4194304 123 0 0 0 \
                             5 3 0 0 20 0 1 0 8765 4321000 42 18446744073709551615 1 1 0 0";

    #[test]
    fn parses_stat_fields_by_index() {
        let stat = ProcessStat::parse(STAT_LINE).unwrap();
        assert_eq!(stat.comm, "cat");
        assert_eq!(stat.state, 'R');
        assert_eq!(stat.utime_ticks, 5);
        assert_eq!(stat.stime_ticks, 3);
        assert_eq!(stat.rss_pages, 42);
    }

    #[test]
    fn rejects_truncated_stat_lines() {
        assert!(ProcessStat::parse("1234 (cat) R 1").is_err());
    }

    #[test]
    fn tick_counts_convert_to_seconds() {
        let stat = ProcessStat::parse(STAT_LINE).unwrap();
        let ticks = ticks_per_second();
        assert!((stat.utime_seconds() - 5.0 / ticks).abs() < 1e-12);
        assert!((stat.stime_seconds() - 3.0 / ticks).abs() < 1e-12);
    }

    #[test]
    fn scans_status_for_context_switches() {
        let status = ProcessStatus::parse(
            "Name:\tcat\nState:\tR (running)\nvoluntary_ctxt_switches:\t17\n\
             nonvoluntary_ctxt_switches:\t4\n",
        )
        .unwrap();
        assert_eq!(status.voluntary_ctxt_switches, 17);
        assert_eq!(status.nonvoluntary_ctxt_switches, 4);
    }

    #[test]
    fn status_without_counters_is_an_error() {
        assert!(ProcessStatus::parse("Name:\tcat\n").is_err());
    }

    #[test]
    fn own_process_is_readable() {
        let pid = std::process::id() as i32;
        let stat = ProcessStat::read(pid).unwrap();
        assert!(!stat.comm.is_empty());
        ProcessStatus::read(pid).unwrap();
    }

    #[test]
    fn pid_strings_validate_strictly() {
        assert_eq!(parse_pid("42").unwrap(), 42);
        assert!(parse_pid("").is_err());
        assert!(parse_pid("-1").is_err());
        assert!(parse_pid("12x").is_err());
        assert!(parse_pid("0").is_err());
        assert!(parse_pid("99999999999999999999").is_err());
    }
}
