//! Per-AO decision log file.
//!
//! One file per AO, opened at `commanderStartAO` and sealed with a footer
//! at `commanderEndAO`. Every decision cycle is appended as one JSON line
//! under a `Key: Value` metadata stanza. Telemetry is never on the critical
//! path: write failures are logged and ingestion continues.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info};

use crate::types::DecisionCycle;

pub struct AoLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl AoLog {
    /// Open `ao.<world>.<mission>.<index>.<timestamp>.log` under `dir` and
    /// write the header. Failure to open degrades to a no-op logger.
    pub fn open(dir: &Path, world: &str, mission: &str, ao_index: u32) -> Self {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let name = format!(
            "ao.{}.{}.{}.{}.log",
            sanitize(world),
            sanitize(mission),
            ao_index,
            stamp
        );
        let path = dir.join(name);

        let writer = match File::create(&path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                let header = format!(
                    "=== BATCOM AO LOG ===\nWorld: {world}\nMission: {mission}\nAO-Index: {ao_index}\nOpened: {}\n\n",
                    Utc::now().to_rfc3339()
                );
                if let Err(e) = writer.write_all(header.as_bytes()) {
                    error!(path = %path.display(), error = %e, "AO log header write failed");
                }
                Some(writer)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not open AO log, continuing without");
                None
            }
        };

        info!(path = %path.display(), "AO decision log opened");
        Self { writer, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one decision cycle.
    pub fn append_cycle(&mut self, cycle: &DecisionCycle) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let body = serde_json::to_string(cycle)
            .unwrap_or_else(|e| format!("{{\"serialize_error\":\"{e}\"}}"));
        let block = format!(
            "--- cycle {} ---\nMission-Time: {:.1}\nWall-Time: {}\n{body}\n\n",
            cycle.cycle_number,
            cycle.mission_time,
            cycle.wall_time.to_rfc3339()
        );
        if let Err(e) = writer.write_all(block.as_bytes()).and_then(|_| writer.flush()) {
            error!(error = %e, "AO log cycle write failed, disabling log");
            self.writer = None;
        }
    }

    /// Append model rationale when `log_thoughts_to_file` is set.
    pub fn append_thoughts(&mut self, cycle_number: u64, thoughts: &str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let block = format!("--- thoughts (cycle {cycle_number}) ---\n{thoughts}\n\n");
        if let Err(e) = writer.write_all(block.as_bytes()).and_then(|_| writer.flush()) {
            error!(error = %e, "AO log thoughts write failed, disabling log");
            self.writer = None;
        }
    }

    /// Write the footer and close the file.
    pub fn close(mut self, total_cycles: u64, total_orders: u64) {
        if let Some(mut writer) = self.writer.take() {
            let footer = format!(
                "=== AO SEALED ===\nClosed: {}\nTotal-Cycles: {total_cycles}\nTotal-Orders: {total_orders}\n",
                Utc::now().to_rfc3339()
            );
            if let Err(e) = writer.write_all(footer.as_bytes()).and_then(|_| writer.flush()) {
                error!(error = %e, "AO log footer write failed");
            }
        }
    }
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cycle(n: u64) -> DecisionCycle {
        DecisionCycle {
            cycle_number: n,
            mission_time: n as f64 * 30.0,
            wall_time: Utc::now(),
            commentary: "hold the line".to_string(),
            orders: vec![],
            rejected: vec![],
            active_objectives: vec![],
            failure_note: None,
        }
    }

    #[test]
    fn writes_header_cycles_and_footer() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AoLog::open(dir.path(), "Altis", "op anvil", 2);
        let path = log.path().to_path_buf();

        log.append_cycle(&cycle(1));
        log.append_cycle(&cycle(2));
        log.append_thoughts(2, "flank concerns");
        log.close(2, 5);

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("=== BATCOM AO LOG ==="));
        assert!(text.contains("--- cycle 1 ---"));
        assert!(text.contains("--- cycle 2 ---"));
        assert!(text.contains("flank concerns"));
        assert!(text.contains("=== AO SEALED ==="));
        assert!(text.contains("Total-Orders: 5"));
    }

    #[test]
    fn filename_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let log = AoLog::open(dir.path(), "Altis/We st", "op: anvil", 0);
        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ao.Altis_We_st.op__anvil.0."));
    }
}
