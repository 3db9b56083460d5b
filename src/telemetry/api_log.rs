//! API call log file.
//!
//! `apicall.<world>.<mission>.<ao_index>.<iso_timestamp>.log`: one header,
//! N request/response blocks delimited by `===` lines, one footer. Block
//! metadata lines are `Key: Value`; request and response bodies are JSON.
//! Flushed on block boundaries.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info};

use crate::types::TokenUsage;

pub struct ApiCallLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    blocks: u64,
}

impl ApiCallLog {
    /// Open the log for an AO and write the header. Failure degrades to a
    /// no-op logger.
    pub fn open(dir: &Path, world: &str, mission: &str, ao_index: u32) -> Self {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let name = format!(
            "apicall.{}.{}.{}.{}.log",
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
                    "=== BATCOM API CALL LOG ===\nWorld: {world}\nMission: {mission}\nAO-Index: {ao_index}\nOpened: {}\n\n",
                    Utc::now().to_rfc3339()
                );
                if let Err(e) = writer.write_all(header.as_bytes()) {
                    error!(path = %path.display(), error = %e, "API log header write failed");
                }
                Some(writer)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not open API call log, continuing without");
                None
            }
        };

        info!(path = %path.display(), "API call log opened");
        Self {
            writer,
            path,
            blocks: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one request/response pair as a self-delimited block.
    #[allow(clippy::too_many_arguments)]
    pub fn append_block(
        &mut self,
        cycle: u64,
        mission_time: f64,
        usage: &TokenUsage,
        request_json: &str,
        response_json: &str,
    ) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        self.blocks += 1;
        let block = format!(
            "===\nTimestamp: {}\nCycle: {cycle}\nMission-Time: {mission_time:.1}\nProvider: {}\nModel: {}\nInput-Tokens: {}\nOutput-Tokens: {}\nCached-Tokens: {}\nLatency-Ms: {}\nRequest:\n{request_json}\nResponse:\n{response_json}\n===\n\n",
            Utc::now().to_rfc3339(),
            usage.provider,
            usage.model,
            usage.input_tokens,
            usage.output_tokens,
            usage.cached_input_tokens,
            usage.latency_ms,
        );
        if let Err(e) = writer.write_all(block.as_bytes()).and_then(|_| writer.flush()) {
            error!(error = %e, "API log block write failed, disabling log");
            self.writer = None;
        }
    }

    /// Write the footer and close.
    pub fn close(mut self) {
        if let Some(mut writer) = self.writer.take() {
            let footer = format!(
                "=== LOG CLOSED ===\nClosed: {}\nBlocks: {}\n",
                Utc::now().to_rfc3339(),
                self.blocks
            );
            if let Err(e) = writer.write_all(footer.as_bytes()).and_then(|_| writer.flush()) {
                error!(error = %e, "API log footer write failed");
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
