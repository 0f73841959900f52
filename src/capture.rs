// pcap-flowmeter/src/capture.rs
use chrono::{DateTime, Utc};
use pcap_file::pcap::PcapReader;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::absolutize;
use crate::error::{FlowmeterError, Result};

/// A capture produced by an external tool. Read-only from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub file_name: String,
    pub file_size: u64,
    pub packets: u64,
    pub total_bytes: u64,
    pub first_packet: Option<String>,
    pub last_packet: Option<String>,
    pub duration_seconds: f64,
}

impl CaptureFile {
    /// Wrap a path without touching the filesystem beyond a metadata lookup.
    pub fn new(path: PathBuf) -> Self {
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
        CaptureFile { path, modified }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Count packets and bytes of a classic pcap file.
    pub fn inspect(&self) -> std::result::Result<CaptureInfo, Box<dyn std::error::Error>> {
        let file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();

        let mut reader = PcapReader::new(file)?;
        let mut packets = 0u64;
        let mut total_bytes = 0u64;
        let mut start_time: Option<DateTime<Utc>> = None;
        let mut end_time: Option<DateTime<Utc>> = None;

        while let Some(pkt) = reader.next_packet() {
            let packet = pkt?;
            let timestamp = DateTime::from_timestamp(
                packet.timestamp.as_secs() as i64,
                packet.timestamp.subsec_nanos(),
            )
            .unwrap_or_else(Utc::now);

            start_time = Some(start_time.map_or(timestamp, |t| t.min(timestamp)));
            end_time = Some(end_time.map_or(timestamp, |t| t.max(timestamp)));

            packets += 1;
            total_bytes += packet.orig_len as u64;
        }

        let duration_seconds = match (start_time, end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        Ok(CaptureInfo {
            file_name: self.file_name(),
            file_size,
            packets,
            total_bytes,
            first_packet: start_time.map(|t| t.to_rfc3339()),
            last_packet: end_time.map(|t| t.to_rfc3339()),
            duration_seconds,
        })
    }
}

/// Explicit path wins; otherwise the newest capture in the inbox.
pub fn resolve_input(explicit: Option<&Path>, inbox: &Path, cwd: &Path) -> Result<CaptureFile> {
    match explicit {
        Some(path) => Ok(CaptureFile::new(absolutize(cwd, path))),
        None => latest_capture(inbox),
    }
}

pub fn latest_capture(inbox: &Path) -> Result<CaptureFile> {
    let entries = match fs::read_dir(inbox) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list inbox {}: {}", inbox.display(), e);
            return Err(FlowmeterError::NoInputFound(inbox.to_path_buf()));
        }
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let is_pcap = entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.ends_with(".pcap"));
        if !is_pcap {
            continue;
        }
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((modified, path)) => Ok(CaptureFile {
            path,
            modified: Some(modified),
        }),
        None => Err(FlowmeterError::NoInputFound(inbox.to_path_buf())),
    }
}
