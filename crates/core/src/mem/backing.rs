//! Persistent backing store for evicted pages.
//!
//! The store is an append-only text file of line-addressed records:
//!
//! ```text
//! PID <n> PAGE <n> DATA <w0> <w1> …
//! ```
//!
//! The most recent record for a (pid, page) wins on load; a missing record
//! loads as a zero-filled page. One internal mutex serializes all store and
//! load operations; callers must not hold the pager lock when calling in.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::common::error::{SimError, SimResult};
use crate::common::Pid;

/// Storage seam for page contents, keyed by (pid, page).
///
/// Implementors must be `Send + Sync`; the pager shares one store across
/// every worker thread.
pub trait PageStore: Send + Sync {
    /// Appends a page record.
    fn store(&self, pid: Pid, page: usize, words: &[u16]) -> SimResult<()>;

    /// Loads the most recent record for (pid, page), zero-filled on miss.
    fn load(&self, pid: Pid, page: usize) -> SimResult<Vec<u16>>;
}

#[derive(Debug)]
struct StoreState {
    /// Bytes of page payload appended so far, charged against the capacity.
    payload_bytes: usize,
}

/// File-backed implementation of [`PageStore`].
#[derive(Debug)]
pub struct FileBackingStore {
    path: PathBuf,
    words_per_page: usize,
    capacity_bytes: usize,
    state: Mutex<StoreState>,
}

impl FileBackingStore {
    /// Opens (creating if needed) the store file and validates writability.
    ///
    /// A store that cannot be opened is the fatal infrastructure error of
    /// the error-handling design: the caller refuses further submissions.
    pub fn create<P: AsRef<Path>>(
        path: P,
        frame_size: usize,
        capacity_bytes: usize,
    ) -> SimResult<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                SimError::BackingStore(format!("cannot open '{}': {}", path.display(), e))
            })?;

        Ok(Self {
            path,
            words_per_page: (frame_size / 2).max(1),
            capacity_bytes,
            state: Mutex::new(StoreState { payload_bytes: 0 }),
        })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of 16-bit words per page record.
    pub fn words_per_page(&self) -> usize {
        self.words_per_page
    }
}

impl PageStore for FileBackingStore {
    fn store(&self, pid: Pid, page: usize, words: &[u16]) -> SimResult<()> {
        let mut state = self.state.lock().unwrap();

        let payload = words.len() * 2;
        if state.payload_bytes + payload > self.capacity_bytes {
            return Err(SimError::BackingStore(format!(
                "capacity of {} bytes exceeded",
                self.capacity_bytes
            )));
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| SimError::BackingStore(e.to_string()))?;

        let mut line = format!("PID {} PAGE {} DATA", pid, page);
        for word in words {
            line.push(' ');
            line.push_str(&word.to_string());
        }
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| SimError::BackingStore(e.to_string()))?;

        state.payload_bytes += payload;
        debug!("stored pid {} page {} ({} words)", pid, page, words.len());
        Ok(())
    }

    fn load(&self, pid: Pid, page: usize) -> SimResult<Vec<u16>> {
        let _state = self.state.lock().unwrap();

        let mut data = vec![0u16; self.words_per_page];
        let file = match File::open(&self.path) {
            Ok(f) => f,
            // First touch before any store; a zero page is the contract.
            Err(_) => return Ok(data),
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| SimError::BackingStore(e.to_string()))?;
            if let Some(words) = parse_record(&line, pid, page) {
                // Later records supersede earlier ones; keep scanning.
                for (slot, word) in data.iter_mut().zip(words) {
                    *slot = word;
                }
            }
        }
        Ok(data)
    }
}

/// Parses one record line; returns the payload when it matches (pid, page).
fn parse_record(line: &str, pid: Pid, page: usize) -> Option<Vec<u16>> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "PID" {
        return None;
    }
    let rec_pid: Pid = tokens.next()?.parse().ok()?;
    if tokens.next()? != "PAGE" {
        return None;
    }
    let rec_page: usize = tokens.next()?.parse().ok()?;
    if tokens.next()? != "DATA" {
        return None;
    }
    if rec_pid != pid || rec_page != page {
        return None;
    }
    Some(tokens.filter_map(|t| t.parse().ok()).collect())
}
