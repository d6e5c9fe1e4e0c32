//! Conversation transcript persistence
//!
//! Appends messages to plain-text logs organized by network and conversation:
//! `<dir>/<network>/<conversation>/YYYY-MM-DD.log`. Writes happen on a
//! background thread so appends never wait on disk I/O.

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::warn;

use crate::message::Message;

/// A transcript line waiting to be written
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub network: String,
    pub conversation: String,
    pub timestamp: DateTime<Utc>,
    pub nick: String,
    pub text: String,
}

impl TranscriptEntry {
    pub fn from_message(network: &str, message: &Message) -> Self {
        Self {
            network: network.to_string(),
            conversation: message.conversation_name.clone(),
            timestamp: message.timestamp,
            nick: message.sender.clone(),
            text: message.content.clone(),
        }
    }
}

/// Queues transcript lines for a background writer thread.
pub struct TranscriptLogger {
    tx: Option<Sender<TranscriptEntry>>,
    worker: Option<JoinHandle<()>>,
}

impl TranscriptLogger {
    /// Start a writer rooted at `log_dir`.
    pub fn new(log_dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&log_dir)?;

        let (tx, rx) = unbounded::<TranscriptEntry>();
        let worker = thread::Builder::new()
            .name("transcript-writer".into())
            .spawn(move || run_writer(rx, log_dir))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queue an entry; never blocks on I/O.
    pub fn log(&self, entry: TranscriptEntry) {
        if let Some(tx) = &self.tx {
            // A stopped writer already reported why
            let _ = tx.send(entry);
        }
    }
}

impl Drop for TranscriptLogger {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_writer(rx: Receiver<TranscriptEntry>, log_dir: PathBuf) {
    let mut file_cache: HashMap<PathBuf, BufWriter<File>> = HashMap::new();

    while let Ok(entry) = rx.recv() {
        if let Err(e) = write_entry(&mut file_cache, &log_dir, &entry) {
            warn!(conversation = %entry.conversation, error = %e, "Transcript write failed");
        }
    }

    for (_, mut writer) in file_cache.drain() {
        let _ = writer.flush();
    }
}

fn write_entry(
    file_cache: &mut HashMap<PathBuf, BufWriter<File>>,
    log_dir: &Path,
    entry: &TranscriptEntry,
) -> io::Result<()> {
    let local = entry.timestamp.with_timezone(&Local);
    let dir = log_dir
        .join(sanitize_filename(&entry.network))
        .join(sanitize_filename(&entry.conversation));
    let path = dir.join(format!("{}.log", local.format("%Y-%m-%d")));

    let writer = match file_cache.entry(path) {
        std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
        std::collections::hash_map::Entry::Vacant(slot) => {
            fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(slot.key())?;
            slot.insert(BufWriter::new(file))
        }
    };

    writeln!(
        writer,
        "[{}] <{}> {}",
        local.format("%H:%M:%S"),
        entry.nick,
        entry.text
    )?;
    writer.flush()
}

/// Platform data directory for transcripts.
pub fn default_directory() -> Option<PathBuf> {
    let base = directories::BaseDirs::new()?;
    Some(base.data_dir().join("slirc-session").join("logs"))
}

/// Sanitize a filename to be filesystem-safe
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationKey;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("#rust"), "_rust");
        assert_eq!(sanitize_filename("irc.libera.chat"), "irc.libera.chat");
        assert_eq!(sanitize_filename("test/path"), "test_path");
    }

    #[test]
    fn test_writes_lines_per_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TranscriptLogger::new(dir.path().to_path_buf()).unwrap();

        let key = ConversationKey::channel("#rust");
        let first = Message::new(&key, "alice", "hello");
        let second = Message::new(&key, "bob", "hi alice");
        logger.log(TranscriptEntry::from_message("libera", &first));
        logger.log(TranscriptEntry::from_message("libera", &second));
        drop(logger);

        let day = first.timestamp.with_timezone(&Local).format("%Y-%m-%d");
        let path = dir
            .path()
            .join("libera")
            .join("_rust")
            .join(format!("{}.log", day));
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("<alice> hello"));
        assert!(lines[1].ends_with("<bob> hi alice"));
    }

    #[test]
    fn test_default_directory_is_namespaced() {
        if let Some(path) = default_directory() {
            assert!(path.to_string_lossy().contains("slirc-session"));
        }
    }
}
