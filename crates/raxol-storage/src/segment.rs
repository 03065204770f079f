//! Dated NDJSON log files.
//!
//! Layout under the storage root:
//!
//! ```text
//! audit_2024-03-01.log                         current file for that UTC day
//! audit_2024-03-01.log.20240301T140000Z        rotated
//! audit_2024-03-01.log.20240301T150000Z.gz     rotated and compressed
//! indexes.dat                                  optional index snapshot
//! ```
//!
//! Writers only ever append to the current file of a day. Rotated files are
//! rewritten in place only by retention deletes.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use raxol_contracts::{AuditResult, StoredRecord};

pub const FILE_PREFIX: &str = "audit_";
pub const LOG_SUFFIX: &str = ".log";
pub const GZ_SUFFIX: &str = ".gz";
pub const SNAPSHOT_FILE: &str = "indexes.dat";

/// In-progress writes carry one of these suffixes and are never read.
const TRANSIENT_SUFFIXES: [&str; 2] = [".tmp", ".partial"];

/// Name of the current file for a `YYYY-MM-DD` date.
pub fn current_file_name(date: &str) -> String {
    format!("{}{}{}", FILE_PREFIX, date, LOG_SUFFIX)
}

/// Basic-format ISO 8601 stamp used as the rotation suffix.
pub fn rotation_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// The directory holding every audit file.
#[derive(Debug, Clone)]
pub struct SegmentDir {
    root: PathBuf,
}

impl SegmentDir {
    /// Open `root`, creating it when missing.
    pub fn open(root: impl Into<PathBuf>) -> AuditResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_path(&self, date: &str) -> PathBuf {
        self.root.join(current_file_name(date))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Append pre-serialized lines to the current file of `date` and sync.
    pub fn append(&self, date: &str, lines: &[String]) -> AuditResult<()> {
        let path = self.current_path(date);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        debug!(path = %path.display(), lines = lines.len(), "appended audit lines");
        Ok(())
    }

    /// Size in bytes of `date`'s current file, or 0 when it does not exist.
    pub fn current_size(&self, date: &str) -> u64 {
        fs::metadata(self.current_path(date)).map_or(0, |m| m.len())
    }

    /// Every readable audit file, sorted by name.
    ///
    /// Sorting by name puts each day's rotated files right after its current
    /// file and keeps enumeration order stable across platforms.
    pub fn list_files(&self) -> AuditResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) || !name.contains(LOG_SUFFIX) {
                continue;
            }
            if TRANSIENT_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }

    /// Read every record in `path`, transparently decompressing `.gz` files.
    ///
    /// Lines that fail to parse are skipped with a warning; a corrupt line
    /// never hides the rest of the file.
    ///
    /// A rotated file that a background compression removed between listing
    /// and opening is read from its `.gz` sibling instead.
    pub fn read_file(&self, path: &Path) -> AuditResult<Vec<StoredRecord>> {
        let Some((file, path)) = open_or_compressed(path)? else {
            debug!(path = %path.display(), "audit file vanished before read");
            return Ok(Vec::new());
        };
        let path = path.as_path();
        let reader: Box<dyn Read> = if is_compressed(path) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping unreadable audit line"
                ),
            }
        }
        Ok(records)
    }

    /// Replace the contents of `path` with `records`, preserving its
    /// compression. An empty record set removes the file.
    ///
    /// Writes go to a `.tmp` sibling first and are renamed into place.
    pub fn rewrite(&self, path: &Path, records: &[StoredRecord]) -> AuditResult<()> {
        if records.is_empty() {
            fs::remove_file(path)?;
            return Ok(());
        }

        let tmp = with_suffix(path, ".tmp");
        {
            let file = File::create(&tmp)?;
            let mut body = Vec::new();
            for record in records {
                serde_json::to_writer(&mut body, record)?;
                body.push(b'\n');
            }
            if is_compressed(path) {
                let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
                encoder.write_all(&body)?;
                let mut writer = encoder.finish()?;
                writer.flush()?;
                writer.get_ref().sync_data()?;
            } else {
                let mut writer = BufWriter::new(file);
                writer.write_all(&body)?;
                writer.flush()?;
                writer.get_ref().sync_data()?;
            }
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rename `date`'s current file to `<file>.<stamp>`.
    ///
    /// Returns the rotated path, or `None` when there was no current file.
    pub fn rotate(&self, date: &str, now: DateTime<Utc>) -> AuditResult<Option<PathBuf>> {
        let current = self.current_path(date);
        if !current.exists() {
            return Ok(None);
        }
        let stamp = rotation_stamp(now);
        let mut target = with_suffix(&current, &format!(".{}", stamp));
        let mut n = 1;
        while target.exists() || with_suffix(&target, GZ_SUFFIX).exists() {
            target = with_suffix(&current, &format!(".{}-{}", stamp, n));
            n += 1;
        }
        fs::rename(&current, &target)?;
        Ok(Some(target))
    }

    /// Sum of all audit file sizes.
    pub fn total_size(&self) -> AuditResult<u64> {
        let mut total = 0;
        for path in self.list_files()? {
            match fs::metadata(&path) {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let Ok(meta) = fs::metadata(with_suffix(&path, GZ_SUFFIX)) {
                        total += meta.len();
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}

/// Gzip `path` to `<path>.gz` and remove the original.
///
/// The archive is written under a `.partial` name and renamed when complete,
/// so readers never see a truncated `.gz`.
pub fn compress_file(path: &Path) -> AuditResult<PathBuf> {
    let target = with_suffix(path, GZ_SUFFIX);
    let partial = with_suffix(&target, ".partial");
    {
        let mut input = File::open(path)?;
        let output = File::create(&partial)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
    }
    fs::rename(&partial, &target)?;
    fs::remove_file(path)?;
    Ok(target)
}

/// Open `path`, falling back to `<path>.gz` when an uncompressed file is gone.
///
/// `None` means neither exists any more.
fn open_or_compressed(path: &Path) -> AuditResult<Option<(File, PathBuf)>> {
    match File::open(path) {
        Ok(file) => return Ok(Some((file, path.to_path_buf()))),
        Err(e) if e.kind() == ErrorKind::NotFound && !is_compressed(path) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let gz = with_suffix(path, GZ_SUFFIX);
    match File::open(&gz) {
        Ok(file) => Ok(Some((file, gz))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
