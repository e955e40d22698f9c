use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::{DiskMetrics, Log, LogSegment, LogSegmentName, Offset, SegmentError, SegmentView};

/// Suffix of every segment file: `<position>_<generation>_log`.
pub const SEGMENT_FILE_SUFFIX: &str = "_log";

/// One segment file of a [`FileLog`].
///
/// The read handle is shared by every view handed out; `end_offset` only
/// grows, and only after the appended bytes have been written.
pub struct FileSegment {
    name: LogSegmentName,
    path: PathBuf,
    file: Arc<File>,
    end_offset: AtomicU64,
    open_views: AtomicUsize,
}

impl FileSegment {
    fn open(dir: &Path, name: LogSegmentName) -> Result<Self, SegmentError> {
        let path = dir.join(format!("{}{}", name, SEGMENT_FILE_SUFFIX));
        // Create if missing so a fresh log has something to read from.
        OpenOptions::new().create(true).append(true).open(&path)?;
        let file = File::open(&path)?;
        let end_offset = file.metadata()?.len();
        debug!(segment = %name, end_offset, "opened segment");
        Ok(Self {
            name,
            path,
            file: Arc::new(file),
            end_offset: AtomicU64::new(end_offset),
            open_views: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of views acquired and not yet released.
    pub fn open_views(&self) -> usize {
        self.open_views.load(Ordering::Acquire)
    }
}

impl LogSegment for FileSegment {
    fn name(&self) -> &LogSegmentName {
        &self.name
    }

    fn end_offset(&self) -> u64 {
        self.end_offset.load(Ordering::Acquire)
    }

    fn view(&self) -> Result<SegmentView, SegmentError> {
        let views = self.open_views.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(segment = %self.name, views, "acquired view");
        Ok(SegmentView {
            path: self.path.clone(),
            file: self.file.clone(),
        })
    }

    fn close_view(&self) {
        let released = self
            .open_views
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
        trace!(segment = %self.name, ok = released.is_ok(), "released view");
    }
}

/// The segment currently receiving appends.
struct ActiveSegment {
    segment: Arc<FileSegment>,
    writer: File,
}

/// A directory of append-only segment files.
///
/// Appends go to the newest segment until it would exceed `capacity`, at
/// which point a new segment is started. A single record larger than
/// `capacity` gets a segment to itself.
pub struct FileLog {
    dir: PathBuf,
    capacity: u64,
    sync: bool,
    segments: RwLock<BTreeMap<LogSegmentName, Arc<FileSegment>>>,
    active: Mutex<ActiveSegment>,
    metrics: Option<Arc<dyn DiskMetrics>>,
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("dir", &self.dir)
            .field("capacity", &self.capacity)
            .field("sync", &self.sync)
            .field("segment_count", &self.segment_count())
            .field("disk_metrics", &self.metrics.is_some())
            .finish()
    }
}

impl FileLog {
    /// Opens the log in `dir`, creating the directory and a first segment if
    /// needed.
    ///
    /// # Arguments
    ///
    /// * `capacity` - maximum segment size in bytes.
    /// * `sync` - if true, every append is followed by `fsync`.
    /// * `metrics` - optional sink handed to readers for timing prefetches.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        capacity: u64,
        sync: bool,
        metrics: Option<Arc<dyn DiskMetrics>>,
    ) -> Result<Self, SegmentError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut segments = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(stem) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(SEGMENT_FILE_SUFFIX))
            else {
                continue;
            };
            let Ok(name) = stem.parse::<LogSegmentName>() else {
                continue;
            };
            segments.insert(name, Arc::new(FileSegment::open(&dir, name)?));
        }

        if segments.is_empty() {
            let first = LogSegmentName::first();
            segments.insert(first, Arc::new(FileSegment::open(&dir, first)?));
        }

        let last = segments
            .values()
            .next_back()
            .cloned()
            .ok_or(SegmentError::EmptyLog)?;
        let writer = OpenOptions::new().append(true).open(last.path())?;

        debug!(dir = %dir.display(), segments = segments.len(), active = %last.name, "opened log");

        Ok(Self {
            dir,
            capacity,
            sync,
            segments: RwLock::new(segments),
            active: Mutex::new(ActiveSegment {
                segment: last,
                writer,
            }),
            metrics,
        })
    }

    /// Appends `data` and returns the offset of its first byte.
    ///
    /// Rolls to a fresh segment first when `data` would not fit the active
    /// one. Bytes found past the recorded end offset are cut off before
    /// writing, so the returned offset always addresses `data`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentError::Io` if the write, flush or fsync fails. The
    /// segment is rewound to its previous end before the error is returned.
    pub fn append(&self, data: &[u8]) -> Result<Offset, SegmentError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        let start = active.segment.end_offset();
        if start > 0 && start + data.len() as u64 > self.capacity {
            self.roll(&mut active)?;
        }

        let segment = active.segment.clone();
        let start = segment.end_offset();
        let on_disk = active.writer.metadata()?.len();
        if on_disk > start {
            warn!(segment = %segment.name, start, on_disk, "dropping bytes past end offset");
            active.writer.set_len(start)?;
        }

        if let Err(e) = write_record(&mut active.writer, data, self.sync) {
            // Appends go to EOF, so partial bytes must not outlive the error.
            if let Err(rewind) = active.writer.set_len(start) {
                warn!(segment = %segment.name, start, error = %rewind, "failed to rewind after write error");
            }
            return Err(e.into());
        }
        segment
            .end_offset
            .fetch_add(data.len() as u64, Ordering::AcqRel);

        trace!(segment = %segment.name, start, len = data.len(), "appended");
        Ok(Offset::new(segment.name, start))
    }

    fn roll(&self, active: &mut ActiveSegment) -> Result<(), SegmentError> {
        let name = active.segment.name.next_position();
        let segment = Arc::new(FileSegment::open(&self.dir, name)?);
        let writer = OpenOptions::new().append(true).open(segment.path())?;
        self.segments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, segment.clone());
        debug!(from = %active.segment.name, to = %name, "rolled to new segment");
        *active = ActiveSegment { segment, writer };
        Ok(())
    }

    /// Cuts the active segment back to `len` bytes, dropping a torn tail left
    /// by an interrupted append. Open views see the shorter end offset.
    pub fn truncate_active(&self, len: u64) -> Result<(), SegmentError> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let end = active.segment.end_offset();
        if len >= end {
            return Ok(());
        }
        active.writer.set_len(len)?;
        active.writer.sync_all()?;
        active.segment.end_offset.store(len, Ordering::Release);
        debug!(segment = %active.segment.name, from = end, to = len, "truncated torn tail");
        Ok(())
    }

    /// Forces all appended data to disk.
    pub fn sync_to_disk(&self) -> Result<(), SegmentError> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.writer.sync_all()?;
        Ok(())
    }

    /// All segments in log order.
    pub fn segments(&self) -> Vec<Arc<FileSegment>> {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Concrete handle for a segment, e.g. to inspect its open views.
    pub fn file_segment(&self, name: &LogSegmentName) -> Option<Arc<FileSegment>> {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Name of the segment currently receiving appends.
    pub fn active_segment_name(&self) -> LogSegmentName {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .segment
            .name
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maximum segment size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

fn write_record(writer: &mut File, data: &[u8], sync: bool) -> std::io::Result<()> {
    writer.write_all(data)?;
    writer.flush()?;
    if sync {
        writer.sync_all()?;
    }
    Ok(())
}

impl Log for FileLog {
    fn segment(&self, name: &LogSegmentName) -> Option<Arc<dyn LogSegment>> {
        self.file_segment(name)
            .map(|s| s as Arc<dyn LogSegment>)
    }

    fn first_segment(&self) -> Option<Arc<dyn LogSegment>> {
        self.segments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .next()
            .cloned()
            .map(|s| s as Arc<dyn LogSegment>)
    }

    fn disk_metrics(&self) -> Option<Arc<dyn DiskMetrics>> {
        self.metrics.clone()
    }
}
