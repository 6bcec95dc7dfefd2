//! Pager for page-level I/O against a single table file.

use basalt_common::page::{Page, PageId, PAGE_SIZE};
use basalt_common::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Manages reading and writing pages of one backing file.
///
/// The file is a flat sequence of `PAGE_SIZE` pages; page `i` lives at byte
/// offset `i * PAGE_SIZE`. The pager tracks the file length and allocates new
/// page ids monotonically from it. There is no free list: pages are never
/// reused.
pub struct Pager {
    /// Path to the backing file.
    path: PathBuf,
    /// Enable fsync after writes.
    fsync_enabled: bool,
    /// Open file handle plus the tracked file length.
    inner: Mutex<PagerInner>,
}

struct PagerInner {
    file: File,
    /// Current file length in bytes. Always a multiple of PAGE_SIZE once this
    /// pager has written to the file.
    file_length: u64,
}

impl Pager {
    /// Opens the backing file, creating it if absent.
    ///
    /// A file whose length is not a multiple of `PAGE_SIZE` is reported with
    /// a warning but opened anyway; operations proceed with the reported
    /// length.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_length = file.metadata()?.len();

        if file_length % PAGE_SIZE as u64 != 0 {
            tracing::warn!(
                "{}: file length {} is not a multiple of the page size",
                path.display(),
                file_length
            );
        }
        tracing::debug!(
            "opened {} with {} pages",
            path.display(),
            file_length / PAGE_SIZE as u64
        );

        Ok(Self {
            path,
            fsync_enabled,
            inner: Mutex::new(PagerInner { file, file_length }),
        })
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages currently in the file.
    pub fn num_pages(&self) -> u32 {
        (self.inner.lock().file_length / PAGE_SIZE as u64) as u32
    }

    /// Returns the next never-written page slot.
    ///
    /// Pure function of the tracked file length: calling this twice without
    /// an intervening write to that slot returns the same id, so callers must
    /// write a page before allocating the next one.
    pub fn unused_page_id(&self) -> PageId {
        self.num_pages()
    }

    /// Reads the page at `page_id`.
    ///
    /// If the page lies within the file, exactly `PAGE_SIZE` bytes are read;
    /// a short read is an I/O error. If the page lies beyond the current file
    /// length, a zero-filled page is returned without touching the file: the
    /// file only grows when that page is later written.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut page = Page::zeroed();

        if offset < inner.file_length {
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.read_exact(page.as_bytes_mut())?;
        } else {
            tracing::debug!("page fault: page {} initialized in memory", page_id);
        }

        Ok(page)
    }

    /// Writes the full page at `page_id` and flushes.
    ///
    /// Extends the tracked file length if this write is the first to reach
    /// that offset. There is no partial-page write.
    pub fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        let offset = page_id as u64 * PAGE_SIZE as u64;

        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(page.as_bytes())?;
        inner.file.flush()?;
        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        let end = offset + PAGE_SIZE as u64;
        if end > inner.file_length {
            inner.file_length = end;
        }

        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}
