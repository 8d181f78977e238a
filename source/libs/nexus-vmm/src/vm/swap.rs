// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Swap backing store and slot allocator for evicted dirty pages
//! OWNERS: @kernel-mm-team
//! PUBLIC API: BackingStore (trait), MemBackingStore, FileBackingStore, SwapManager
//! DEPENDS_ON: parking_lot (swap lock), log
//! INVARIANTS: A slot is either free or owned by exactly one (pid, vpn); the store only grows;
//!             every slot transfer moves exactly one page

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::SwapError;
use crate::types::SwapSlot;

/// Page-granular storage behind the swap area.
pub trait BackingStore: Send {
    /// Bytes per slot.
    fn page_size(&self) -> usize;

    /// Number of slots the store currently holds.
    fn len_pages(&self) -> usize;

    /// Appends one zeroed slot and returns its index.
    fn grow(&mut self) -> Result<SwapSlot, SwapError>;

    /// Reads slot `slot` into `buf` (exactly one page).
    fn read_page(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError>;

    /// Writes `buf` (exactly one page) to slot `slot`.
    fn write_page(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError>;

    /// Releases the underlying storage. Later transfers fail with [`SwapError::Closed`].
    fn destroy(&mut self) -> Result<(), SwapError>;
}

fn check_slot(slot: SwapSlot, len: usize) -> Result<(), SwapError> {
    if slot >= len {
        return Err(SwapError::OutOfRange { slot, len });
    }
    Ok(())
}

/// Heap-backed store for tests and diskless configurations.
pub struct MemBackingStore {
    page_size: usize,
    pages: Vec<Vec<u8>>,
    closed: bool,
}

impl MemBackingStore {
    /// Creates an empty store of `page_size` slots.
    pub fn new(page_size: usize) -> Self {
        Self { page_size, pages: Vec::new(), closed: false }
    }
}

impl BackingStore for MemBackingStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len_pages(&self) -> usize {
        self.pages.len()
    }

    fn grow(&mut self) -> Result<SwapSlot, SwapError> {
        if self.closed {
            return Err(SwapError::Closed);
        }
        self.pages.push(vec![0u8; self.page_size]);
        Ok(self.pages.len() - 1)
    }

    fn read_page(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError> {
        if self.closed {
            return Err(SwapError::Closed);
        }
        check_slot(slot, self.pages.len())?;
        buf.copy_from_slice(&self.pages[slot]);
        Ok(())
    }

    fn write_page(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError> {
        if self.closed {
            return Err(SwapError::Closed);
        }
        check_slot(slot, self.pages.len())?;
        self.pages[slot].copy_from_slice(buf);
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SwapError> {
        self.pages = Vec::new();
        self.closed = true;
        Ok(())
    }
}

/// Swap file on the host filesystem.
///
/// The file is created (truncated) on construction and removed by
/// [`BackingStore::destroy`] or, failing that, on drop.
pub struct FileBackingStore {
    path: PathBuf,
    file: Option<File>,
    page_size: usize,
    len: usize,
}

impl FileBackingStore {
    /// Creates an empty swap file at `path`.
    pub fn create(path: impl AsRef<Path>, page_size: usize) -> Result<Self, SwapError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        debug!(target: "vmm::swap", "created swap file {}", path.display());
        Ok(Self { path, file: Some(file), page_size, len: 0 })
    }

    /// Location of the swap file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&mut self) -> Result<&mut File, SwapError> {
        self.file.as_mut().ok_or(SwapError::Closed)
    }

    fn seek_to(&mut self, slot: SwapSlot) -> Result<&mut File, SwapError> {
        check_slot(slot, self.len)?;
        let offset = (slot * self.page_size) as u64;
        let file = self.open_file()?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(file)
    }
}

impl BackingStore for FileBackingStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len_pages(&self) -> usize {
        self.len
    }

    fn grow(&mut self) -> Result<SwapSlot, SwapError> {
        let new_len = ((self.len + 1) * self.page_size) as u64;
        self.open_file()?.set_len(new_len)?;
        self.len += 1;
        Ok(self.len - 1)
    }

    fn read_page(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError> {
        let expected = buf.len();
        let file = self.seek_to(slot)?;
        let mut transferred = 0;
        while transferred < expected {
            match file.read(&mut buf[transferred..]) {
                Ok(0) => break,
                Ok(n) => transferred += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if transferred != expected {
            return Err(SwapError::ShortTransfer { slot, transferred, expected });
        }
        Ok(())
    }

    fn write_page(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError> {
        let file = self.seek_to(slot)?;
        file.write_all(buf)?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), SwapError> {
        if self.file.take().is_none() {
            return Ok(());
        }
        fs::remove_file(&self.path)?;
        debug!(target: "vmm::swap", "removed swap file {}", self.path.display());
        Ok(())
    }
}

impl Drop for FileBackingStore {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            warn!(target: "vmm::swap", "failed to remove swap file {}: {err}", self.path.display());
        }
    }
}

struct SwapInner {
    store: Box<dyn BackingStore>,
    free: VecDeque<SwapSlot>,
    is_free: Vec<bool>,
}

/// Slot allocator plus page transfers, guarded by its own lock.
///
/// The swap lock is independent of the kernel's page lock and is always
/// taken after it, never before.
pub struct SwapManager {
    page_size: usize,
    inner: Mutex<SwapInner>,
}

impl SwapManager {
    /// Wraps an empty `store`.
    pub fn new(store: Box<dyn BackingStore>) -> Self {
        let page_size = store.page_size();
        Self { page_size, inner: Mutex::new(SwapInner { store, free: VecDeque::new(), is_free: Vec::new() }) }
    }

    /// Reuses the oldest released slot, or grows the store by one page.
    pub fn allocate_slot(&self) -> Result<SwapSlot, SwapError> {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.free.pop_front() {
            inner.is_free[slot] = false;
            return Ok(slot);
        }
        let slot = inner.store.grow()?;
        inner.is_free.push(false);
        debug!(target: "vmm::swap", "swap area grown to {} pages", slot + 1);
        Ok(slot)
    }

    /// Puts `slot` back on the free list.
    pub fn release_slot(&self, slot: SwapSlot) {
        let mut inner = self.inner.lock();
        assert!(slot < inner.is_free.len(), "swap slot {slot} was never allocated");
        assert!(!inner.is_free[slot], "swap slot {slot} released twice");
        inner.is_free[slot] = true;
        inner.free.push_back(slot);
    }

    /// Copies slot `slot` into `frame`.
    pub fn read(&self, slot: SwapSlot, frame: &mut [u8]) -> Result<(), SwapError> {
        debug_assert_eq!(frame.len(), self.page_size);
        self.inner.lock().store.read_page(slot, frame)
    }

    /// Copies `frame` into slot `slot`.
    pub fn write(&self, slot: SwapSlot, frame: &[u8]) -> Result<(), SwapError> {
        debug_assert_eq!(frame.len(), self.page_size);
        self.inner.lock().store.write_page(slot, frame)
    }

    /// Number of pages the store has grown to.
    pub fn size_pages(&self) -> usize {
        self.inner.lock().store.len_pages()
    }

    /// Number of slots currently holding a page.
    pub fn slots_in_use(&self) -> usize {
        let inner = self.inner.lock();
        inner.is_free.len() - inner.free.len()
    }

    /// Destroys the backing store.
    pub fn close(&self) -> Result<(), SwapError> {
        self.inner.lock().store.destroy()
    }
}
