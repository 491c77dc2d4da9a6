//! Fixed-size 2D pixel buffers backed by heap memory or a mapped file.

use crate::error::{TileError, TileResult};
use crate::pixel::Pixel;
use degate::common::{TEMP_TILE_PREFIX, TILE_FILE_EXTENSION};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where the pixels of a [`MemoryMap`] live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Zero-initialised heap allocation.
    Heap,
    /// Mapped file with a unique name, deleted when the map is dropped.
    TempFile,
    /// Mapped file at a fixed path, kept on disk and reused when reopened.
    PersistentFile,
}

enum Backing<T> {
    Heap(Vec<T>),
    // declaration order is drop order: unmap first, then close (and delete) the file
    Mapped { mmap: MmapMut, file: MappedFile },
}

enum MappedFile {
    Temp(NamedTempFile),
    Persistent { _file: File, path: PathBuf },
}

impl MappedFile {
    fn path(&self) -> &Path {
        match self {
            MappedFile::Temp(file) => file.path(),
            MappedFile::Persistent { path, .. } => path,
        }
    }
}

/// A `width x height` buffer of pixels in row-major order.
///
/// Every variant starts out zeroed, except a persistent file that already
/// holds data, which is mapped as is. Pixel access is bounds checked and
/// panics on out-of-range coordinates.
///
/// # Examples
///
/// ```rust
/// use degate_tiles::MemoryMap;
///
/// let mut map: MemoryMap<u8> = MemoryMap::new(4, 4);
/// map.set(2, 2, 200);
/// assert_eq!(map.get(2, 2), 200);
/// map.clear();
/// assert_eq!(map.get(2, 2), 0);
/// ```
pub struct MemoryMap<T: Pixel> {
    width: u32,
    height: u32,
    backing: Backing<T>,
}

impl<T: Pixel> MemoryMap<T> {
    /// Creates a zeroed heap-backed map.
    pub fn new(width: u32, height: u32) -> MemoryMap<T> {
        let len = width as usize * height as usize;
        MemoryMap {
            width,
            height,
            backing: Backing::Heap(vec![T::zeroed(); len]),
        }
    }

    /// Creates a zeroed map over a uniquely named file inside `directory`.
    /// The directory is created if needed; the file is deleted on drop.
    pub fn temp_file(width: u32, height: u32, directory: &Path) -> TileResult<MemoryMap<T>> {
        let byte_size = Self::checked_byte_size(width, height)?;
        ensure_directory(directory)?;

        let file = tempfile::Builder::new()
            .prefix(TEMP_TILE_PREFIX)
            .suffix(&format!(".{}", TILE_FILE_EXTENSION))
            .tempfile_in(directory)?;
        file.as_file().set_len(byte_size as u64)?;
        let mmap = map_file(file.as_file(), file.path(), byte_size)?;

        log::trace!("Mapped temporary {} tile {}", T::NAME, file.path().display());
        Ok(MemoryMap {
            width,
            height,
            backing: Backing::Mapped {
                mmap,
                file: MappedFile::Temp(file),
            },
        })
    }

    /// Maps the file at `path`, creating it zero-filled when it does not
    /// exist or is too short. Existing contents are kept, so reopening a
    /// path with the same dimensions sees the pixels written before.
    pub fn persistent_file(width: u32, height: u32, path: &Path) -> TileResult<MemoryMap<T>> {
        let byte_size = Self::checked_byte_size(width, height)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < byte_size as u64 {
            file.set_len(byte_size as u64)?;
        }
        let mmap = map_file(&file, path, byte_size)?;

        Ok(MemoryMap {
            width,
            height,
            backing: Backing::Mapped {
                mmap,
                file: MappedFile::Persistent {
                    _file: file,
                    path: path.to_path_buf(),
                },
            },
        })
    }

    /// Creates a map of the given kind. `path` is ignored for
    /// [`StorageKind::Heap`], names the directory for
    /// [`StorageKind::TempFile`] and the file for [`StorageKind::PersistentFile`].
    pub fn open(kind: StorageKind, width: u32, height: u32, path: Option<&Path>) -> TileResult<MemoryMap<T>> {
        match (kind, path) {
            (StorageKind::Heap, _) => Ok(MemoryMap::new(width, height)),
            (StorageKind::TempFile, Some(directory)) => MemoryMap::temp_file(width, height, directory),
            (StorageKind::TempFile, None) => {
                MemoryMap::temp_file(width, height, &std::env::temp_dir())
            }
            (StorageKind::PersistentFile, Some(path)) => MemoryMap::persistent_file(width, height, path),
            (StorageKind::PersistentFile, None) => Err(TileError::InvalidOperation(
                "a persistent memory map needs a file path".to_string(),
            )),
        }
    }

    fn checked_byte_size(width: u32, height: u32) -> TileResult<usize> {
        let byte_size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|len| len.checked_mul(T::SIZE))
            .ok_or_else(|| TileError::InvalidOperation(format!("{}x{} map is too large", width, height)))?;
        if byte_size == 0 {
            return Err(TileError::InvalidOperation(format!(
                "cannot map an empty {}x{} buffer",
                width, height
            )));
        }
        Ok(byte_size)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * T::SIZE
    }

    pub fn storage_kind(&self) -> StorageKind {
        match &self.backing {
            Backing::Heap(_) => StorageKind::Heap,
            Backing::Mapped {
                file: MappedFile::Temp(_),
                ..
            } => StorageKind::TempFile,
            Backing::Mapped {
                file: MappedFile::Persistent { .. },
                ..
            } => StorageKind::PersistentFile,
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Heap(_) => None,
            Backing::Mapped { file, .. } => Some(file.path()),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.backing {
            Backing::Heap(pixels) => pixels.as_slice(),
            Backing::Mapped { mmap, .. } => bytemuck::cast_slice(&mmap[..self.byte_size()]),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let byte_size = self.byte_size();
        match &mut self.backing {
            Backing::Heap(pixels) => pixels.as_mut_slice(),
            Backing::Mapped { mmap, .. } => bytemuck::cast_slice_mut(&mut mmap[..byte_size]),
        }
    }

    /// Row `y` as a slice.
    pub fn row(&self, y: u32) -> &[T] {
        assert!(y < self.height, "row {} out of bounds for height {}", y, self.height);
        let width = self.width as usize;
        let start = y as usize * width;
        &self.as_slice()[start..start + width]
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) out of bounds for {}x{} map",
            x,
            y,
            self.width,
            self.height
        );
        y as usize * self.width as usize + x as usize
    }

    /// Reads the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the map.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        let index = self.index(x, y);
        self.as_slice()[index]
    }

    /// Writes the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the map.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let index = self.index(x, y);
        self.as_mut_slice()[index] = value;
    }

    /// Zeroes every pixel.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(T::zeroed());
    }

    /// Zeroes the `width x height` rectangle starting at `(min_x, min_y)`.
    ///
    /// # Panics
    ///
    /// Panics if the rectangle does not fit in the map.
    pub fn clear_area(&mut self, min_x: u32, min_y: u32, width: u32, height: u32) {
        let fits_x = min_x.checked_add(width).is_some_and(|max_x| max_x <= self.width);
        let fits_y = min_y.checked_add(height).is_some_and(|max_y| max_y <= self.height);
        assert!(
            fits_x && fits_y,
            "area {}x{} at ({}, {}) out of bounds for {}x{} map",
            width,
            height,
            min_x,
            min_y,
            self.width,
            self.height
        );

        let map_width = self.width as usize;
        let pixels = self.as_mut_slice();
        for y in min_y..min_y + height {
            let start = y as usize * map_width + min_x as usize;
            pixels[start..start + width as usize].fill(T::zeroed());
        }
    }

    /// Copies the whole buffer into `destination`.
    ///
    /// # Panics
    ///
    /// Panics if `destination` holds fewer than [`len`](Self::len) pixels.
    pub fn raw_copy(&self, destination: &mut [T]) {
        let len = self.len();
        assert!(
            destination.len() >= len,
            "destination holds {} pixels, {} needed",
            destination.len(),
            len
        );
        destination[..len].copy_from_slice(self.as_slice());
    }

    /// Writes mapped pixels back to the file. A no-op for heap maps.
    pub fn flush(&self) -> TileResult<()> {
        match &self.backing {
            Backing::Heap(_) => Ok(()),
            Backing::Mapped { mmap, .. } => Ok(mmap.flush()?),
        }
    }
}

impl<T: Pixel> std::fmt::Debug for MemoryMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMap")
            .field("pixel", &T::NAME)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("storage", &self.storage_kind())
            .field("path", &self.path())
            .finish()
    }
}

impl<T: Pixel> Drop for MemoryMap<T> {
    fn drop(&mut self) {
        if let Backing::Mapped { mmap, file } = &self.backing {
            if let Err(err) = mmap.flush() {
                log::error!("Failed to flush memory map {}: {}", file.path().display(), err);
            }
        }
    }
}

pub(crate) fn ensure_directory(directory: &Path) -> TileResult<()> {
    if directory.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(directory).map_err(|source| TileError::DirectoryCreation {
        path: directory.to_path_buf(),
        source,
    })
}

fn map_file(file: &File, path: &Path, byte_size: usize) -> TileResult<MmapMut> {
    // SAFETY: the file is opened read-write by this process and is at least
    // `byte_size` long. Temp files are private to the map; persistent tile
    // files must not be truncated by others while mapped.
    unsafe { MmapOptions::new().len(byte_size).map_mut(file) }.map_err(|source| TileError::Mapping {
        path: path.to_path_buf(),
        source,
    })
}
