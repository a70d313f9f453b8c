use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

/// Default directory for named shared-memory regions.
pub const DEFAULT_SHM_ROOT: &str = "/dev/shm";

/// Resolves a buffer name (e.g. `"JF07-3"`) to the file backing it under `root`.
///
/// Names are flat: path separators are rejected so a name can never escape the root.
pub fn region_path(root: impl AsRef<Path>, name: &str) -> io::Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid shared memory region name '{name}'"),
        ));
    }
    Ok(root.as_ref().join(name))
}

pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

pub struct MmapFile {
    _file: File,
    mmap: Mmap,
}

impl MmapFileMut {
    /// Create a file of at least `size_bytes` and map it read-write.
    ///
    /// An existing file is reused in place: it is grown if smaller but never
    /// truncated, so mappings held by other processes stay backed. New bytes
    /// are zero-filled by `set_len`; existing bytes keep their contents and the
    /// caller is responsible for reinitialising them.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < size_bytes {
            file.set_len(size_bytes)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map it read-write
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Raw pointer to the start of the mapped region
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl MmapFile {
    /// Open an existing file and map it read-only.
    ///
    /// Readers of a region written by another process must still treat the
    /// contents as volatile: the mapping is shared, not a snapshot.
    pub fn open_ro<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;

        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_path_joins_flat_names() {
        let p = region_path("/dev/shm", "JF07-3").unwrap();
        assert_eq!(p, PathBuf::from("/dev/shm/JF07-3"));
    }

    #[test]
    fn region_path_rejects_separators() {
        assert!(region_path("/dev/shm", "../etc").is_err());
        assert!(region_path("/dev/shm", "").is_err());
        assert!(region_path("/dev/shm", "..").is_err());
    }

    #[test]
    fn writes_are_visible_through_read_only_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let mut rw = MmapFileMut::create_rw(&path, 4096).unwrap();
        assert_eq!(rw.len(), 4096);
        unsafe { rw.as_mut_ptr().add(17).write(0xAB) };

        let ro = MmapFile::open_ro(&path).unwrap();
        assert_eq!(ro.len(), 4096);
        let byte = unsafe { ro.as_ptr().add(17).read_volatile() };
        assert_eq!(byte, 0xAB);
    }

    #[test]
    fn recreating_a_region_keeps_existing_mappings_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let mut first = MmapFileMut::create_rw(&path, 8192).unwrap();
        unsafe { first.as_mut_ptr().add(8000).write(0x5A) };
        let ro = MmapFile::open_ro(&path).unwrap();

        // A smaller request must not shrink the file under `ro`.
        let mut second = MmapFileMut::create_rw(&path, 4096).unwrap();
        assert_eq!(second.len(), 8192);
        assert_eq!(unsafe { ro.as_ptr().add(8000).read_volatile() }, 0x5A);

        unsafe { second.as_mut_ptr().add(8000).write(0x11) };
        assert_eq!(unsafe { ro.as_ptr().add(8000).read_volatile() }, 0x11);

        let third = MmapFileMut::create_rw(&path, 16384).unwrap();
        assert_eq!(third.len(), 16384);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MmapFile::open_ro(dir.path().join("nope")).is_err());
    }
}
