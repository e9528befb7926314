//! File-backed block device using glibc system calls
//!
//! Each device id maps to one image file inside a data directory. An image
//! begins with a checksummed header; block k lives at byte offset
//! `HEADER_RESERVED + k * BLOCK_SIZE`.

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::BlockDevice;
use crate::types::{BlockNo, DeviceId, BLOCK_SIZE};
use libc::{self, c_int, c_void, mode_t, off_t, size_t};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Image magic number ("KMEM" in little endian)
pub const IMAGE_MAGIC: u32 = 0x4D45_4D4B;

/// Image format version
pub const IMAGE_VERSION: u32 = 1;

/// Bytes reserved at the front of an image for the header
pub const HEADER_RESERVED: usize = BLOCK_SIZE;

/// Image header structure
/// Located at the beginning of the image file (offset 0)
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ImageHeader {
    /// Magic number for image validation
    pub magic: u32,
    /// Image format version
    pub version: u32,
    /// Block size the image was created with
    pub block_size: u32,
    /// Header checksum
    pub checksum: u32,
}

impl ImageHeader {
    /// Create a new image header for the current block size
    pub fn new() -> Self {
        ImageHeader {
            magic: IMAGE_MAGIC,
            version: IMAGE_VERSION,
            block_size: BLOCK_SIZE as u32,
            checksum: 0,
        }
    }

    /// Validate image magic number
    pub fn is_valid(&self) -> bool {
        self.magic == IMAGE_MAGIC
    }

    /// Compute checksum (excluding checksum field itself)
    pub fn compute_checksum(&self) -> u32 {
        let mut header = *self;
        header.checksum = 0;
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &header as *const ImageHeader as *const u8,
                std::mem::size_of::<ImageHeader>(),
            )
        };
        crc32fast::hash(bytes)
    }

    /// Initialize the checksum field
    pub fn init_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Verify the checksum field
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self as *const ImageHeader as *const u8,
                std::mem::size_of::<ImageHeader>(),
            )
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut header = ImageHeader::new();
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                &mut header as *mut ImageHeader as *mut u8,
                std::mem::size_of::<ImageHeader>(),
            );
        }
        header
    }
}

impl Default for ImageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// File-backed block device rooted at a data directory
pub struct FileDisk {
    dir: PathBuf,
}

impl FileDisk {
    /// Create a FileDisk over the given data directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileDisk { dir: dir.into() }
    }

    /// Construct the image path for a device id
    fn image_path(&self, device: DeviceId) -> PathBuf {
        self.dir.join(format!("dev_{}.img", device))
    }

    /// Open an image with the given flags and mode
    fn open_image(&self, path: &Path, flags: c_int, mode: mode_t) -> DiskResult<c_int> {
        // Create CString in scope so it lives during the system call
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())?;

        let result = unsafe { libc::open(c_path.as_ptr(), flags, mode) };

        if result < 0 {
            let errno = unsafe { *libc::__errno_location() };
            match errno {
                libc::ENOENT => Err(DiskError::NotFound(path.display().to_string())),
                libc::EACCES | libc::EPERM => {
                    Err(DiskError::SystemError(errno, format!(
                        "open failed: permission denied for '{}'",
                        path.display()
                    )))
                }
                _ => Err(DiskError::SystemError(errno, format!(
                    "open failed with errno {} for path '{}'",
                    errno,
                    path.display()
                ))),
            }
        } else {
            Ok(result)
        }
    }

    fn pread_at(fd: c_int, buf: &mut [u8], offset: u64) -> DiskResult<usize> {
        let result = unsafe {
            libc::pread(
                fd,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as size_t,
                offset as off_t,
            )
        };

        if result < 0 {
            let errno = unsafe { *libc::__errno_location() };
            Err(DiskError::SystemError(errno, "pread failed".to_string()))
        } else {
            Ok(result as usize)
        }
    }

    fn pwrite_at(fd: c_int, buf: &[u8], offset: u64) -> DiskResult<usize> {
        let result = unsafe {
            libc::pwrite(
                fd,
                buf.as_ptr() as *const c_void,
                buf.len() as size_t,
                offset as off_t,
            )
        };

        if result < 0 {
            let errno = unsafe { *libc::__errno_location() };
            Err(DiskError::SystemError(errno, "pwrite failed".to_string()))
        } else {
            Ok(result as usize)
        }
    }

    /// Create a fresh image for the device and stamp its header.
    /// Truncates any existing image of the same id.
    pub fn create_device(&self, device: DeviceId) -> DiskResult<()> {
        let path = self.image_path(device);
        let flags = libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC;
        let fd = self.open_image(&path, flags, 0o644)?;

        let mut header = ImageHeader::new();
        header.init_checksum();
        let written = Self::pwrite_at(fd, header.as_bytes(), 0);
        let _ = unsafe { libc::close(fd) };

        match written {
            Ok(n) if n == std::mem::size_of::<ImageHeader>() => Ok(()),
            Ok(n) => Err(DiskError::SystemError(
                0,
                format!("short header write: {} bytes", n),
            )),
            Err(err) => Err(err),
        }
    }

    /// Open an existing image and validate its header
    pub fn open_device(&self, device: DeviceId) -> DiskResult<()> {
        let path = self.image_path(device);
        let fd = self.open_image(&path, libc::O_RDONLY, 0)?;

        let mut bytes = [0u8; std::mem::size_of::<ImageHeader>()];
        let read = Self::pread_at(fd, &mut bytes, 0);
        let _ = unsafe { libc::close(fd) };

        if read? != bytes.len() {
            return Err(DiskError::CorruptImage(format!(
                "truncated header in '{}'",
                path.display()
            )));
        }
        let header = ImageHeader::from_bytes(&bytes);
        if !header.is_valid() {
            return Err(DiskError::CorruptImage(format!(
                "bad magic in '{}'",
                path.display()
            )));
        }
        if header.block_size as usize != BLOCK_SIZE {
            return Err(DiskError::CorruptImage(format!(
                "block size {} in '{}', expected {}",
                header.block_size,
                path.display(),
                BLOCK_SIZE
            )));
        }
        if !header.verify_checksum() {
            return Err(DiskError::CorruptImage(format!(
                "checksum mismatch in '{}'",
                path.display()
            )));
        }
        Ok(())
    }

    fn block_offset(blockno: BlockNo) -> u64 {
        HEADER_RESERVED as u64 + blockno as u64 * BLOCK_SIZE as u64
    }

    fn check_len(len: usize) -> DiskResult<()> {
        if len != BLOCK_SIZE {
            return Err(DiskError::InvalidArgument(format!(
                "transfer buffer is {} bytes, expected {}",
                len, BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, device: DeviceId, blockno: BlockNo, buf: &mut [u8]) -> DiskResult<()> {
        Self::check_len(buf.len())?;

        let path = self.image_path(device);
        let fd = self.open_image(&path, libc::O_RDONLY, 0)?;
        let result = Self::pread_at(fd, buf, Self::block_offset(blockno));
        let _ = unsafe { libc::close(fd) };

        // Blocks past the current end of a sparse image read as zeroes.
        let n = result?;
        buf[n..].fill(0);
        Ok(())
    }

    fn write_block(&self, device: DeviceId, blockno: BlockNo, buf: &[u8]) -> DiskResult<()> {
        Self::check_len(buf.len())?;

        let path = self.image_path(device);
        let fd = self.open_image(&path, libc::O_WRONLY, 0)?;
        let result = Self::pwrite_at(fd, buf, Self::block_offset(blockno));
        let _ = unsafe { libc::close(fd) };

        match result? {
            n if n == BLOCK_SIZE => Ok(()),
            n => Err(DiskError::SystemError(
                0,
                format!("short block write: {} bytes", n),
            )),
        }
    }
}
