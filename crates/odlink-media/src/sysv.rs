//! Attach-only access to producer-owned shared-memory segments.
//!
//! The producer process creates the named semaphore and the SysV
//! segment and keeps ownership of both; this side only attaches,
//! copies, and detaches. Acquisition order is always
//! semaphore-then-read-then-release, enforced with scoped guards so
//! every exit path releases.

use std::ffi::CString;
use std::io;

use bytes::Bytes;
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::image::{PixelBuffer, SharedImage};
use crate::naming::{canonical_name, segment_key};

/// Bytes of producer-side segment header preceding the pixel data.
pub const SEGMENT_HEADER_LEN: usize = 4;

/// The seam between the dispatch engine and shared memory.
///
/// Dispatch tests substitute a mock implementation; production code
/// uses [`SysvMediaChannel`].
pub trait MediaChannel: Send + Sync {
    /// Fetch the pixel buffer a shared-image descriptor points at.
    fn fetch(&self, descriptor: &SharedImage) -> Result<PixelBuffer>;
}

/// Media channel backed by a POSIX named semaphore and a SysV segment.
#[derive(Debug, Default)]
pub struct SysvMediaChannel;

impl MediaChannel for SysvMediaChannel {
    fn fetch(&self, descriptor: &SharedImage) -> Result<PixelBuffer> {
        let canonical = canonical_name(&descriptor.name);
        let key = segment_key(&canonical);
        debug!(name = %canonical, key, size = descriptor.size, "fetching shared image");

        let total = SEGMENT_HEADER_LEN + descriptor.size as usize;
        let raw = {
            let sem = Semaphore::open(&canonical)?;
            let segment = Segment::locate(key)?;
            let _held = sem.acquire()?;
            let mapped = segment.attach()?;
            mapped.copy_out(total)?
            // Guards drop here: detach, release, close.
        };

        let pixels = Bytes::from(raw).slice(SEGMENT_HEADER_LEN..);
        PixelBuffer::new(
            descriptor.width,
            descriptor.height,
            descriptor.bytes_per_pixel,
            pixels,
        )
    }
}

fn sem_error(name: &str) -> MediaError {
    MediaError::Semaphore {
        name: name.to_string(),
        source: io::Error::last_os_error(),
    }
}

/// An open handle on the producer's named semaphore. Closed on drop.
struct Semaphore {
    sem: *mut libc::sem_t,
    name: String,
}

impl Semaphore {
    fn open(name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| MediaError::Semaphore {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "name contains a NUL byte"),
        })?;
        // SAFETY: c_name is NUL-terminated; oflag 0 opens an existing
        // semaphore and never creates one.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(sem_error(name));
        }
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    fn acquire(&self) -> Result<SemaphoreGuard<'_>> {
        // SAFETY: self.sem stays valid until sem_close in Drop.
        let rc = unsafe { libc::sem_wait(self.sem) };
        if rc != 0 {
            return Err(sem_error(&self.name));
        }
        Ok(SemaphoreGuard { owner: self })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: sem was returned by a successful sem_open.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// Holds the semaphore; releases it on drop.
struct SemaphoreGuard<'a> {
    owner: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only after a successful sem_wait.
        unsafe {
            libc::sem_post(self.owner.sem);
        }
    }
}

/// A located (but not yet attached) SysV segment.
struct Segment {
    id: i32,
    key: i32,
    size: usize,
}

impl Segment {
    fn locate(key: i32) -> Result<Self> {
        // SAFETY: size 0 and flags 0 only look up an existing segment.
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id < 0 {
            return Err(MediaError::Segment {
                key,
                source: io::Error::last_os_error(),
            });
        }

        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        // SAFETY: id refers to an existing segment and stat is a valid
        // shmid_ds out-parameter.
        let rc = unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) };
        if rc != 0 {
            return Err(MediaError::Segment {
                key,
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            id,
            key,
            size: stat.shm_segsz as usize,
        })
    }

    fn attach(&self) -> Result<Mapped> {
        // SAFETY: id refers to an existing segment; SHM_RDONLY maps it
        // read-only at a kernel-chosen address.
        let addr = unsafe { libc::shmat(self.id, std::ptr::null(), libc::SHM_RDONLY) };
        if addr == usize::MAX as *mut libc::c_void {
            return Err(MediaError::Segment {
                key: self.key,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Mapped {
            addr: addr as *const u8,
            key: self.key,
            size: self.size,
        })
    }
}

/// An attached segment mapping. Detached on drop.
struct Mapped {
    addr: *const u8,
    key: i32,
    size: usize,
}

impl Mapped {
    fn copy_out(&self, len: usize) -> Result<Vec<u8>> {
        if len > self.size {
            return Err(MediaError::Segment {
                key: self.key,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("segment is {} bytes, descriptor wants {len}", self.size),
                ),
            });
        }
        // SAFETY: addr points at an attached mapping of at least
        // `self.size` bytes, checked above.
        let raw = unsafe { std::slice::from_raw_parts(self.addr, len) };
        Ok(raw.to_vec())
    }
}

impl Drop for Mapped {
    fn drop(&mut self) {
        // SAFETY: addr was returned by a successful shmat.
        unsafe {
            libc::shmdt(self.addr as *const libc::c_void);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stands in for the external producer process: creates the
    /// semaphore and segment, fills the segment, cleans both up on drop.
    struct TestProducer {
        name: String,
        sem: *mut libc::sem_t,
        shmid: i32,
    }

    impl TestProducer {
        fn create(name: &str, pixels: &[u8]) -> Self {
            let canonical = canonical_name(name);
            let key = segment_key(&canonical);
            let c_name = CString::new(canonical.as_str()).unwrap();

            let sem = unsafe {
                libc::sem_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL, 0o600, 1)
            };
            assert_ne!(sem, libc::SEM_FAILED, "sem_open: {}", io::Error::last_os_error());

            let total = SEGMENT_HEADER_LEN + pixels.len();
            let shmid = unsafe { libc::shmget(key, total, libc::IPC_CREAT | 0o600) };
            assert!(shmid >= 0, "shmget: {}", io::Error::last_os_error());

            let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
            assert_ne!(addr, usize::MAX as *mut libc::c_void);
            unsafe {
                let dst = addr as *mut u8;
                // 4-byte segment header, then the pixel rows.
                std::ptr::write_bytes(dst, 0xEE, SEGMENT_HEADER_LEN);
                std::ptr::copy_nonoverlapping(
                    pixels.as_ptr(),
                    dst.add(SEGMENT_HEADER_LEN),
                    pixels.len(),
                );
                libc::shmdt(addr);
            }

            Self {
                name: canonical,
                sem,
                shmid,
            }
        }

        fn semaphore_is_free(&self) -> bool {
            let rc = unsafe { libc::sem_trywait(self.sem) };
            if rc == 0 {
                unsafe {
                    libc::sem_post(self.sem);
                }
                true
            } else {
                false
            }
        }
    }

    impl Drop for TestProducer {
        fn drop(&mut self) {
            let c_name = CString::new(self.name.as_str()).unwrap();
            unsafe {
                libc::sem_close(self.sem);
                libc::sem_unlink(c_name.as_ptr());
                libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
        }
    }

    fn unique_channel(tag: &str) -> String {
        // Canonical form must stay under the 14-byte cap.
        format!("o{}{}", tag, std::process::id() % 10000)
    }

    fn descriptor(name: &str, width: u32, height: u32, bpp: u32) -> SharedImage {
        SharedImage {
            name: name.to_string(),
            width,
            height,
            bytes_per_pixel: bpp,
            size: width * height * bpp,
        }
    }

    #[test]
    fn fetch_copies_pixels_past_the_segment_header() {
        let pixels: Vec<u8> = (0..24u8).collect();
        let channel = unique_channel("f");
        let producer = TestProducer::create(&channel, &pixels);

        let fetched = SysvMediaChannel
            .fetch(&descriptor(&channel, 4, 2, 3))
            .unwrap();

        assert_eq!(fetched.data(), pixels.as_slice());
        assert_eq!(fetched.row(0).unwrap(), &pixels[..12]);
        assert!(producer.semaphore_is_free());
    }

    #[test]
    fn failed_fetch_still_releases_the_semaphore() {
        let pixels = vec![0u8; 16];
        let channel = unique_channel("g");
        let producer = TestProducer::create(&channel, &pixels);

        // Declares more bytes than the segment holds; the failure
        // happens after the semaphore was acquired.
        let mut bad = descriptor(&channel, 100, 100, 4);
        bad.size = 100 * 100 * 4;
        let err = SysvMediaChannel.fetch(&bad).unwrap_err();
        assert!(matches!(err, MediaError::Segment { .. }));

        assert!(
            producer.semaphore_is_free(),
            "semaphore must not stay locked after a failed fetch"
        );
    }

    #[test]
    fn missing_producer_is_a_semaphore_error() {
        let err = SysvMediaChannel
            .fetch(&descriptor("nosuch", 2, 2, 1))
            .unwrap_err();
        assert!(matches!(err, MediaError::Semaphore { .. }));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let pixels = vec![7u8; 12];
        let channel = unique_channel("h");
        let _producer = TestProducer::create(&channel, &pixels);

        // Segment holds 12 pixel bytes but the descriptor claims 2x2x1
        // with size 12; the copy succeeds, validation fails.
        let mut bad = descriptor(&channel, 2, 2, 1);
        bad.size = 12;
        let err = SysvMediaChannel.fetch(&bad).unwrap_err();
        assert!(matches!(err, MediaError::SizeMismatch { .. }));
    }
}
