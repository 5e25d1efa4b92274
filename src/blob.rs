//! [`Blob`], the owned-byte-buffer type threaded through every codec in
//! this crate: loaded files, instrument patches, PCM samples, and the
//! intermediate outputs codecs hand to each other.

use crate::error::LibResult;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Mega Drive cartridges can't address more than this much sample or
/// pattern data at once; every loader in this crate enforces it up front
/// so a corrupt or hostile length field can't drive an unbounded
/// allocation.
pub const MAX_BLOB_SIZE: u64 = 4 * 1024 * 1024;

/// An owned byte buffer with a known length and no implicit terminator.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    /// Reads an entire file into a `Blob`, rejecting it outright if it
    /// exceeds [`MAX_BLOB_SIZE`] rather than reading it and failing later.
    pub fn load<P: AsRef<Path>>(path: P) -> LibResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|source| {
            crate::error::LibError::IoOpen {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let size = file
            .metadata()
            .map_err(|source| crate::error::LibError::IoOpen {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if size > MAX_BLOB_SIZE {
            return crate::error::FileTooLarge {
                size,
                limit: MAX_BLOB_SIZE,
            }
            .fail();
        }
        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data).context_io()?;
        Ok(Self { data })
    }

    /// Writes `data` to `path` in one shot, opened fresh (truncating any
    /// existing file), the output-side counterpart to [`Blob::load`].
    pub fn save<P: AsRef<Path>>(path: P, data: &[u8]) -> LibResult<()> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(|source| crate::error::LibError::IoOpen {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(data).context_io()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

trait ContextIo<T> {
    fn context_io(self) -> LibResult<T>;
}

impl<T> ContextIo<T> for std::io::Result<T> {
    fn context_io(self) -> LibResult<T> {
        self.map_err(|source| crate::error::LibError::IoWrite {
            site: site!(),
            source,
        })
    }
}

#[test]
fn blob_roundtrips_bytes() {
    let blob = Blob::new(vec![1, 2, 3]);
    assert_eq!(blob.as_slice(), &[1, 2, 3]);
    assert_eq!(blob.len(), 3);
}

#[test]
fn blob_rejects_oversized_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Sparse-write past the limit without actually allocating 4 MiB+1 in memory.
    file.as_file_mut().set_len(MAX_BLOB_SIZE + 1).unwrap();
    file.flush().unwrap();
    let result = Blob::load(file.path());
    assert!(result.is_err());
}
