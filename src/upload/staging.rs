// Staging: copy one slice of the source archive into a private scratch file.
//
// Workers never share a read cursor. Each read names its absolute offset,
// so concurrent reads over disjoint ranges need no locking.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use super::plan::Slice;

const COPY_BUF_SIZE: usize = 1024 * 1024;

/// The archive being uploaded, opened once and shared by every worker.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl SourceFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(SourceFile {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fill `buf` from the absolute position `offset` without touching any
    /// shared file position.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_exact_at(&self.file, buf, offset)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// One slice materialized on disk.
///
/// The scratch file is deleted when this value is dropped, whichever way
/// the upload attempt ends.
#[derive(Debug)]
pub struct StagedSlice {
    index: usize,
    len: u64,
    file: NamedTempFile,
}

impl StagedSlice {
    /// Copy `slice` out of `source` into a fresh scratch file in `dir`.
    pub fn stage(source: &SourceFile, slice: &Slice, dir: &Path) -> io::Result<Self> {
        let mut file = Builder::new()
            .prefix("slice-")
            .suffix(".partial")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            let mut buf = vec![0u8; COPY_BUF_SIZE.min(slice.length as usize)];
            let mut pos = slice.offset;
            while pos < slice.end() {
                let n = (slice.end() - pos).min(buf.len() as u64) as usize;
                source.read_exact_at(&mut buf[..n], pos)?;
                writer.write_all(&buf[..n])?;
                pos += n as u64;
            }
            writer.flush()?;
        }

        tracing::debug!(
            index = slice.index,
            bytes = slice.length,
            scratch = %file.path().display(),
            "staged slice"
        );
        Ok(StagedSlice {
            index: slice.index,
            len: slice.length,
            file,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// A fresh read handle positioned at the start of the staged bytes.
    pub fn reader(&self) -> io::Result<File> {
        self.file.reopen()
    }
}
