use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Read, Write},
    os::fd::{IntoRawFd, RawFd},
    path::{Path, PathBuf},
};

pub const TASKS: &str = "tasks";

/// Size of the buffer a single control file line is read into. One byte is
/// reserved, so the longest line that can be read is `LINE_BUF_SIZE - 1`.
pub const LINE_BUF_SIZE: usize = 255;

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open { err: io::Error, path: PathBuf },
    #[error("failed to write {data} to {path}: {err}")]
    Write {
        err: io::Error,
        path: PathBuf,
        data: String,
    },
    #[error("short write to {path}: {written} of {} bytes of {data} accepted", .data.len())]
    ShortWrite {
        path: PathBuf,
        data: String,
        written: usize,
    },
    #[error("failed to read {path}: {err}")]
    Read { err: io::Error, path: PathBuf },
    #[error("line in {path} is longer than {limit} bytes")]
    LineTooLong { path: PathBuf, limit: usize },
    #[error("failed to create dir {path}: {err}")]
    CreateDir { err: io::Error, path: PathBuf },
    #[error("failed to remove dir {path}: {err}")]
    RemoveDir { err: io::Error, path: PathBuf },
    #[error("failed to close {path}: {err}")]
    Close { err: io::Error, path: PathBuf },
}

impl WrappedIoError {
    /// The underlying io error, if the failure came from a syscall.
    pub fn inner(&self) -> Option<&io::Error> {
        match self {
            WrappedIoError::Open { err, .. } => Some(err),
            WrappedIoError::Write { err, .. } => Some(err),
            WrappedIoError::Read { err, .. } => Some(err),
            WrappedIoError::CreateDir { err, .. } => Some(err),
            WrappedIoError::RemoveDir { err, .. } => Some(err),
            WrappedIoError::Close { err, .. } => Some(err),
            WrappedIoError::ShortWrite { .. } | WrappedIoError::LineTooLong { .. } => None,
        }
    }
}

/// Replaces the content of a control file with `data`. The file has to
/// exist already and the whole value must be accepted by a single write.
/// Errors reported by close(2) are returned as well.
#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    let data = data.to_string();

    let file = fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(true)
        .open(path)
        .wrap_open(path)?;
    write_once(file, path, data)
}

/// Appends `data` to a control file. For `tasks` every write adds one member.
#[inline]
pub fn append_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    let data = data.to_string();

    let file = fs::OpenOptions::new()
        .create(false)
        .append(true)
        .open(path)
        .wrap_open(path)?;
    write_once(file, path, data)
}

fn write_once(mut file: File, path: &Path, data: String) -> Result<(), WrappedIoError> {
    let written = file.write(data.as_bytes()).wrap_write(path, data.as_str())?;
    if written != data.len() {
        return Err(WrappedIoError::ShortWrite {
            path: path.to_path_buf(),
            data,
            written,
        });
    }

    close_fd(file.into_raw_fd(), path)
}

fn close_fd(fd: RawFd, path: &Path) -> Result<(), WrappedIoError> {
    nix::unistd::close(fd)
        .map_err(io::Error::from)
        .wrap_close(path)
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).wrap_read(path)
}

/// Reads the first line of a control file, including its trailing newline.
/// An empty file yields an empty string.
pub fn read_cgroup_line<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    let file = File::open(path).wrap_open(path)?;
    let mut reader = BufReader::with_capacity(LINE_BUF_SIZE, file);

    Ok(read_bounded_line(&mut reader, path)?.unwrap_or_default())
}

/// Reads every line of a control file and parses it with `parse`. Lines
/// which do not parse, blank lines included, are skipped.
pub fn read_cgroup_values<P, T>(
    path: P,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<T>, WrappedIoError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).wrap_open(path)?;
    let mut reader = BufReader::with_capacity(LINE_BUF_SIZE, file);

    let mut values = Vec::new();
    while let Some(line) = read_bounded_line(&mut reader, path)? {
        let line = line.trim();
        match parse(line) {
            Some(value) => values.push(value),
            None => tracing::trace!(?path, line, "skipping unparseable line"),
        }
    }

    Ok(values)
}

fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    path: &Path,
) -> Result<Option<String>, WrappedIoError> {
    let limit = LINE_BUF_SIZE - 1;
    let mut buf = Vec::with_capacity(LINE_BUF_SIZE);
    let read = reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut buf)
        .wrap_read(path)?;

    if read == 0 {
        return Ok(None);
    }

    if read == limit && buf.last() != Some(&b'\n') && !reader.fill_buf().wrap_read(path)?.is_empty()
    {
        return Err(WrappedIoError::LineTooLong {
            path: path.to_path_buf(),
            limit,
        });
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
        .wrap_read(path)
}

pub(crate) trait WrapIoResult {
    type Target;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_remove_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_close<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError>;
}

impl<T> WrapIoResult for Result<T, io::Error> {
    type Target = T;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::CreateDir {
            err,
            path: path.into(),
        })
    }

    fn wrap_remove_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::RemoveDir {
            err,
            path: path.into(),
        })
    }

    fn wrap_close<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Close {
            err,
            path: path.into(),
        })
    }

    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Read {
            err,
            path: path.into(),
        })
    }

    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Open {
            err,
            path: path.into(),
        })
    }

    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Write {
            err,
            path: path.into(),
            data: data.into(),
        })
    }
}
