//! File-backed image store using binary PGM (`P5`) images.
//!
//! Input images are read from `<input_dir>/<name>.pgm`; snapshots are
//! written to `<output_dir>/<name>.pgm`. Pixels are one byte each, `255`
//! for alive and `0` for dead.

use std::path::PathBuf;

use lifegrid_core::io::{ImageStore, IoError};
use tracing::debug;

const MAGIC: &[u8] = b"P5";
const MAX_VALUE: usize = 255;

/// [`ImageStore`] over a pair of directories.
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    /// Create a store reading from `input_dir` and writing to `output_dir`.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir.join(format!("{name}.pgm"))
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.pgm"))
    }
}

impl ImageStore for PgmStore {
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Vec<u8>, IoError> {
        let path = self.input_path(name);
        let data = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound {
                    name: path.display().to_string(),
                }
            } else {
                IoError::Read {
                    name: name.to_owned(),
                    source,
                }
            }
        })?;
        debug!(path = %path.display(), bytes = data.len(), "Image read");
        decode(&data, width, height).map_err(|reason| IoError::Format {
            name: name.to_owned(),
            reason,
        })
    }

    fn save(&mut self, name: &str, width: usize, height: usize, bytes: &[u8]) -> Result<(), IoError> {
        let write_err = |source| IoError::Write {
            name: name.to_owned(),
            source,
        };
        std::fs::create_dir_all(&self.output_dir).map_err(write_err)?;
        let path = self.output_path(name);
        std::fs::write(&path, encode(width, height, bytes)).map_err(write_err)?;
        debug!(path = %path.display(), "Image written");
        Ok(())
    }
}

/// Encode pixels as a binary PGM image.
pub fn encode(width: usize, height: usize, pixels: &[u8]) -> Vec<u8> {
    let mut out = format!("P5\n{width} {height}\n{MAX_VALUE}\n").into_bytes();
    out.extend_from_slice(pixels);
    out
}

/// Decode a binary PGM image, checking it is exactly `width` by `height`.
///
/// Returns the reason on failure.
pub fn decode(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>, String> {
    let mut header = Header { data, pos: 0 };

    if header.token() != Some(MAGIC) {
        return Err(String::from("not a binary PGM (missing P5 magic)"));
    }
    let (Some(w), Some(h), Some(max)) = (header.number(), header.number(), header.number()) else {
        return Err(String::from("truncated or malformed header"));
    };
    if (w, h) != (width, height) {
        return Err(format!("expected {width}x{height}, found {w}x{h}"));
    }
    if max != MAX_VALUE {
        return Err(format!("unsupported max value {max}"));
    }

    // A single whitespace byte separates the header from the pixels.
    let start = header.pos.saturating_add(1);
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| String::from("image dimensions overflow"))?;
    let end = start.saturating_add(expected);
    data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
        format!(
            "expected {expected} pixel bytes, found {}",
            data.len().saturating_sub(start)
        )
    })
}

/// Cursor over the ASCII header of a PGM image.
struct Header<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    fn skip_separators(&mut self) {
        while let Some(&byte) = self.data.get(self.pos) {
            if byte.is_ascii_whitespace() {
                self.pos = self.pos.saturating_add(1);
            } else if byte == b'#' {
                // Comment runs to end of line.
                while let Some(&c) = self.data.get(self.pos) {
                    self.pos = self.pos.saturating_add(1);
                    if c == b'\n' {
                        break;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn token(&mut self) -> Option<&'a [u8]> {
        self.skip_separators();
        let start = self.pos;
        while self
            .data
            .get(self.pos)
            .is_some_and(|byte| !byte.is_ascii_whitespace())
        {
            self.pos = self.pos.saturating_add(1);
        }
        self.data.get(start..self.pos).filter(|token| !token.is_empty())
    }

    fn number(&mut self) -> Option<usize> {
        std::str::from_utf8(self.token()?).ok()?.parse().ok()
    }
}
