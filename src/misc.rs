use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use tracing::{debug, warn};

use crate::constant::*;

/// Counters of a line-oriented stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    pub read: u64,
    pub skipped: u64,
    pub emitted: u64,
}

impl LineStats {
    /// Count a malformed line; only the first few are logged.
    pub fn skip(&mut self, what: &str, reason: impl std::fmt::Display) {
        self.skipped += 1;
        if self.skipped <= MALFORMED_LOG_LIMIT {
            warn!("skip {what} at line {}: {reason}", self.read);
        } else if self.skipped == MALFORMED_LOG_LIMIT + 1 {
            warn!("more malformed {what} lines, no longer logging them");
        }
    }
}

/// Feed every line of `reader` to `f`, newline and trailing `\r` removed.
/// Invalid UTF-8 is replaced rather than failing the stream.
pub fn for_each_line<R, F>(mut reader: R, mut f: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(&str) -> Result<()>,
{
    let mut buf = Vec::with_capacity(64 * 1024);
    let mut count = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).context("read input line fail")? == 0 {
            break;
        }
        count += 1;
        let mut end = buf.len();
        if buf[..end].ends_with(b"\n") { end -= 1 }
        if buf[..end].ends_with(b"\r") { end -= 1 }
        f(&String::from_utf8_lossy(&buf[..end]))?;
    }
    Ok(count)
}

/// Open a dump or data file, decompressing `.bz2` on the fly. `-` is stdin.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }
    let fd = fs::File::open(path).with_context(|| format!("can not open {}", path.display()))?;
    let is_bz2 = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));
    debug!("open {} (bz2: {is_bz2})", path.display());
    Ok(if is_bz2 {
        Box::new(BufReader::with_capacity(1 << 20, MultiBzDecoder::new(fd)))
    } else {
        Box::new(BufReader::with_capacity(1 << 20, fd))
    })
}
