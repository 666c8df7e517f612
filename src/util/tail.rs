// ABOUTME: Bounded tail reads for potentially large log files
// ABOUTME: Reads backwards in fixed-size blocks so memory stays proportional to the tail

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const BLOCK_SIZE: u64 = 8192;

/// Return the last `n` lines of `path`, without a trailing newline on any entry.
///
/// Missing files and unreadable content yield an empty list; bytes that are
/// not valid UTF-8 are replaced.
pub fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let Ok(mut file) = File::open(path) else {
        return Vec::new();
    };
    let Ok(len) = file.seek(SeekFrom::End(0)) else {
        return Vec::new();
    };
    if len == 0 {
        return Vec::new();
    }

    // Walk backwards block by block until enough newlines have been seen.
    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    while pos > 0 {
        let read_len = BLOCK_SIZE.min(pos);
        pos -= read_len;
        let mut block = vec![0u8; read_len as usize];
        if file.seek(SeekFrom::Start(pos)).is_err() || file.read_exact(&mut block).is_err() {
            return Vec::new();
        }
        block.extend_from_slice(&buf);
        buf = block;
        if buf.iter().filter(|&&b| b == b'\n').count() > n {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    if lines.len() > n {
        lines.drain(..lines.len() - n);
    }
    lines
}
