use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufRead};

use crate::error::{Error, Result};

/// Parses a file of newline-delimited numbers using mmap, one chunk per
/// rayon thread. Lines that are not numbers are skipped.
pub fn read_file_mmap(file: &File) -> io::Result<Vec<f64>> {
    // SAFETY: the input file must not be truncated while it is mapped.
    let mmap = unsafe { Mmap::map(file)? };

    if mmap.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = chunk_bounds(&mmap, rayon::current_num_threads());
    tracing::debug!(bytes = mmap.len(), chunks = chunks.len(), "parsing mapped input");

    let results: Vec<Vec<f64>> = chunks
        .par_iter()
        .map(|&(start, end)| parse_chunk(&mmap[start..end]))
        .collect();

    Ok(results.into_iter().flatten().collect())
}

/// Reads numbers line by line, for input that cannot be mapped (stdin, pipes).
pub fn read_lines(reader: impl BufRead) -> io::Result<Vec<f64>> {
    let mut values = Vec::new();
    for line in reader.lines() {
        if let Some(v) = parse_line(line?.as_bytes()) {
            values.push(v);
        }
    }
    Ok(values)
}

/// Splits `buf` into at most `parts` ranges, each ending just after a newline
/// so no number is cut in half.
fn chunk_bounds(buf: &[u8], parts: usize) -> Vec<(usize, usize)> {
    let chunk_size = buf.len().div_ceil(parts.max(1));
    let mut boundaries = vec![0];
    for i in 1..parts {
        let mut pos = (i * chunk_size).max(*boundaries.last().unwrap_or(&0));
        if pos >= buf.len() {
            break;
        }
        while pos < buf.len() && buf[pos] != b'\n' {
            pos += 1;
        }
        if pos + 1 < buf.len() {
            boundaries.push(pos + 1);
        }
    }
    boundaries.push(buf.len());
    boundaries.dedup();
    boundaries.windows(2).map(|w| (w[0], w[1])).collect()
}

fn parse_chunk(chunk: &[u8]) -> Vec<f64> {
    chunk
        .split(|&b| b == b'\n')
        .filter_map(parse_line)
        .collect()
}

/// Decimal float or `0x` hex; `None` for blank or malformed lines.
fn parse_line(line: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(line.trim_ascii()).ok()?;
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok().map(|v| v as f64)
    } else {
        s.parse::<f64>().ok()
    }
}

/// Log-returns `ln(p[i] / p[i-1])` of a price series.
pub fn log_returns(prices: &[f64]) -> Result<Vec<f64>> {
    if let Some(p) = prices.iter().find(|p| !(**p > 0.0 && p.is_finite())) {
        return Err(Error::InvalidParameters(format!("prices must be positive, got {p}")));
    }
    Ok(prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}
