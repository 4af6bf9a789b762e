//! Volume file naming.
//!
//! RAR uses two naming schemes for multi-volume sets:
//!
//! - new style: `name.part1.rar`, `name.part2.rar`, ... (the width of the
//!   number is kept, so `part01` is followed by `part02`),
//! - old style: `name.rar`, `name.r00`, `name.r01`, ..., `name.r99`,
//!   `name.s00`, ...
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use rarkit::volume::next_volume_path;
//!
//! assert_eq!(
//!     next_volume_path(Path::new("backup.part09.rar")),
//!     Path::new("backup.part10.rar")
//! );
//! assert_eq!(next_volume_path(Path::new("backup.rar")), Path::new("backup.r00"));
//! assert_eq!(next_volume_path(Path::new("backup.r99")), Path::new("backup.s00"));
//! ```

use std::path::{Path, PathBuf};

/// Location of the volume number in a new-style name.
fn part_digits(name: &str) -> Option<(usize, usize)> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".rar")?;
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let start = stem.len() - digits;
    stem[..start].ends_with(".part").then_some((start, stem.len()))
}

/// Returns `true` if `path` uses the `name.partN.rar` scheme.
pub fn is_new_numbering(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| part_digits(name).is_some())
}

/// Increments an ASCII decimal number, keeping its width unless it overflows.
fn increment_digits(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    for b in bytes.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    let mut grown = String::with_capacity(bytes.len() + 1);
    grown.push('1');
    grown.push_str(&String::from_utf8_lossy(&bytes));
    grown
}

/// Computes the path of the volume following `path`.
pub fn next_volume_path(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return old_style_next(path);
    };
    if let Some((start, end)) = part_digits(name) {
        let next = format!(
            "{}{}{}",
            &name[..start],
            increment_digits(&name[start..end]),
            &name[end..]
        );
        return path.with_file_name(next);
    }
    old_style_next(path)
}

fn old_style_next(path: &Path) -> PathBuf {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let bytes = ext.as_bytes();
    let next = match bytes {
        [letter, d1, d2] if d1.is_ascii_digit() && d2.is_ascii_digit() => {
            let number = u32::from(d1 - b'0') * 10 + u32::from(d2 - b'0') + 1;
            if number < 100 {
                format!("{}{:02}", *letter as char, number)
            } else {
                format!("{}00", (*letter).wrapping_add(1) as char)
            }
        }
        [r, ..] if r.is_ascii_uppercase() => "R00".to_string(),
        _ => "r00".to_string(),
    };
    path.with_extension(next)
}
