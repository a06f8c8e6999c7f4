//! Pure path and content utilities shared by every backend.
//!
//! All virtual paths are absolute, forward-slash separated, and free of
//! `.`/`..` segments after [`normalize`].

use std::path::{Path, PathBuf};

use crate::backend::{EditError, PathError};

/// Longest line rendered by [`format_with_line_numbers`] before truncation.
pub const MAX_LINE_LENGTH: usize = 2000;
const LINE_NUMBER_WIDTH: usize = 6;

/// Normalize a virtual path: absolute, no `.`/`..`, no repeated
/// separators, case preserved.
///
/// `~` and drive-letter prefixes are rejected as traversal; `..` segments
/// resolve textually and must not escape the root.
pub fn normalize(path: &str) -> Result<String, PathError> {
    if path.starts_with('~') {
        return Err(PathError::Traversal(path.to_string()));
    }
    let forward = path.replace('\\', "/");
    let bytes = forward.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(PathError::Traversal(path.to_string()));
    }
    if !forward.starts_with('/') {
        return Err(PathError::NotAbsolute(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in forward.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::PathOutsideRoot(path.to_string()));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Join a normalized virtual path onto an OS-native root, rejecting escape.
pub fn safe_join(root: &Path, path: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize(path)?;
    let relative = normalized.trim_start_matches('/');
    if relative.is_empty() {
        return Ok(root.to_path_buf());
    }
    Ok(root.join(relative))
}

/// Apply an exact string replacement; returns the new content and the
/// replacement count.
pub fn apply_edit(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<(String, usize), EditError> {
    if old.is_empty() {
        return Err(EditError::EmptyOldString);
    }
    if old == new {
        return Err(EditError::NoChange);
    }
    let count = content.matches(old).count();
    if count == 0 {
        return Err(EditError::OldNotFound);
    }
    if count > 1 && !replace_all {
        return Err(EditError::OldNotUnique(count));
    }
    if replace_all {
        Ok((content.replace(old, new), count))
    } else {
        Ok((content.replacen(old, new, 1), 1))
    }
}

/// Doublestar glob match: `**` spans zero or more segments, `*` matches
/// within a segment, `?` matches one character.
pub fn doublestar_match(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if match_segments(&pattern[1..], path) {
                return true;
            }
            !path.is_empty() && match_segments(pattern, &path[1..])
        }
        Some(segment) => {
            !path.is_empty()
                && match_segment(segment, path[0])
                && match_segments(&pattern[1..], &path[1..])
        }
    }
}

fn match_segment(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            Some('?') => !t.is_empty() && go(&p[1..], &t[1..]),
            Some(&c) => t.first() == Some(&c) && go(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}

/// Whether `path` under `root` matches a glob `pattern`.
///
/// Absolute patterns match against the full path; relative patterns match
/// against the path relative to `root`.
pub fn glob_matches(pattern: &str, root: &str, path: &str) -> bool {
    if pattern.starts_with('/') {
        return doublestar_match(pattern, path);
    }
    let Some(relative) = relative_to(root, path) else {
        return false;
    };
    doublestar_match(pattern, &relative)
}

/// `path` relative to directory `root`, if `path` lies beneath it.
pub fn relative_to(root: &str, path: &str) -> Option<String> {
    if root == "/" {
        return Some(path.trim_start_matches('/').to_string());
    }
    let prefix = format!("{}/", root.trim_end_matches('/'));
    path.strip_prefix(&prefix).map(str::to_string)
}

/// Whether `path` is `dir` itself or lies beneath it.
pub fn is_under(dir: &str, path: &str) -> bool {
    dir == "/" || path == dir || path.starts_with(&format!("{}/", dir.trim_end_matches('/')))
}

/// Byte-addressed slice of UTF-8 content, clamped to char boundaries.
pub fn byte_slice(content: &str, offset: usize, limit: Option<usize>) -> &str {
    if offset >= content.len() {
        return "";
    }
    let mut start = offset;
    while !content.is_char_boundary(start) {
        start += 1;
    }
    let mut end = match limit {
        Some(limit) => (start + limit).min(content.len()),
        None => content.len(),
    };
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    if end < start {
        return "";
    }
    &content[start..end]
}

/// Slice a line range out of content. `offset` is 0-based.
pub fn slice_lines(content: &str, offset: usize, limit: usize) -> Vec<&str> {
    content.lines().skip(offset).take(limit).collect()
}

/// Render lines in `cat -n` format with 1-based numbering starting at
/// `offset + 1`; long lines are truncated.
pub fn format_with_line_numbers(lines: &[&str], offset: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line = if line.len() > MAX_LINE_LENGTH {
                byte_slice(line, 0, Some(MAX_LINE_LENGTH))
            } else {
                line
            };
            format!("{:>width$}\t{}", offset + i + 1, line, width = LINE_NUMBER_WIDTH)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
