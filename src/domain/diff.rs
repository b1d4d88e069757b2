use crate::error::{AppError, AppResult};

/// Text that opens every per-file block in `git diff` output.
pub const FILE_BOUNDARY: &str = "diff --git";
pub const LINE_BOUNDARY: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffText(String);

impl DiffText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the diff has nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.0.matches(FILE_BOUNDARY).count()
    }
}

/// Splits a diff into chunks of at most `max_length` bytes, keeping each file's
/// block whole when it fits and cutting oversized blocks on line boundaries.
///
/// A single line longer than `max_length` is hard-cut at the window edge, so
/// chunks only exceed the limit when one character is wider than the limit.
#[derive(Debug, Clone)]
pub struct DiffChunker {
    max_length: usize,
    line_marker: String,
}

impl DiffChunker {
    pub fn new(max_length: usize) -> AppResult<Self> {
        if max_length == 0 {
            return Err(AppError::Configuration(
                "max chunk length must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_length,
            line_marker: LINE_BOUNDARY.to_string(),
        })
    }

    /// Overrides the line separator searched for when a file block must be cut.
    pub fn with_line_marker(mut self, marker: impl Into<String>) -> AppResult<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(AppError::Configuration(
                "line boundary marker must not be empty".to_string(),
            ));
        }
        self.line_marker = marker;
        Ok(self)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Returns the chunks in diff order. The file marker itself is dropped from
    /// the output once the diff is long enough to need splitting.
    pub fn split(&self, diff: &str) -> Vec<String> {
        if diff.len() < self.max_length {
            return vec![diff.to_string()];
        }

        let mut chunks = Vec::new();
        for segment in diff
            .split(FILE_BOUNDARY)
            .filter(|segment| !segment.is_empty())
        {
            if segment.len() <= self.max_length {
                chunks.push(segment.to_string());
            } else {
                self.split_lines(segment, &mut chunks);
            }
        }
        chunks
    }

    fn split_lines(&self, segment: &str, chunks: &mut Vec<String>) {
        let mut rest = segment;
        while rest.len() > self.max_length {
            let window_end = floor_char_boundary(rest, self.max_length);
            let cut = match rest[..window_end].rfind(self.line_marker.as_str()) {
                Some(index) => index + self.line_marker.len(),
                // Always move forward, even if one character is wider than the window.
                None if window_end == 0 => ceil_char_boundary(rest, self.max_length),
                None => window_end,
            };
            let (head, tail) = rest.split_at(cut);
            chunks.push(head.to_string());
            rest = tail;
        }
        if !rest.is_empty() {
            chunks.push(rest.to_string());
        }
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
