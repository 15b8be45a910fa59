use std::cmp::Ordering;

/// One run of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Digit run with leading zeros stripped.
    Number(String),
    /// Non-digit run, lowercased.
    Text(String),
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Number(a), Chunk::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key that orders embedded numbers by value: `file2 < file10`.
///
/// Digit runs of any length compare without overflow (by stripped length,
/// then digit by digit). Keys that are otherwise equal fall back to the raw
/// string so the order stays total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    chunks: Vec<Chunk>,
    raw: String,
}

impl NaturalKey {
    pub fn new(text: &str) -> Self {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in text.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                chunks.push(Self::finish(std::mem::take(&mut current), in_digits));
            }
            in_digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            chunks.push(Self::finish(current, in_digits));
        }

        Self {
            chunks,
            raw: text.to_string(),
        }
    }

    fn finish(run: String, digits: bool) -> Chunk {
        if digits {
            let trimmed = run.trim_start_matches('0');
            Chunk::Number(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
        } else {
            Chunk::Text(run.to_lowercase())
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chunks
            .cmp(&other.chunks)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort strings in natural order.
pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by_cached_key(|s| NaturalKey::new(s.as_ref()));
}
