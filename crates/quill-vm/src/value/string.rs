//! String payload with a lazily built rune view

use once_cell::unsync::OnceCell;

/// Immutable string; character indexing goes through a rune view that is
/// built on first use and cached
#[derive(Debug, Clone)]
pub struct StringObject {
    value: String,
    runes: OnceCell<Vec<char>>,
}

impl StringObject {
    pub fn new(value: String) -> Self {
        StringObject {
            value,
            runes: OnceCell::new(),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn runes(&self) -> &[char] {
        self.runes.get_or_init(|| self.value.chars().collect())
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.runes().len()
    }
}
