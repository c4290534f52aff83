/*!
 * Inline String
 * Bounded kernel names stored without heap allocation when short
 */

use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use std::fmt;

/// Inline-optimized string used for team/thread names and error details
///
/// Strings of up to 23 bytes live inline. Kernel names are additionally
/// bounded with [`InlineString::truncated`], which never splits a UTF-8
/// character.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct InlineString {
    inner: SmartString,
}

impl InlineString {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmartString::new(),
        }
    }

    /// Copy at most `max_bytes` of `s`, cutting at the last char boundary
    /// that fits
    pub fn truncated(s: &str, max_bytes: usize) -> Self {
        if s.len() <= max_bytes {
            return Self::from(s);
        }

        let mut end = max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Self::from(&s[..end])
    }

    /// Join `parts` with single spaces, bounded like [`InlineString::truncated`]
    pub fn joined<S: AsRef<str>>(parts: &[S], max_bytes: usize) -> Self {
        let mut joined = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                joined.push(' ');
            }
            joined.push_str(part.as_ref());
            if joined.len() > max_bytes {
                break;
            }
        }
        Self::truncated(&joined, max_bytes)
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// Check if string is stored inline (no heap allocation)
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.inner.is_inline()
    }
}

impl From<&str> for InlineString {
    #[inline]
    fn from(s: &str) -> Self {
        Self {
            inner: SmartString::from(s),
        }
    }
}

impl From<String> for InlineString {
    #[inline]
    fn from(s: String) -> Self {
        Self {
            inner: SmartString::from(s),
        }
    }
}

impl From<InlineString> for String {
    #[inline]
    fn from(s: InlineString) -> Self {
        s.inner.into()
    }
}

impl AsRef<str> for InlineString {
    #[inline(always)]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::ops::Deref for InlineString {
    type Target = str;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for InlineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for InlineString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for InlineString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
