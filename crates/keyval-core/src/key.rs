//! Entry keys and their ordering

use std::cmp::Ordering;
use std::fmt;

/// A key in a storage area.
///
/// The variants are the key kinds IndexedDB accepts, and [`Ord`] follows its key
/// comparator: numbers sort before dates, dates before strings, strings before binary
/// keys and binary keys before arrays. Strings compare by UTF-16 code units, not by
/// UTF-8 bytes, so characters above the BMP sort the way a browser sorts them.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    /// Build a date key from milliseconds since the epoch.
    pub fn date(millis: f64) -> Self {
        Key::Date(millis)
    }

    /// Build an array key.
    pub fn array<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Key::Array(items.into_iter().map(Into::into).collect())
    }

    /// Whether an engine would accept this key. NaN numbers and dates are rejected,
    /// including when nested in an array.
    pub fn is_valid(&self) -> bool {
        match self {
            Key::Number(n) | Key::Date(n) => !n.is_nan(),
            Key::String(_) | Key::Binary(_) => true,
            Key::Array(items) => items.iter().all(Key::is_valid),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Binary(_) => 3,
            Key::Array(_) => 4,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) | (Key::Date(a), Key::Date(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{}", n),
            Key::Date(ms) => write!(f, "Date({})", ms),
            Key::String(s) => write!(f, "{:?}", s),
            Key::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::String(s.clone())
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::Binary(bytes)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_order() {
        let mut keys = vec![
            Key::array(["a"]),
            Key::Binary(vec![0]),
            Key::from("a"),
            Key::date(0.0),
            Key::from(100),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::from(100),
                Key::date(0.0),
                Key::from("a"),
                Key::Binary(vec![0]),
                Key::array(["a"]),
            ]
        );
    }

    #[test]
    fn test_numbers_sort_numerically() {
        let mut keys = vec![Key::from(10), Key::from(-1.5), Key::from(2)];
        keys.sort();
        assert_eq!(keys, vec![Key::from(-1.5), Key::from(2), Key::from(10)]);
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert_eq!(Key::from(-0.0), Key::from(0.0));
    }

    #[test]
    fn test_strings_compare_by_utf16_units() {
        // U+FF61 is a single unit 0xFF61; U+1F600 is the surrogate pair 0xD83D 0xDE00.
        let bmp = Key::from("\u{FF61}");
        let astral = Key::from("\u{1F600}");
        assert!(astral < bmp);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert!(Key::from("ab") < Key::from("abc"));
        assert!(Key::array([1, 2]) < Key::array([1, 2, 0]));
        assert!(Key::Binary(vec![1]) < Key::Binary(vec![1, 0]));
    }

    #[test]
    fn test_validity() {
        assert!(Key::from("x").is_valid());
        assert!(!Key::from(f64::NAN).is_valid());
        assert!(!Key::array([Key::from(1), Key::date(f64::NAN)]).is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(Key::array([Key::from(1), Key::from("x")]).to_string(), r#"[1, "x"]"#);
    }
}
