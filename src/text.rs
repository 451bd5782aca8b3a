use crate::util;
use serde::{Deserialize, Serialize, Serializer};

/// A string that stores its length in UTF-16 code units.
///
/// All integer positions in a document count UTF-16 units, so text nodes keep
/// that length around instead of recomputing it on every size query.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub struct Text {
    len_utf16: usize,
    content: String,
}

impl Text {
    /// Return the contained string
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// The length of this string if it were encoded in UTF-16
    pub fn len_utf16(&self) -> usize {
        self.len_utf16
    }

    /// Join two texts together
    pub fn join(&self, other: &Self) -> Self {
        let left = &self.content;
        let right = &other.content;
        let mut content = String::with_capacity(left.len() + right.len());
        content.push_str(left);
        content.push_str(right);
        let len_utf16 = self.len_utf16 + other.len_utf16;
        Text { content, len_utf16 }
    }

    /// The substring between two UTF-16 offsets, as a new `Text`.
    pub fn cut(&self, from: usize, to: usize) -> Self {
        let (_, rest) = util::split_at_utf16(&self.content, from);
        let (mid, _) = util::split_at_utf16(rest, to - from);
        Text::from(mid.to_owned())
    }
}

impl From<String> for Text {
    fn from(src: String) -> Text {
        Text {
            len_utf16: src.encode_utf16().count(),
            content: src,
        }
    }
}

impl From<&str> for Text {
    fn from(src: &str) -> Text {
        Text::from(src.to_owned())
    }
}

impl Serialize for Text {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.content.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Text;

    #[test]
    fn tracks_utf16_length() {
        assert_eq!(Text::from("Hello").len_utf16(), 5);
        assert_eq!(Text::from("\u{1F60A}").len_utf16(), 2);
        let joined = Text::from("a\u{1F60A}").join(&Text::from("b"));
        assert_eq!(joined.as_str(), "a\u{1F60A}b");
        assert_eq!(joined.len_utf16(), 4);
    }

    #[test]
    fn cut_takes_a_range() {
        let text = Text::from("hello world");
        assert_eq!(text.cut(6, 11).as_str(), "world");
        assert_eq!(text.cut(0, 5).as_str(), "hello");
    }
}
