use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// A value to write into a tag.
///
/// Lists expand into one `-TAG=VALUE` argument per element, which is how
/// ExifTool appends to list-type tags such as `Keywords`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<TagValue>),
}

impl TagValue {
    /// The command-line values this tag expands to.
    pub fn values(&self) -> Vec<String> {
        match self {
            TagValue::List(items) => items.iter().map(ToString::to_string).collect(),
            scalar => vec![scalar.to_string()],
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Boolean(b) => write!(f, "{b}"),
            TagValue::Integer(n) => write!(f, "{n}"),
            TagValue::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            // Very large and very small magnitudes switch to exponent form: 1e+21, 1.5e-7
            TagValue::Number(n) if *n != 0.0 && (n.abs() >= 1e21 || n.abs() < 1e-6) => {
                let exp = format!("{n:e}");
                match exp.split_once('e') {
                    Some((mantissa, power)) if !power.starts_with('-') => {
                        write!(f, "{mantissa}e+{power}")
                    }
                    _ => f.write_str(&exp),
                }
            }
            // f64's Display is the shortest round-trip form: 40.7128, 5, -74.006
            TagValue::Number(n) => write!(f, "{n}"),
            TagValue::Text(s) => f.write_str(s),
            TagValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Boolean(b)
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Number(n)
    }
}

macro_rules! integer_tag_value {
    ($($t:ty),*) => {
        $(impl From<$t> for TagValue {
            fn from(n: $t) -> Self {
                TagValue::Integer(i64::from(n))
            }
        })*
    };
}

integer_tag_value!(i8, i16, i32, i64, u8, u16, u32);

impl<T: Into<TagValue>> From<Vec<T>> for TagValue {
    fn from(items: Vec<T>) -> Self {
        TagValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Tags to write, keyed by ExifTool tag name (`"Artist"`, `"EXIF:Copyright"`,
/// `"GPS:GPSLatitude"`, ...).
///
/// Insertion order is kept and becomes argument order. Inserting an existing
/// name replaces its value in place.
///
/// ```rust
/// use exiftool_vfs::exif::ExifTags;
///
/// let tags = ExifTags::new()
///     .with("Artist", "Jane Smith")
///     .with("Rating", 5)
///     .with("Keywords", vec!["landscape", "sunset"]);
/// assert_eq!(tags.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifTags {
    entries: Vec<(String, TagValue)>,
}

impl ExifTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TagValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ExifTool assignment arguments: `-NAME=VALUE`, one per list element.
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(name, value)| {
                value.values().into_iter().map(move |v| format!("-{name}={v}"))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for ExifTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = ExifTags::new();
        for (name, value) in iter {
            tags.insert(name, value);
        }
        tags
    }
}

impl Serialize for ExifTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExifTags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagsVisitor;

        impl<'de> Visitor<'de> for TagsVisitor {
            type Value = ExifTags;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ExifTags, A::Error> {
                let mut tags = ExifTags::new();
                while let Some((name, value)) = access.next_entry::<String, TagValue>()? {
                    tags.insert(name, value);
                }
                Ok(tags)
            }
        }

        deserializer.deserialize_map(TagsVisitor)
    }
}
