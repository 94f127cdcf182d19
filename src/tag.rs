use std::{
    fmt::{self, Display, Formatter},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use unic_langid::LanguageIdentifier;

use crate::error::InvalidLocaleTag;

/// The tag used when localization is disabled or every other source failed.
pub const FALLBACK_TAG: &str = "en";

/// A normalized locale tag.
///
/// A tag is either a two-letter language (`en`) or a language and a region
/// joined by an underscore (`es_ES`). The language part is always lowercase
/// and the region part always uppercase.
///
/// # Example
///
/// ```
/// use poem_locale::LocaleTag;
///
/// assert_eq!(LocaleTag::normalize("es-es").unwrap().as_str(), "es_ES");
/// assert_eq!(LocaleTag::normalize("EN").unwrap().as_str(), "en");
/// assert!(LocaleTag::normalize("deu").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocaleTag(Arc<str>);

impl LocaleTag {
    /// Normalizes `value` into a tag, returns `None` if it has neither the
    /// `ll` nor the `ll_RR` shape.
    ///
    /// Both `-` and `_` are accepted as separators. The region must be two
    /// letters, numeric regions such as `419` are rejected.
    pub fn normalize(value: &str) -> Option<Self> {
        let value = value.replace('-', "_");
        let bytes = value.as_bytes();

        match bytes.len() {
            2 if bytes.iter().all(u8::is_ascii_alphabetic) => {
                Some(Self(value.to_ascii_lowercase().into()))
            }
            5 if bytes[2] == b'_'
                && bytes[..2].iter().all(u8::is_ascii_alphabetic)
                && bytes[3..].iter().all(u8::is_ascii_alphabetic) =>
            {
                let tag = format!(
                    "{}_{}",
                    value[..2].to_ascii_lowercase(),
                    value[3..].to_ascii_uppercase()
                );
                Some(Self(tag.into()))
            }
            _ => None,
        }
    }

    /// Returns the fallback tag (`en`).
    pub fn fallback() -> Self {
        Self(FALLBACK_TAG.into())
    }

    /// Returns the tag as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the language part of the tag.
    #[inline]
    pub fn language(&self) -> &str {
        &self.0[..2]
    }

    /// Returns the region part of the tag, if any.
    #[inline]
    pub fn region(&self) -> Option<&str> {
        self.0.get(3..)
    }

    /// Converts this tag to a [`LanguageIdentifier`].
    pub fn to_langid(&self) -> LanguageIdentifier {
        // Both shapes are valid BCP 47 identifiers once the separator is a dash.
        LanguageIdentifier::from_str(&self.0.replace('_', "-"))
            .unwrap_or_else(|_| LanguageIdentifier::default())
    }
}

impl Display for LocaleTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for LocaleTag {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for LocaleTag {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for LocaleTag {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for LocaleTag {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl FromStr for LocaleTag {
    type Err = InvalidLocaleTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| InvalidLocaleTag(s.to_string()))
    }
}

impl Serialize for LocaleTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LocaleTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// The ordered list of locales an application supports.
///
/// The first entry is the default locale. An empty list disables
/// localization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedLocales(Arc<[LocaleTag]>);

impl SupportedLocales {
    /// Create a list from already normalized tags.
    ///
    /// Duplicates are removed, keeping the first occurrence.
    pub fn new(tags: impl IntoIterator<Item = LocaleTag>) -> Self {
        let mut list: Vec<LocaleTag> = Vec::new();
        for tag in tags {
            if !list.contains(&tag) {
                list.push(tag);
            }
        }
        Self(list.into())
    }

    /// Parses every entry of `tags`, failing on the first malformed one.
    pub fn parse<I, S>(tags: I) -> Result<Self, InvalidLocaleTag>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().parse())
            .collect::<Result<Vec<LocaleTag>, _>>()?;
        Ok(Self::new(tags))
    }

    /// Returns `true` if localization is disabled.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of supported locales.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the default locale.
    #[inline]
    pub fn default_tag(&self) -> Option<&LocaleTag> {
        self.0.first()
    }

    /// Returns the supported tag that is exactly equal to `value`.
    pub fn find(&self, value: &str) -> Option<&LocaleTag> {
        self.0.iter().find(|tag| tag.as_str() == value)
    }

    /// Returns `true` if `value` is exactly one of the supported tags.
    #[inline]
    pub fn contains(&self, value: &str) -> bool {
        self.find(value).is_some()
    }

    /// Returns an iterator over the supported tags.
    pub fn iter(&self) -> impl Iterator<Item = &LocaleTag> {
        self.0.iter()
    }

    /// Returns the tags as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[LocaleTag] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a SupportedLocales {
    type Item = &'a LocaleTag;
    type IntoIter = std::slice::Iter<'a, LocaleTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
