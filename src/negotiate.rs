//! Matching candidate locales against the supported set.

use std::str::FromStr;

use unic_langid::LanguageIdentifier;

use crate::{LocaleTag, SupportedLocales};

/// Returns the supported tag matching the first satisfiable candidate.
///
/// A candidate is satisfied by a supported tag that is equal to it, or, if the
/// candidate carries a region, by a supported tag equal to its language alone
/// (`fr_FR` is satisfied by `fr`). A language-only candidate never matches a
/// regional tag (`fr` is not satisfied by `fr_CA`).
///
/// Comparison is case-insensitive and accepts both `-` and `_` as
/// separators. Candidates that are not language identifiers are skipped.
///
/// # Example
///
/// ```
/// use poem_locale::{negotiate, SupportedLocales};
///
/// let supported = SupportedLocales::parse(["en", "fr", "es_ES"]).unwrap();
/// assert_eq!(negotiate(["de", "fr-FR", "en"], &supported).unwrap(), "fr");
/// assert_eq!(negotiate(["es"], &supported), None);
/// ```
pub fn negotiate<I, S>(candidates: I, supported: &SupportedLocales) -> Option<LocaleTag>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if supported.is_empty() {
        return None;
    }

    let available = supported
        .iter()
        .map(|tag| (tag.to_langid(), tag))
        .collect::<Vec<_>>();

    candidates.into_iter().find_map(|candidate| {
        let requested = parse_langid(candidate.as_ref())?;
        find_exact(&available, &requested).or_else(|| {
            if requested.region.is_none() {
                return None;
            }
            let language_only = LanguageIdentifier::from_parts(requested.language, None, None, &[]);
            find_exact(&available, &language_only)
        })
    })
}

fn parse_langid(value: &str) -> Option<LanguageIdentifier> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    LanguageIdentifier::from_str(&value.replace('_', "-")).ok()
}

fn find_exact(
    available: &[(LanguageIdentifier, &LocaleTag)],
    requested: &LanguageIdentifier,
) -> Option<LocaleTag> {
    available
        .iter()
        .find(|(langid, _)| langid == requested)
        .map(|(_, tag)| (*tag).clone())
}
