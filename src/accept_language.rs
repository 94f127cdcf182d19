//! Parsing of the `Accept-Language` request header.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use smallvec::SmallVec;

use crate::LocaleTag;

// language-tag [ ";" "q" "=" qvalue ], e.g. `es-ES  ;  q  =  0.123`
static RE_ACCEPT_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-zA-Z]{1,8}(?:-[a-zA-Z0-9]{1,8})?)\s*(?:;\s*q\s*=\s*((?:1|0)(?:\.[0-9]+)?))?")
        .expect("valid accept-language pattern")
});

/// Relative preference of a candidate, `q * 100` rounded down.
pub type QualityWeight = u8;

/// The weighted candidates parsed from one `Accept-Language` header.
///
/// Candidates keep the order in which they first appear in the header. A tag
/// that appears more than once keeps the weight of its last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptLanguage {
    candidates: SmallVec<[(LocaleTag, QualityWeight); 8]>,
}

impl AcceptLanguage {
    /// Parses a header value, returns `None` if the value is empty.
    ///
    /// Tags that do not normalize to `ll` or `ll_RR` are dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use poem_locale::AcceptLanguage;
    ///
    /// let accept = AcceptLanguage::parse("en-US,en;q=0.8,es-es;q=0.5").unwrap();
    /// assert_eq!(accept.weight("en_US"), Some(100));
    /// assert_eq!(accept.weight("en"), Some(80));
    /// assert_eq!(accept.weight("es_ES"), Some(50));
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }

        let mut candidates = SmallVec::<[(LocaleTag, QualityWeight); 8]>::new();

        for captures in RE_ACCEPT_LANGUAGE.captures_iter(value) {
            let Some((tag, weight)) = parse_candidate(&captures) else {
                continue;
            };
            match candidates.iter_mut().find(|(existing, _)| *existing == tag) {
                Some((_, existing_weight)) => *existing_weight = weight,
                None => candidates.push((tag, weight)),
            }
        }

        Some(Self { candidates })
    }

    /// Returns the candidates in header order.
    #[inline]
    pub fn candidates(&self) -> &[(LocaleTag, QualityWeight)] {
        &self.candidates
    }

    /// Returns the weight of `tag`, if it was present in the header.
    pub fn weight(&self, tag: &str) -> Option<QualityWeight> {
        self.candidates
            .iter()
            .find(|(candidate, _)| candidate == tag)
            .map(|(_, weight)| *weight)
    }

    /// Returns the number of candidates.
    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns `true` if no candidate survived parsing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Returns the tags ordered by descending weight.
    ///
    /// Candidates with equal weights keep their header order.
    pub fn sorted(&self) -> SmallVec<[LocaleTag; 8]> {
        let mut candidates = self.candidates.clone();
        candidates.sort_by(|(_, a), (_, b)| b.cmp(a));
        candidates.into_iter().map(|(tag, _)| tag).collect()
    }
}

fn parse_candidate(captures: &Captures<'_>) -> Option<(LocaleTag, QualityWeight)> {
    let tag = LocaleTag::normalize(captures.get(1)?.as_str())?;
    let weight = match captures.get(2) {
        Some(quality) => parse_quality(quality.as_str()),
        None => 100,
    };
    Some((tag, weight))
}

/// Scales a q-value such as `0.85` to `85` without going through floating
/// point. Digits past the second decimal are truncated.
fn parse_quality(value: &str) -> QualityWeight {
    let (integer, fraction) = value.split_once('.').unwrap_or((value, ""));
    let mut digits = fraction.bytes().map(|b| b - b'0').chain(std::iter::repeat(0));
    let tenths = digits.next().unwrap_or_default();
    let hundredths = digits.next().unwrap_or_default();

    let weight = match integer {
        "1" => 100 + u32::from(tenths) * 10 + u32::from(hundredths),
        _ => u32::from(tenths) * 10 + u32::from(hundredths),
    };
    weight.min(100) as QualityWeight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(accept: &AcceptLanguage) -> Vec<&str> {
        accept
            .candidates()
            .iter()
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    #[test]
    fn test_parse_accept_language() {
        let accept = AcceptLanguage::parse("en-US,en;q=0.8,es-es;q=0.5").unwrap();
        assert_eq!(accept.len(), 3);
        assert_eq!(accept.weight("en_US"), Some(100));
        assert_eq!(accept.weight("en"), Some(80));
        assert_eq!(accept.weight("es_ES"), Some(50));

        let accept = AcceptLanguage::parse("zh-CN ; q=0.5,en-US;q = 0.7,   fr;q=0.3").unwrap();
        assert_eq!(tags(&accept), vec!["zh_CN", "en_US", "fr"]);
        assert_eq!(accept.weight("en_US"), Some(70));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(AcceptLanguage::parse(""), None);
        assert!(AcceptLanguage::parse("*").unwrap().is_empty());
    }

    #[test]
    fn test_drop_malformed_tags() {
        let accept = AcceptLanguage::parse("xx-yyyy").unwrap();
        assert_eq!(accept.weight("xx_YYYY"), None);
        assert!(accept.is_empty());

        let accept = AcceptLanguage::parse("deu,fil;q=0.9,fr-CA;q=0.4").unwrap();
        assert_eq!(tags(&accept), vec!["fr_CA"]);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let accept = AcceptLanguage::parse("en;q=0.2,fr;q=0.5,EN;q=0.9").unwrap();
        assert_eq!(tags(&accept), vec!["en", "fr"]);
        assert_eq!(accept.weight("en"), Some(90));
    }

    #[test]
    fn test_quality() {
        assert_eq!(parse_quality("1"), 100);
        assert_eq!(parse_quality("1.0"), 100);
        assert_eq!(parse_quality("1.5"), 100);
        assert_eq!(parse_quality("0"), 0);
        assert_eq!(parse_quality("0.29"), 29);
        assert_eq!(parse_quality("0.5"), 50);
        assert_eq!(parse_quality("0.999"), 99);
        assert_eq!(parse_quality("0.05"), 5);
    }

    #[test]
    fn test_sorted() {
        let accept = AcceptLanguage::parse("fr;q=0.3,en-US;q=0.7,zh-CN,de;q=0.7").unwrap();
        assert_eq!(
            accept
                .sorted()
                .iter()
                .map(LocaleTag::as_str)
                .collect::<Vec<_>>(),
            vec!["zh_CN", "en_US", "de", "fr"]
        );
    }
}
