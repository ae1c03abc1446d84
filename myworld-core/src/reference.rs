/// Feature references and their URN form
///
/// A URN identifies one record: `[<datasource>/]<feature_type>/<id>` with an
/// optional `?name=value&name=value` qualifier suffix. The datasource prefix
/// is omitted for the myWorld datasource.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Name of the local, delta-aware datasource
pub const MYWORLD: &str = "myworld";

/// Identifies a feature record, optionally qualified
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub datasource: String,
    pub feature_type: String,
    pub id: String,
    pub qualifiers: BTreeMap<String, String>,
}

impl Reference {
    /// Create a reference into the myWorld datasource
    pub fn new(feature_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            datasource: MYWORLD.to_string(),
            feature_type: feature_type.into(),
            id: id.into(),
            qualifiers: BTreeMap::new(),
        }
    }

    pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.datasource = datasource.into();
        self
    }

    pub fn with_qualifier(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifiers.insert(name.into(), value.into());
        self
    }

    /// Parse a URN, failing on malformed input
    pub fn parse(urn: &str) -> Result<Self> {
        match Self::parse_urn(urn, MYWORLD, true)? {
            Some(reference) => Ok(reference),
            None => Err(Error::InvalidUrn(urn.to_string())),
        }
    }

    /// Parse a URN.
    ///
    /// The last path segment is the id and the one before it the feature
    /// type. A third leading segment overrides `default_datasource`. Any
    /// other segment count, or an empty segment, is malformed: that yields
    /// `Ok(None)`, or `Err(Error::InvalidUrn)` when `error_if_bad` is set.
    pub fn parse_urn(urn: &str, default_datasource: &str, error_if_bad: bool) -> Result<Option<Self>> {
        let (base, qualifier_str) = match urn.split_once('?') {
            Some((base, quals)) => (base, Some(quals)),
            None => (urn, None),
        };

        let parts: Vec<&str> = base.split('/').collect();
        let well_formed = (2..=3).contains(&parts.len()) && parts.iter().all(|p| !p.is_empty());
        if !well_formed {
            if error_if_bad {
                return Err(Error::InvalidUrn(urn.to_string()));
            }
            return Ok(None);
        }

        let id = parts[parts.len() - 1];
        let feature_type = parts[parts.len() - 2];
        let datasource = if parts.len() == 3 { parts[0] } else { default_datasource };

        let mut qualifiers = BTreeMap::new();
        if let Some(quals) = qualifier_str {
            for pair in quals.split('&').filter(|p| !p.is_empty()) {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                qualifiers.insert(name.to_string(), value.to_string());
            }
        }

        Ok(Some(Self {
            datasource: datasource.to_string(),
            feature_type: feature_type.to_string(),
            id: id.to_string(),
            qualifiers,
        }))
    }

    /// Build the URN string for this reference
    pub fn urn(&self, include_qualifiers: bool) -> String {
        let mut urn = String::new();
        if self.datasource != MYWORLD {
            urn.push_str(&self.datasource);
            urn.push('/');
        }
        urn.push_str(&self.feature_type);
        urn.push('/');
        urn.push_str(&self.id);

        if include_qualifiers && !self.qualifiers.is_empty() {
            let quals: Vec<String> = self
                .qualifiers
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            urn.push('?');
            urn.push_str(&quals.join("&"));
        }

        urn
    }

    pub fn is_myworld(&self) -> bool {
        self.datasource == MYWORLD
    }

    /// Fail unless this reference points into the myWorld datasource
    pub fn assert_myworld(&self) -> Result<()> {
        if self.is_myworld() {
            Ok(())
        } else {
            Err(Error::WrongDatasource(self.datasource.clone()))
        }
    }

    pub fn qualifier(&self, name: &str) -> Option<&str> {
        self.qualifiers.get(name).map(String::as_str)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn(true))
    }
}

impl FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.urn(true))
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let urn = String::deserialize(deserializer)?;
        Self::parse(&urn).map_err(serde::de::Error::custom)
    }
}

/// Anything a view can resolve to a record: URN strings or references
pub trait IntoReference {
    fn to_reference(&self, default_datasource: &str, error_if_bad: bool) -> Result<Option<Reference>>;
}

impl IntoReference for Reference {
    fn to_reference(&self, _default_datasource: &str, _error_if_bad: bool) -> Result<Option<Reference>> {
        Ok(Some(self.clone()))
    }
}

impl IntoReference for &Reference {
    fn to_reference(&self, _default_datasource: &str, _error_if_bad: bool) -> Result<Option<Reference>> {
        Ok(Some((*self).clone()))
    }
}

impl IntoReference for str {
    fn to_reference(&self, default_datasource: &str, error_if_bad: bool) -> Result<Option<Reference>> {
        Reference::parse_urn(self, default_datasource, error_if_bad)
    }
}

impl IntoReference for &str {
    fn to_reference(&self, default_datasource: &str, error_if_bad: bool) -> Result<Option<Reference>> {
        Reference::parse_urn(self, default_datasource, error_if_bad)
    }
}

impl IntoReference for String {
    fn to_reference(&self, default_datasource: &str, error_if_bad: bool) -> Result<Option<Reference>> {
        Reference::parse_urn(self, default_datasource, error_if_bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_datasource() {
        let r = Reference::parse_urn("layer/12", MYWORLD, false).unwrap().unwrap();
        assert_eq!(r.datasource, "myworld");
        assert_eq!(r.feature_type, "layer");
        assert_eq!(r.id, "12");

        let r = Reference::parse_urn("gis/layer/12", MYWORLD, false).unwrap().unwrap();
        assert_eq!(r.datasource, "gis");
        assert_eq!(r.urn(true), "gis/layer/12");
    }

    #[test]
    fn test_custom_default_datasource() {
        let r = Reference::parse_urn("pole/7", "esri", false).unwrap().unwrap();
        assert_eq!(r.datasource, "esri");
        assert_eq!(r.urn(true), "esri/pole/7");
    }

    #[test]
    fn test_malformed_urns() {
        for bad in ["justoneword", "", "a/b/c/d", "pole/", "/7", "ds//7"] {
            assert_eq!(Reference::parse_urn(bad, MYWORLD, false).unwrap(), None, "{}", bad);
            let err = Reference::parse_urn(bad, MYWORLD, true).unwrap_err();
            assert_eq!(err, Error::InvalidUrn(bad.to_string()));
        }
    }

    #[test]
    fn test_qualifiers() {
        // '/' inside a qualifier value belongs to the suffix, not the path
        let r: Reference = "pole/7?field=location&delta=design/1".parse().unwrap();
        assert_eq!(r.id, "7");
        assert_eq!(r.qualifier("field"), Some("location"));
        assert_eq!(r.qualifier("delta"), Some("design/1"));
        assert_eq!(r.urn(false), "pole/7");

        let reparsed = Reference::parse(&r.urn(true)).unwrap();
        assert_eq!(reparsed.qualifiers, r.qualifiers);
    }

    #[test]
    fn test_qualifier_without_value() {
        let r = Reference::parse("pole/7?flag").unwrap();
        assert_eq!(r.qualifier("flag"), Some(""));
    }

    #[test]
    fn test_assert_myworld() {
        assert!(Reference::new("pole", "1").assert_myworld().is_ok());
        let err = Reference::new("pole", "1")
            .with_datasource("gis")
            .assert_myworld()
            .unwrap_err();
        assert_eq!(err, Error::WrongDatasource("gis".into()));
    }

    #[test]
    fn test_serde_as_urn_string() {
        let r = Reference::new("pole", "1").with_datasource("gis");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"gis/pole/1\"");
        let back: Reference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,8}"
    }

    proptest! {
        #[test]
        fn prop_urn_round_trip(
            ds in proptest::option::of("[a-z]{2,6}"),
            ft in segment(),
            id in "[0-9]{1,6}",
        ) {
            let urn = match &ds {
                Some(ds) => format!("{}/{}/{}", ds, ft, id),
                None => format!("{}/{}", ft, id),
            };
            let parsed = Reference::parse(&urn).unwrap();
            prop_assert_eq!(parsed.urn(true), urn);
        }

        #[test]
        fn prop_qualifiers_survive_round_trip(
            ft in segment(),
            id in "[0-9]{1,6}",
            quals in proptest::collection::btree_map("[a-z]{1,5}", "[a-z0-9]{1,5}", 0..4),
        ) {
            let mut r = Reference::new(ft, id);
            for (k, v) in &quals {
                r = r.with_qualifier(k.clone(), v.clone());
            }
            let reparsed = Reference::parse(&r.urn(true)).unwrap();
            prop_assert_eq!(reparsed.qualifiers, quals);
        }
    }
}
