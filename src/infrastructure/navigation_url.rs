//! AMAP URI-API navigation links.

use crate::constants::{NAVIGATION_BASE_URL, NAVIGATION_SOURCE};
use crate::domain::{LocationRef, RoutePreference};
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("location '{name}' has no coordinate yet")]
    Unresolved { name: String },
    #[error("invalid navigation base URL: {0}")]
    Base(String),
}

/// Builds a driving navigation link between two resolved locations.
pub fn navigation_url(
    origin: &LocationRef,
    destination: &LocationRef,
    preference: RoutePreference,
) -> Result<Url, UrlError> {
    let from = endpoint_param(origin)?;
    let to = endpoint_param(destination)?;
    let policy = preference.amap_policy().to_string();
    Url::parse_with_params(
        NAVIGATION_BASE_URL,
        &[
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("mode", "car"),
            ("policy", policy.as_str()),
            ("src", NAVIGATION_SOURCE),
            ("coordinate", "gaode"),
            ("callnative", "0"),
        ],
    )
    .map_err(|err| UrlError::Base(err.to_string()))
}

fn endpoint_param(location: &LocationRef) -> Result<String, UrlError> {
    let coordinate = location.coordinate().ok_or_else(|| UrlError::Unresolved {
        name: location.name().to_string(),
    })?;
    Ok(format!("{coordinate},{}", location.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coordinate;

    fn beijing() -> LocationRef {
        LocationRef::resolved(
            "北京",
            Coordinate::checked(116.397128, 39.916527).expect("valid"),
        )
    }

    #[test]
    fn builds_amap_navigation_link() {
        let shanghai = LocationRef::resolved(
            "上海",
            Coordinate::checked(121.473701, 31.230416).expect("valid"),
        );
        let url = navigation_url(&beijing(), &shanghai, RoutePreference::AvoidCongestion)
            .expect("url");
        assert_eq!(url.host_str(), Some("uri.amap.com"));
        assert_eq!(url.path(), "/navigation");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(get("from"), Some("116.397128,39.916527,北京"));
        assert_eq!(get("to"), Some("121.473701,31.230416,上海"));
        assert_eq!(get("mode"), Some("car"));
        assert_eq!(get("policy"), Some("4"));
        assert_eq!(get("callnative"), Some("0"));
    }

    #[test]
    fn unresolved_side_is_rejected() {
        let err = navigation_url(
            &beijing(),
            &LocationRef::unresolved("上海"),
            RoutePreference::Fastest,
        )
        .unwrap_err();
        assert_eq!(
            err,
            UrlError::Unresolved {
                name: "上海".into()
            }
        );
    }
}
