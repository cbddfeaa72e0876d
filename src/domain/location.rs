use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS-style longitude/latitude pair as returned by the map service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn checked(longitude: f64, latitude: f64) -> Option<Self> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);
        valid.then_some(Self {
            longitude,
            latitude,
        })
    }

    /// Parses the `"lng,lat"` form used throughout the AMAP APIs.
    pub fn parse_pair(raw: &str) -> Option<Self> {
        let (lng, lat) = raw.split_once(',')?;
        let longitude = lng.trim().parse::<f64>().ok()?;
        let latitude = lat.trim().parse::<f64>().ok()?;
        Self::checked(longitude, latitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.longitude, self.latitude)
    }
}

/// A place name paired with its coordinate once geocoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRef {
    name: String,
    coordinate: Option<Coordinate>,
}

impl LocationRef {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinate: None,
        }
    }

    pub fn resolved(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate: Some(coordinate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.coordinate
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinate.is_some()
    }

    /// Resolves the reference. A reference that is already resolved keeps its
    /// first coordinate and `false` is returned.
    pub fn resolve(&mut self, coordinate: Coordinate) -> bool {
        if self.coordinate.is_some() {
            return false;
        }
        self.coordinate = Some(coordinate);
        true
    }
}

/// Route strategy requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePreference {
    Fastest,
    Cheapest,
    Shortest,
    AvoidCongestion,
}

impl RoutePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutePreference::Fastest => "fastest",
            RoutePreference::Cheapest => "cheapest",
            RoutePreference::Shortest => "shortest",
            RoutePreference::AvoidCongestion => "avoid-congestion",
        }
    }

    /// Accepts the canonical names plus the numeric AMAP driving policies.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fastest" | "0" => Some(RoutePreference::Fastest),
            "cheapest" | "1" => Some(RoutePreference::Cheapest),
            "shortest" | "2" => Some(RoutePreference::Shortest),
            "avoid-congestion" | "4" => Some(RoutePreference::AvoidCongestion),
            _ => None,
        }
    }

    /// AMAP driving `policy` code.
    pub fn amap_policy(self) -> u8 {
        match self {
            RoutePreference::Fastest => 0,
            RoutePreference::Cheapest => 1,
            RoutePreference::Shortest => 2,
            RoutePreference::AvoidCongestion => 4,
        }
    }
}

impl fmt::Display for RoutePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
