//! Reshape the link-keyed `users/{user}/locations` payload into
//! `location id -> { location, systems: { system id -> { system } } }`.
//!
//! Pure: no I/O, and a `BTreeMap` keeps iteration order stable.

use crate::models::carrier::{AtomLink, LocationsEnvelope, SELF_LINK_KEY, SystemsBody};
use crate::utils::{OneOrMany, decode_value};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    Shape { path: String, message: String },
    MissingSelfLink { path: String },
    MultipleSelfLinks { path: String, count: usize },
    BadHref { path: String, href: String },
    DuplicateId { path: String, id: String },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::Shape { path, message } => write!(f, "unexpected shape at {}: {}", path, message),
            NormalizeError::MissingSelfLink { path } => write!(f, "{} has no {}", path, SELF_LINK_KEY),
            NormalizeError::MultipleSelfLinks { path, count } => {
                write!(f, "{} has {} {} entries, expected exactly one", path, count, SELF_LINK_KEY)
            }
            NormalizeError::BadHref { path, href } => write!(f, "{} self-link has no trailing id: {:?}", path, href),
            NormalizeError::DuplicateId { path, id } => write!(f, "{} repeats id {}", path, id),
        }
    }
}

impl std::error::Error for NormalizeError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemEntry {
    pub system: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEntry {
    pub location: Value,
    pub systems: BTreeMap<String, SystemEntry>,
}

pub type Locations = BTreeMap<String, LocationEntry>;

/// Id of a resource: the last path segment of its single self-link `href`.
pub fn extract_self_link_id(resource: &Value, path: &str) -> Result<String, NormalizeError> {
    let raw = resource
        .get(SELF_LINK_KEY)
        .filter(|v| !v.is_null())
        .ok_or_else(|| NormalizeError::MissingSelfLink { path: path.to_string() })?;

    let links = decode_value::<OneOrMany<AtomLink>>(raw)
        .map_err(|(p, message)| NormalizeError::Shape {
            path: join_path(&format!("{}.{}", path, SELF_LINK_KEY), &p),
            message,
        })?
        .into_vec();

    let link = match links.as_slice() {
        [] => return Err(NormalizeError::MissingSelfLink { path: path.to_string() }),
        [only] => only,
        many => {
            return Err(NormalizeError::MultipleSelfLinks {
                path: path.to_string(),
                count: many.len(),
            });
        }
    };

    let href = link.attrs.href.as_str();
    match href.trim_end_matches('/').rsplit('/').next() {
        Some(id) if !id.is_empty() && id.len() < href.len() => Ok(id.to_string()),
        _ => Err(NormalizeError::BadHref {
            path: path.to_string(),
            href: href.to_string(),
        }),
    }
}

pub fn normalize_locations(payload: &Value) -> Result<Locations, NormalizeError> {
    let envelope: LocationsEnvelope = decode_value(payload).map_err(|(path, message)| NormalizeError::Shape {
        path: join_path("", &path),
        message,
    })?;

    let mut out = BTreeMap::new();
    let locations = envelope.locations.location.map(OneOrMany::into_vec).unwrap_or_default();
    for (i, location) in locations.into_iter().enumerate() {
        let path = format!("locations.location[{}]", i);
        let location_id = extract_self_link_id(&location, &path)?;
        let systems = normalize_systems(&location, &path)?;
        if out.contains_key(&location_id) {
            return Err(NormalizeError::DuplicateId { path, id: location_id });
        }
        out.insert(location_id, LocationEntry { location, systems });
    }
    Ok(out)
}

fn normalize_systems(location: &Value, location_path: &str) -> Result<BTreeMap<String, SystemEntry>, NormalizeError> {
    let mut out = BTreeMap::new();
    let Some(raw) = location.get("systems").filter(|v| !v.is_null()) else {
        return Ok(out);
    };
    let body: SystemsBody = decode_value(raw).map_err(|(p, message)| NormalizeError::Shape {
        path: join_path(&format!("{}.systems", location_path), &p),
        message,
    })?;

    let systems = body.system.map(OneOrMany::into_vec).unwrap_or_default();
    for (i, system) in systems.into_iter().enumerate() {
        let path = format!("{}.systems.system[{}]", location_path, i);
        let system_id = extract_self_link_id(&system, &path)?;
        if out.contains_key(&system_id) {
            return Err(NormalizeError::DuplicateId { path, id: system_id });
        }
        out.insert(system_id, SystemEntry { system });
    }
    Ok(out)
}

fn join_path(prefix: &str, inner: &str) -> String {
    match (prefix.is_empty(), inner.is_empty() || inner == ".") {
        (true, _) => inner.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}.{}", prefix, inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(href: &str) -> Value {
        json!({"$": {"href": href}})
    }

    #[test]
    fn extracts_trailing_segment_from_single_link() {
        let one_list = json!({"atom:link": [link("https://x/systems/abc123")]});
        assert_eq!(extract_self_link_id(&one_list, "r").unwrap(), "abc123");

        let bare = json!({"atom:link": link("https://x/locations/L9/")});
        assert_eq!(extract_self_link_id(&bare, "r").unwrap(), "L9");
    }

    #[test]
    fn rejects_zero_or_many_links() {
        let none = json!({"atom:link": []});
        assert_eq!(
            extract_self_link_id(&none, "r"),
            Err(NormalizeError::MissingSelfLink { path: "r".into() })
        );

        let absent = json!({"name": "x"});
        assert!(matches!(
            extract_self_link_id(&absent, "r"),
            Err(NormalizeError::MissingSelfLink { .. })
        ));

        let two = json!({"atom:link": [link("https://x/a"), link("https://x/b")]});
        assert_eq!(
            extract_self_link_id(&two, "r"),
            Err(NormalizeError::MultipleSelfLinks { path: "r".into(), count: 2 })
        );
    }

    #[test]
    fn rejects_href_without_segment() {
        let bad = json!({"atom:link": link("abc")});
        assert!(matches!(extract_self_link_id(&bad, "r"), Err(NormalizeError::BadHref { .. })));
        let no_href = json!({"atom:link": {"$": {"rel": "self"}}});
        assert!(matches!(extract_self_link_id(&no_href, "r"), Err(NormalizeError::Shape { .. })));
    }

    #[test]
    fn normalizes_minimal_payload() {
        let payload = json!({"locations":{"location":[{"atom:link":{"$":{"href":"https://x/locations/L1"}},"systems":{"system":[{"atom:link":{"$":{"href":"https://x/systems/S1"}}}]}}]}});
        let out = normalize_locations(&payload).unwrap();

        assert_eq!(out.len(), 1);
        let l1 = &out["L1"];
        assert_eq!(l1.location, payload["locations"]["location"][0]);
        assert_eq!(l1.systems.len(), 1);
        assert_eq!(
            l1.systems["S1"].system,
            payload["locations"]["location"][0]["systems"]["system"][0]
        );
    }

    #[test]
    fn normalizes_fixture_preserving_raw_attributes() {
        let json = std::fs::read_to_string("tests/data/locations.json").expect("fixture present");
        let payload: Value = serde_json::from_str(&json).unwrap();
        let out = normalize_locations(&payload).unwrap();

        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["L1", "L2"]);
        assert_eq!(out["L1"].systems.len(), 2);
        assert_eq!(out["L2"].systems.len(), 1);
        assert_eq!(out["L1"].location["city"], "Springfield");
        assert_eq!(out["L1"].systems["4321X654321"].system["name"], "Downstairs");
        assert_eq!(out["L2"].systems["9999Y000001"].system["name"], "Main");

        // deterministic
        assert_eq!(normalize_locations(&payload).unwrap(), out);
    }

    #[test]
    fn n_locations_with_m_systems() {
        let (n, m) = (3, 4);
        let locations = (0..n)
            .map(|i| {
                let systems = (0..m)
                    .map(|j| json!({"atom:link": link(&format!("https://x/systems/S{}-{}", i, j)), "idx": j}))
                    .collect::<Vec<_>>();
                json!({"atom:link": [link(&format!("https://x/locations/L{}", i))], "systems": {"system": systems}})
            })
            .collect::<Vec<_>>();
        let out = normalize_locations(&json!({"locations": {"location": locations}})).unwrap();

        assert_eq!(out.len(), n);
        for entry in out.values() {
            assert_eq!(entry.systems.len(), m);
        }
    }

    #[test]
    fn location_without_systems_is_empty() {
        let payload = json!({"locations": {"location": {"atom:link": link("https://x/locations/L1")}}});
        let out = normalize_locations(&payload).unwrap();
        assert!(out["L1"].systems.is_empty());

        let empty = json!({"locations": {}});
        assert!(normalize_locations(&empty).unwrap().is_empty());
    }

    #[test]
    fn reports_system_path_on_bad_link() {
        let payload = json!({"locations": {"location": [{
            "atom:link": link("https://x/locations/L1"),
            "systems": {"system": [{"atom:link": link("https://x/systems/S1")}, {"name": "orphan"}]}
        }]}});
        assert_eq!(
            normalize_locations(&payload),
            Err(NormalizeError::MissingSelfLink {
                path: "locations.location[0].systems.system[1]".into()
            })
        );
    }

    #[test]
    fn duplicate_ids_are_malformed() {
        let payload = json!({"locations": {"location": [
            {"atom:link": link("https://x/locations/L1")},
            {"atom:link": link("https://y/locations/L1")}
        ]}});
        assert!(matches!(normalize_locations(&payload), Err(NormalizeError::DuplicateId { .. })));
    }

    #[test]
    fn missing_envelope_is_a_shape_error() {
        assert!(matches!(
            normalize_locations(&json!({"locs": []})),
            Err(NormalizeError::Shape { .. })
        ));
    }
}
