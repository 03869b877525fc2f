// SPDX-License-Identifier: GPL-3.0-only

//! Stream request query strings

use std::collections::BTreeMap;

/// Key/value pairs from a request query, in key order
pub type QueryParams = BTreeMap<String, String>;

/// Split `a=1&b=2` into pairs; pairs without `=` are dropped
pub fn parse_query(query: Option<&str>) -> QueryParams {
    let mut params = QueryParams::new();
    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(key.to_string(), value.to_string());
        }
    }
    params
}

/// Width and height requested in the query, when both are present and numeric
pub fn requested_size(params: &QueryParams) -> Option<(u32, u32)> {
    let width = params.get("width")?.parse::<u32>().ok()?;
    let height = params.get("height")?.parse::<u32>().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Split a request URI into path and optional query
///
/// Accepts either a bare `/path?query` or a full `rtsp://host:port/path?query`.
pub fn split_request_uri(uri: &str) -> (String, Option<String>) {
    let without_scheme = match uri.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(slash) => &rest[slash..],
            None => "/",
        },
        None => uri,
    };

    match without_scheme.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (without_scheme.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn width_and_height_are_parsed() {
        assert_eq!(
            parse_query(Some("width=640&height=480")),
            params(&[("width", "640"), ("height", "480")])
        );
    }

    #[test]
    fn pairs_without_equals_are_dropped() {
        assert_eq!(parse_query(Some("bad&width=640")), params(&[("width", "640")]));
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn requested_size_needs_both_dimensions() {
        assert_eq!(requested_size(&parse_query(Some("width=640&height=480"))), Some((640, 480)));
        assert_eq!(requested_size(&parse_query(Some("width=640"))), None);
        assert_eq!(requested_size(&parse_query(Some("width=wide&height=480"))), None);
    }

    #[test]
    fn request_uris_are_split() {
        assert_eq!(
            split_request_uri("rtsp://127.0.0.1:8554/video0?width=640&height=480"),
            ("/video0".to_string(), Some("width=640&height=480".to_string()))
        );
        assert_eq!(split_request_uri("/gazebo"), ("/gazebo".to_string(), None));
    }
}
