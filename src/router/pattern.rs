//! Path patterns: `/item/:id` style templates compiled to anchored regexes.

use std::collections::BTreeMap;

use regex::Regex;

use crate::router::error::RouteError;

#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl PathPattern {
    /// Compile `pattern`. Each `:name` segment becomes a named capture that
    /// matches one non-empty path segment; everything else matches literally.
    pub fn compile(pattern: &str) -> Result<Self, RouteError> {
        let mut expr = String::from("^");
        let mut params = Vec::new();

        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                expr.push('/');
            }
            match segment.strip_prefix(':') {
                Some(name) => {
                    expr.push_str(&format!("(?P<{}>[^/]+)", name));
                    params.push(name.to_string());
                }
                None => expr.push_str(&regex::escape(segment)),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern has no parameters.
    pub fn is_literal(&self) -> bool {
        self.params.is_empty()
    }

    /// Match a path (no query string) and extract its parameters,
    /// percent-decoded.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), decode(m.as_str())))
                })
                .collect(),
        )
    }
}

/// Percent-decode `raw`. Input that does not decode to UTF-8 is kept as is.
fn decode(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(err) => {
            tracing::debug!(input = %raw, error = %err, "Keeping undecodable URL component");
            raw.to_string()
        }
    }
}

/// Query keys and values also treat `+` as a space.
fn decode_query(raw: &str) -> String {
    decode(&raw.replace('+', " "))
}

/// Split `location` into its path and parsed query string.
///
/// Keys and values are percent-decoded. Later duplicates of a query key
/// win. A key with no `=` maps to "".
pub fn split_location(location: &str) -> (&str, BTreeMap<String, String>) {
    let location = location.split_once('#').map_or(location, |(l, _)| l);
    let (path, query) = location.split_once('?').unwrap_or((location, ""));

    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_query(k), decode_query(v)),
            None => (decode_query(pair), String::new()),
        })
        .collect();
    (path, params)
}
