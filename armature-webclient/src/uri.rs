//! URI template expansion and base URL resolution.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashMap;
use url::Url;

use crate::{Result, WebClientError};

/// Everything except RFC 3986 unreserved characters.
const STRICT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Values for the `{name}` variables of a URI template.
#[derive(Debug, Clone, Default)]
pub(crate) enum UriVariables {
    /// No explicit values; only defaults apply.
    #[default]
    None,
    /// Values consumed in order of occurrence.
    Positional(Vec<String>),
    /// Values looked up by variable name.
    Named(HashMap<String, String>),
}

/// Expand the variables of a template, percent-encoding each value.
///
/// Variables are `{name}` or `{name:pattern}`; the pattern is ignored.
/// Unresolved names fall back to `defaults`.
pub(crate) fn expand(
    template: &str,
    variables: &UriVariables,
    defaults: &HashMap<String, String>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut position = 0;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = closing_brace(after).ok_or_else(|| {
            WebClientError::InvalidRequestState(format!(
                "Unbalanced '{{' in URI template '{}'",
                template
            ))
        })?;
        let variable = &after[..end];
        let name = variable.split(':').next().unwrap_or_default().trim();

        let value = match variables {
            UriVariables::Positional(values) => {
                let value = values.get(position).map(String::as_str);
                position += 1;
                value
            }
            UriVariables::Named(values) => values.get(name).map(String::as_str),
            UriVariables::None => None,
        }
        .or_else(|| defaults.get(name).map(String::as_str))
        .ok_or_else(|| {
            WebClientError::InvalidRequestState(format!(
                "No value for URI variable '{}' in '{}'",
                name, template
            ))
        })?;

        out.extend(utf8_percent_encode(value, STRICT));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Resolve an expanded URI against an optional base URL.
///
/// Absolute URIs are used as-is. Relative URIs are appended to the base
/// URL's path; the base query is kept ahead of the relative one.
pub(crate) fn resolve(base: Option<&Url>, uri: &str) -> Result<Url> {
    match Url::parse(uri) {
        Ok(url) => return Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(WebClientError::InvalidUri(format!("{}: {}", uri, e))),
    }

    let base = base.ok_or_else(|| {
        WebClientError::InvalidUri(format!("Relative URI '{}' without a base URL", uri))
    })?;

    let (path, suffix) = uri.split_at(uri.find(['?', '#']).unwrap_or(uri.len()));
    let (query, fragment) = match suffix.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (suffix, None),
    };
    let query = query.strip_prefix('?').filter(|q| !q.is_empty());

    let mut root = base.clone();
    root.set_query(None);
    root.set_fragment(None);
    let mut joined = root.as_str().trim_end_matches('/').to_string();
    if !path.is_empty() {
        joined.push('/');
        joined.push_str(path.trim_start_matches('/'));
    }
    let mut url = Url::parse(&joined)
        .map_err(|e| WebClientError::InvalidUri(format!("{}: {}", joined, e)))?;

    let merged = match (base.query(), query) {
        (Some(base_query), Some(query)) => Some(format!("{}&{}", base_query, query)),
        (base_query, query) => base_query.or(query).map(str::to_string),
    };
    url.set_query(merged.as_deref());
    url.set_fragment(fragment);
    Ok(url)
}

/// Parse a base URL.
pub(crate) fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| WebClientError::InvalidUri(format!("{}: {}", base, e)))
}

/// Append query parameters, encoding them as form values.
pub(crate) fn append_query(url: &mut Url, params: &[(String, String)]) {
    if params.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in params {
        pairs.append_pair(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_positional() {
        let vars = UriVariables::Positional(vec!["42".into(), "a b/c".into()]);
        let uri = expand("/users/{id}/files/{name}", &vars, &HashMap::new()).unwrap();
        assert_eq!(uri, "/users/42/files/a%20b%2Fc");
    }

    #[test]
    fn test_expand_named_with_pattern_and_defaults() {
        let vars = UriVariables::Named(named(&[("id", "7")]));
        let defaults = named(&[("version", "v2"), ("id", "ignored")]);
        let uri = expand("/{version}/items/{id:\\d{1,3}}", &vars, &defaults).unwrap();
        assert_eq!(uri, "/v2/items/7");
    }

    #[test]
    fn test_expand_missing_value() {
        let err = expand("/users/{id}", &UriVariables::None, &HashMap::new()).unwrap_err();
        assert!(matches!(err, WebClientError::InvalidRequestState(_)));

        let err = expand("/users/{id", &UriVariables::None, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("Unbalanced"));
    }

    #[test]
    fn test_expand_keeps_unreserved() {
        let vars = UriVariables::Positional(vec!["a-b.c_d~e".into()]);
        assert_eq!(expand("{x}", &vars, &HashMap::new()).unwrap(), "a-b.c_d~e");
    }

    #[test]
    fn test_resolve() {
        let base = parse_base("http://localhost:8080/api/").unwrap();
        assert_eq!(
            resolve(Some(&base), "/users").unwrap().as_str(),
            "http://localhost:8080/api/users"
        );
        assert_eq!(
            resolve(Some(&base), "users?x=1").unwrap().as_str(),
            "http://localhost:8080/api/users?x=1"
        );
        assert_eq!(
            resolve(Some(&base), "https://other.example/a").unwrap().as_str(),
            "https://other.example/a"
        );
        assert_eq!(
            resolve(Some(&base), "?page=2#top").unwrap().as_str(),
            "http://localhost:8080/api?page=2#top"
        );
        assert!(matches!(
            resolve(None, "/users"),
            Err(WebClientError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_resolve_keeps_base_query() {
        let base = parse_base("http://h/api?k=1#frag").unwrap();
        assert_eq!(
            resolve(Some(&base), "/users").unwrap().as_str(),
            "http://h/api/users?k=1"
        );
        assert_eq!(
            resolve(Some(&base), "users?x=2").unwrap().as_str(),
            "http://h/api/users?k=1&x=2"
        );
    }

    #[test]
    fn test_append_query() {
        let mut url = Url::parse("http://localhost/search?a=1").unwrap();
        append_query(&mut url, &[("q".into(), "x y".into())]);
        assert_eq!(url.as_str(), "http://localhost/search?a=1&q=x+y");
    }
}
