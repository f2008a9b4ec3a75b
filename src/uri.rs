//! Deep links: `matrix.to` web links and `matrix:` URIs into the web client's
//! `#/uri/...` route.

use std::sync::OnceLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use url::Url;

use crate::notify::strip_sigil;

/// Characters left alone when encoding a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'!')
    .remove(b'.')
    .remove(b'~')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

pub const MATRIX_TO_HOST: &str = "matrix.to";

fn fragment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/([@#!][^/]+)(?:/(\$[^/]+))?$").expect("valid regex"))
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Convert a `matrix.to` fragment (`#/@alice:example.org`,
/// `#/!room:example.org/$event`) into a `matrix:` URI.
///
/// The fragment is matched still encoded, so an escaped sigil (`%23room`)
/// does not match and existing escapes are encoded again.
pub fn normalize_fragment(fragment: &str) -> Option<String> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let caps = fragment_pattern().captures(fragment)?;

    let entity = caps.get(1)?.as_str();
    let kind = match entity.chars().next()? {
        '@' => "u",
        '#' => "r",
        '!' => "roomid",
        _ => return None,
    };
    let mut uri = format!("matrix:{kind}/{}", encode(strip_sigil(entity)));
    if let Some(event) = caps.get(2) {
        uri.push_str("/e/");
        uri.push_str(&encode(strip_sigil(event.as_str())));
    }
    Some(uri)
}

/// `None` unless `url` is a `matrix.to` link with a recognizable fragment.
pub fn matrix_to_uri(url: &Url) -> Option<String> {
    if url.host_str() != Some(MATRIX_TO_HOST) {
        return None;
    }
    normalize_fragment(url.fragment()?)
}

/// Web client URL that opens `target` (a `matrix:` URI or a `matrix.to`
/// link). `None` for anything else.
pub fn intent_url(server_url: &str, target: &str) -> Option<String> {
    let target = Url::parse(target).ok()?;
    let matrix_uri = match target.scheme() {
        "matrix" => target.as_str().to_string(),
        _ => {
            let converted = matrix_to_uri(&target);
            if converted.is_none() {
                tracing::warn!(%target, "Not a matrix: or matrix.to link");
            }
            converted?
        }
    };

    let mut server = match Url::parse(server_url) {
        Ok(server) => server,
        Err(e) => {
            tracing::warn!(server_url, error = %e, "Stored server URL does not parse");
            return None;
        }
    };
    server.set_fragment(Some(&format!("/uri/{}", encode(&matrix_uri))));
    tracing::debug!(%target, resolved = %server, "Converted view target");
    Some(server.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_fragment() {
        assert_eq!(
            normalize_fragment("#/@alice:example.org").as_deref(),
            Some("matrix:u/alice%3Aexample.org")
        );
    }

    #[test]
    fn test_room_with_event() {
        assert_eq!(
            normalize_fragment("#/!roomid:example.org/$event123").as_deref(),
            Some("matrix:roomid/roomid%3Aexample.org/e/event123")
        );
    }

    #[test]
    fn test_escapes_are_matched_as_is() {
        assert_eq!(
            normalize_fragment("#/@a%2Fb").as_deref(),
            Some("matrix:u/a%252Fb")
        );
        assert_eq!(normalize_fragment("/%23room%3Aexample.org"), None);
    }

    #[test]
    fn test_alias_fragment() {
        assert_eq!(
            normalize_fragment("/#room:example.org").as_deref(),
            Some("matrix:r/room%3Aexample.org")
        );
    }

    #[test]
    fn test_unmatched_fragments() {
        for fragment in ["", "#/", "#/alice:example.org", "#/@alice/extra", "#/!r:x/notevent", "/@a/$e/more"] {
            assert_eq!(normalize_fragment(fragment), None, "{fragment}");
        }
    }

    #[test]
    fn test_matrix_to_url() {
        let url = Url::parse("https://matrix.to/#/@alice:example.org").unwrap();
        assert_eq!(matrix_to_uri(&url).as_deref(), Some("matrix:u/alice%3Aexample.org"));

        let other = Url::parse("https://example.org/#/@alice:example.org").unwrap();
        assert_eq!(matrix_to_uri(&other), None);
    }

    #[test]
    fn test_intent_url() {
        let resolved = intent_url("https://gomuks.example", "https://matrix.to/#/@alice:example.org");
        assert_eq!(
            resolved.as_deref(),
            Some("https://gomuks.example/#/uri/matrix%3Au%2Falice%253Aexample.org")
        );

        let direct = intent_url("https://gomuks.example/app/", "matrix:r/room%3Aexample.org");
        assert_eq!(
            direct.as_deref(),
            Some("https://gomuks.example/app/#/uri/matrix%3Ar%2Froom%253Aexample.org")
        );

        assert_eq!(intent_url("https://gomuks.example", "https://example.org/"), None);
        assert_eq!(intent_url("https://gomuks.example", "not a url"), None);
    }
}
