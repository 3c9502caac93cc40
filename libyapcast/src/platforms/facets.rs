//! Rich-text facet detection for Bluesky posts
//!
//! Bluesky marks links and mentions as facets over UTF-8 byte ranges of the
//! post text. Span detection is pure; turning mention spans into facets
//! needs a handle-to-DID resolution round trip, so the full detector is
//! async and takes a resolver. Mentions that do not resolve are left as
//! plain text rather than failing the post.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

/// Punctuation commonly glued to the end of a pasted URL
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '\'', '"'];

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("link regex"))
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A mention is an @handle at the start of the text or after whitespace;
    // handles look like domains (user.bsky.social)
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)(@[a-zA-Z0-9][a-zA-Z0-9.-]*\.[a-zA-Z]{2,})").expect("mention regex")
    })
}

/// A detected span, with byte offsets into the original text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSpan {
    pub byte_start: usize,
    pub byte_end: usize,
    pub feature: SpanFeature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanFeature {
    Link(String),
    /// Handle without the leading `@`
    Mention(String),
}

/// Resolves a handle to its DID; `None` when the handle is unknown.
#[async_trait]
pub trait MentionResolver: Send + Sync {
    async fn resolve_handle(&self, handle: &str) -> Option<String>;
}

/// Detect link and mention spans in `text`.
pub fn detect_spans(text: &str) -> Vec<FacetSpan> {
    let mut spans = Vec::new();

    for m in link_regex().find_iter(text) {
        let raw = m.as_str();
        let trimmed = raw.trim_end_matches(TRAILING_PUNCTUATION);
        if trimmed.is_empty() {
            continue;
        }
        spans.push(FacetSpan {
            byte_start: m.start(),
            byte_end: m.start() + trimmed.len(),
            feature: SpanFeature::Link(trimmed.to_string()),
        });
    }

    for cap in mention_regex().captures_iter(text) {
        if let Some(m) = cap.get(1) {
            let handle = m.as_str().trim_start_matches('@').to_string();
            spans.push(FacetSpan {
                byte_start: m.start(),
                byte_end: m.end(),
                feature: SpanFeature::Mention(handle),
            });
        }
    }

    spans.sort_by_key(|s| s.byte_start);
    spans
}

/// Detect spans and build AT-protocol facet objects, resolving mentions to
/// DIDs through `resolver`. Unresolvable mentions are skipped.
pub async fn detect_facets(
    text: &str,
    resolver: &dyn MentionResolver,
) -> Vec<serde_json::Value> {
    let mut facets = Vec::new();

    for span in detect_spans(text) {
        let feature = match &span.feature {
            SpanFeature::Link(uri) => serde_json::json!({
                "$type": "app.bsky.richtext.facet#link",
                "uri": uri,
            }),
            SpanFeature::Mention(handle) => match resolver.resolve_handle(handle).await {
                Some(did) => serde_json::json!({
                    "$type": "app.bsky.richtext.facet#mention",
                    "did": did,
                }),
                None => continue,
            },
        };

        facets.push(serde_json::json!({
            "index": {
                "byteStart": span.byte_start,
                "byteEnd": span.byte_end,
            },
            "features": [feature],
        }));
    }

    facets
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver;

    #[async_trait]
    impl MentionResolver for FixedResolver {
        async fn resolve_handle(&self, handle: &str) -> Option<String> {
            if handle == "alice.bsky.social" {
                Some("did:plc:alice123".to_string())
            } else {
                None
            }
        }
    }

    #[test]
    fn test_detect_link_span() {
        let spans = detect_spans("check https://example.com/page out");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].byte_start, 6);
        assert_eq!(spans[0].byte_end, 6 + "https://example.com/page".len());
        assert_eq!(
            spans[0].feature,
            SpanFeature::Link("https://example.com/page".to_string())
        );
    }

    #[test]
    fn test_link_trailing_punctuation_trimmed() {
        let spans = detect_spans("see https://example.com/page.");
        assert_eq!(
            spans[0].feature,
            SpanFeature::Link("https://example.com/page".to_string())
        );
        assert_eq!(spans[0].byte_end, "see https://example.com/page".len());
    }

    #[test]
    fn test_detect_mention_span() {
        let spans = detect_spans("hi @alice.bsky.social !");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].byte_start, 3);
        assert_eq!(
            spans[0].feature,
            SpanFeature::Mention("alice.bsky.social".to_string())
        );
    }

    #[test]
    fn test_mention_at_start_of_text() {
        let spans = detect_spans("@alice.bsky.social hello");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].byte_start, 0);
    }

    #[test]
    fn test_embedded_at_sign_is_not_a_mention() {
        let spans = detect_spans("mail me at someone@example.com today");
        assert!(spans.is_empty());
    }

    #[test]
    fn test_bare_at_word_is_not_a_mention() {
        // No domain-shaped suffix, so not a handle
        let spans = detect_spans("hello @everyone");
        assert!(spans.is_empty());
    }

    #[test]
    fn test_byte_offsets_with_multibyte_prefix() {
        let text = "🦀🦀 https://example.com";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        // Two 4-byte crabs plus a space
        assert_eq!(spans[0].byte_start, 9);
        assert_eq!(spans[0].byte_end, text.len());
    }

    #[test]
    fn test_spans_sorted_by_position() {
        let spans = detect_spans("@alice.bsky.social see https://example.com");
        assert_eq!(spans.len(), 2);
        assert!(spans[0].byte_start < spans[1].byte_start);
        assert!(matches!(spans[0].feature, SpanFeature::Mention(_)));
        assert!(matches!(spans[1].feature, SpanFeature::Link(_)));
    }

    #[tokio::test]
    async fn test_detect_facets_resolves_mentions() {
        let facets = detect_facets("cc @alice.bsky.social", &FixedResolver).await;
        assert_eq!(facets.len(), 1);
        assert_eq!(
            facets[0]["features"][0]["$type"],
            "app.bsky.richtext.facet#mention"
        );
        assert_eq!(facets[0]["features"][0]["did"], "did:plc:alice123");
        assert_eq!(facets[0]["index"]["byteStart"], 3);
    }

    #[tokio::test]
    async fn test_unresolvable_mention_skipped() {
        let facets = detect_facets("cc @nobody.example.com", &FixedResolver).await;
        assert!(facets.is_empty());
    }

    #[tokio::test]
    async fn test_links_need_no_resolution() {
        let facets = detect_facets("see https://example.com", &FixedResolver).await;
        assert_eq!(facets.len(), 1);
        assert_eq!(
            facets[0]["features"][0]["$type"],
            "app.bsky.richtext.facet#link"
        );
        assert_eq!(facets[0]["features"][0]["uri"], "https://example.com");
    }
}
