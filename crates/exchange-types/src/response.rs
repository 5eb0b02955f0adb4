//! Response classification helpers.
//!
//! Responses are never parsed. A response is complete once the closing
//! root tag appears, and the summary below is a substring count over the
//! completed bytes.

use serde::{Deserialize, Serialize};

/// Closing tag of the `<results>` root element.
pub const RESULTS_MARKER: &str = "</results>";

/// Element counts found in a completed `<results>` document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub created: u32,
    pub opened: u32,
    pub status: u32,
    pub canceled: u32,
    pub errors: u32,
}

impl ResponseSummary {
    /// Count result elements in `bytes`.
    pub fn scan(bytes: &[u8]) -> Self {
        Self {
            created: count_tag(bytes, b"<created"),
            opened: count_tag(bytes, b"<opened"),
            status: count_tag(bytes, b"<status"),
            canceled: count_tag(bytes, b"<canceled"),
            errors: count_tag(bytes, b"<error"),
        }
    }

    /// Whether the server rejected at least one child of the request.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn total(&self) -> u32 {
        self.created + self.opened + self.status + self.canceled + self.errors
    }
}

/// Count occurrences of an opening tag, requiring the name to end right
/// after `tag` so `<status` does not match `<statuses`.
fn count_tag(haystack: &[u8], tag: &[u8]) -> u32 {
    if haystack.len() < tag.len() {
        return 0;
    }
    let mut count = 0;
    let mut i = 0;
    while i + tag.len() <= haystack.len() {
        if &haystack[i..i + tag.len()] == tag {
            let next = haystack.get(i + tag.len()).copied();
            if matches!(next, None | Some(b' ' | b'>' | b'/' | b'\t' | b'\n' | b'\r')) {
                count += 1;
            }
            i += tag.len();
        } else {
            i += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_counts_result_elements() {
        let body = br#"<results><created id="ACCT_1"/><created sym="SPY" id="ACCT_2"/><error id="ACCT_3">Account already exists</error><opened sym="SPY" amount="10" limit="12.5" id="4"/><status id="4"><open shares="10"/></status><canceled id="5"><canceled shares="3" time="1"/></canceled></results>"#;

        let summary = ResponseSummary::scan(body);

        assert_eq!(summary.created, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.opened, 1);
        assert_eq!(summary.status, 1);
        assert_eq!(summary.canceled, 2);
        assert_eq!(summary.total(), 7);
        assert!(summary.has_errors());
    }

    #[test]
    fn test_scan_ignores_longer_tag_names() {
        let summary = ResponseSummary::scan(b"<results><statuses/><errors/></results>");
        assert_eq!(summary, ResponseSummary::default());
    }

    #[test]
    fn test_scan_empty_input() {
        assert_eq!(ResponseSummary::scan(b""), ResponseSummary::default());
    }
}
