//! Report header parsing.
//!
//! Intelligence-style reports carry their metadata in the first few lines:
//!
//! ```text
//! SECRET // NOFORN
//! REPORT ID: SR-2026-0113
//! DATE: 2026-01-13
//! PRECEDENCE: IMMEDIATE
//! ZONE: SECTOR 7 (NORTH)
//! PREPARED BY: 3rd Recon Battalion
//! ```
//!
//! All patterns are case-insensitive and only the header window is scanned.
//! Free-text fields stop at the end of their line.

use regex::Regex;
use shared_types::DocumentMetadata;
use std::sync::LazyLock;

/// Characters of content treated as the header.
pub const HEADER_CHARS: usize = 500;

static RE_CLASSIFICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:SECRET|TOP SECRET|CONFIDENTIAL|UNCLASSIFIED)(?:[ \t]*//[ \t]*[A-Z \t]+)?")
        .expect("valid classification pattern")
});

static RE_REPORT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:REPORT\s+ID|SITREP|SIG)[\s:]+([A-Z0-9\-]+)").expect("valid report id pattern")
});

// Tried in order; the first hit wins.
static RE_DATES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)DATE:\s*(\d{4}-\d{2}-\d{2})").expect("valid iso date pattern"),
        Regex::new(r"(?i)(?:DATE|DTG):\s*(\d{1,2}\s+[A-Z]{3}\s+\d{4})").expect("valid dtg pattern"),
        Regex::new(r"(?i)(\d{1,2}\s+[A-Z]{3}\s+\d{4})").expect("valid bare date pattern"),
    ]
});

static RE_PRECEDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PRECEDENCE:[ \t]*([A-Z \t]+(?:\([^)]+\))?)").expect("valid precedence pattern")
});

static RE_ZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ZONE:[ \t]*([A-Z0-9 \t]+(?:\([^)]+\))?)").expect("valid zone pattern")
});

static RE_AUTHORING_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PREPARED BY:\s*([^\n]+)").expect("valid authoring unit pattern"));

/// Extract header metadata from document content.
///
/// Returns an empty `DocumentMetadata` when nothing matches.
#[must_use]
pub fn extract_metadata(content: &str) -> DocumentMetadata {
    let header = header_window(content);

    DocumentMetadata {
        classification: RE_CLASSIFICATION
            .find(header)
            .map(|m| m.as_str().trim().to_string()),
        report_id: capture(&RE_REPORT_ID, header),
        date: RE_DATES.iter().find_map(|re| capture(re, header)),
        precedence: capture(&RE_PRECEDENCE, header),
        zone: capture(&RE_ZONE, header),
        authoring_unit: capture(&RE_AUTHORING_UNIT, header),
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First `HEADER_CHARS` characters, cut on a char boundary.
fn header_window(content: &str) -> &str {
    match content.char_indices().nth(HEADER_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}
