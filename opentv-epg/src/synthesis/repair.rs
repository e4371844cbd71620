//! Text repairs applied to decoded titles and descriptions.

use once_cell::sync::Lazy;
use regex::Regex;

const ELLIPSIS: &[char] = &['.', '\u{2026}'];

fn has_leading_ellipsis(text: &str) -> bool {
    text.starts_with("..") || text.starts_with('\u{2026}')
}

fn has_trailing_ellipsis(text: &str) -> bool {
    text.ends_with("..") || text.ends_with('\u{2026}')
}

/// Rejoin a sentence broken across title and description.
///
/// `"Foo.."` + `"..Bar. Extra."` gives `("Foo Bar.", "Extra.")`. The title
/// takes the description up to and including the first `.`, `?`, `!` or `:`.
/// Returns `None` when either ellipsis is missing or the description has no
/// terminator.
pub fn stitch_title(title: &str, description: &str) -> Option<(String, String)> {
    let title = title.trim_end();
    let description = description.trim_start();
    if !has_trailing_ellipsis(title) || !has_leading_ellipsis(description) {
        return None;
    }

    let head = title.trim_end_matches(ELLIPSIS).trim_end();
    let rest = description.trim_start_matches(ELLIPSIS).trim_start();
    let end = rest.find(['.', '?', '!', ':'])?;
    if end == 0 {
        return None;
    }

    let (spliced, remaining) = rest.split_at(end + 1);
    let title = if head.is_empty() {
        spliced.to_string()
    } else {
        format!("{} {}", head, spliced)
    };
    Some((title, remaining.trim().to_string()))
}

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?])").unwrap());
static DOUBLE_STOP: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])[ \t]+\.").unwrap());

/// Collapse whitespace and stray punctuation left behind by a cut.
pub fn tidy(text: &str) -> String {
    let out = SPACES.replace_all(text, " ");
    let out = DOUBLE_STOP.replace_all(&out, "$1");
    let out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1");
    let trimmed = out.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
    // A lone leading stop is debris; a leading ellipsis is content
    match trimmed.strip_prefix(['.', ':']) {
        Some(rest) if !rest.starts_with('.') => rest.trim_start().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Remove `start..end` from `text` and tidy the result.
pub fn cut(text: &str, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push(' ');
    out.push_str(&text[end..]);
    tidy(&out)
}

static COLON_SUBTITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^([^:.!?\n]{2,60}?):\s+(\S.*)$").unwrap());
static QUOTED_SUBTITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^["\u{201C}']([^"\u{201D}'\n]{2,80})["\u{201D}'][.:]?\s*(.*)$"#).unwrap()
});

/// Split a leading `Subtitle: rest` or `"Subtitle" rest` clause off a
/// description. Returns `(subtitle, remaining)`.
pub fn extract_subtitle(description: &str) -> Option<(String, String)> {
    let description = description.trim();
    for re in [&*COLON_SUBTITLE, &*QUOTED_SUBTITLE] {
        if let Some(caps) = re.captures(description) {
            let subtitle = caps.get(1)?.as_str().trim().to_string();
            let remaining = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            if !subtitle.is_empty() {
                return Some((subtitle, remaining));
            }
        }
    }
    None
}
