//! Goal parser: natural-language goal text to ordered sub-goals.
//!
//! Total by construction: any text parses to at least one sub-goal; how
//! well a vague sub-goal matches the page is the decision layer's concern.

use once_cell::sync::Lazy;
use regex::Regex;
use webpilot_core_types::{ActionVerb, SubGoal};

/// Conjunction markers that separate sub-goal segments, longest first so
/// "and then" never half-matches as "and".
const CONJUNCTIONS: &[&str] = &["and then", "then", "finally", "and"];

/// Fixed verb keyword table. First matching token in a segment wins.
const VERB_KEYWORDS: &[(&str, ActionVerb)] = &[
    ("click", ActionVerb::Click),
    ("press", ActionVerb::Click),
    ("tap", ActionVerb::Click),
    ("type", ActionVerb::Type),
    ("enter", ActionVerb::Type),
    ("fill", ActionVerb::Type),
    ("verify", ActionVerb::Verify),
    ("check", ActionVerb::Verify),
    ("confirm", ActionVerb::Verify),
    ("scroll", ActionVerb::Scroll),
    ("wait", ActionVerb::Wait),
    ("navigate", ActionVerb::Navigate),
    ("go", ActionVerb::Navigate),
    ("open", ActionVerb::Navigate),
];

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("url regex"));
static VERIFY_CLAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bverify\b").expect("verify regex"));
static PRESENCE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:exists|appears|is visible|is present)\s*$").expect("suffix regex")
});

/// Parses goal text into an ordered sub-goal sequence.
pub struct GoalParser;

impl GoalParser {
    /// Total parse: never fails. Unrecognizable text becomes a single
    /// click sub-goal carrying the whole text as its description.
    pub fn parse(goal: &str) -> Vec<SubGoal> {
        let segments = split_segments(goal);
        let mut sub_goals: Vec<SubGoal> = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| parse_segment(segment, index))
            .collect();

        if sub_goals.is_empty() {
            sub_goals.push(SubGoal::new(ActionVerb::Click, goal.trim(), 0));
        }
        sub_goals
    }
}

/// Split on conjunction markers, never inside quoted substrings.
fn split_segments(goal: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0usize;

    while i < goal.len() {
        // `i` always sits on a char boundary.
        let Some(ch) = goal[i..].chars().next() else {
            break;
        };
        let ch_len = ch.len_utf8();
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
                i += ch_len;
                continue;
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                    i += ch_len;
                    continue;
                }
            }
        }

        if boundary_before(goal, i) {
            if let Some(marker_len) = marker_at(goal, i) {
                push_segment(&mut segments, &goal[start..i]);
                i += marker_len;
                start = i;
                continue;
            }
        }
        i += ch_len;
    }
    push_segment(&mut segments, &goal[start..]);
    segments
}

fn boundary_before(goal: &str, i: usize) -> bool {
    goal[..i]
        .chars()
        .next_back()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true)
}

fn marker_at(goal: &str, i: usize) -> Option<usize> {
    let rest = &goal[i..];
    for marker in CONJUNCTIONS {
        let Some(prefix) = rest.get(..marker.len()) else {
            continue;
        };
        if prefix.eq_ignore_ascii_case(marker)
            && rest[marker.len()..]
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true)
        {
            return Some(marker.len());
        }
    }
    None
}

fn push_segment(segments: &mut Vec<String>, raw: &str) {
    let cleaned = raw.trim().trim_matches(|c: char| c == ',' || c == '.').trim();
    if !cleaned.is_empty() {
        segments.push(cleaned.to_string());
    }
}

/// First quoted literal in the segment, verbatim, plus the segment with the
/// quoted span removed.
fn extract_quoted(segment: &str) -> (Option<String>, String) {
    let bytes = segment.as_bytes();
    for (i, &ch) in bytes.iter().enumerate() {
        if ch == b'\'' || ch == b'"' {
            let rest = &segment[i + 1..];
            let end = rest.find(ch as char).unwrap_or(rest.len());
            let literal = rest[..end].to_string();
            let close = (i + 1 + end + 1).min(segment.len());
            let remainder = format!("{} {}", &segment[..i], &segment[close..]);
            return (Some(literal), remainder);
        }
    }
    (None, segment.to_string())
}

fn classify_verb(segment: &str) -> Option<(ActionVerb, &str)> {
    for token in segment.split_whitespace() {
        let word = token.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        for (keyword, verb) in VERB_KEYWORDS {
            if word.eq_ignore_ascii_case(keyword) {
                return Some((*verb, token));
            }
        }
    }
    None
}

fn clean_description(text: &str) -> String {
    let collapsed: Vec<&str> = text.split_whitespace().collect();
    collapsed
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '.')
        .trim()
        .to_string()
}

fn parse_segment(segment: &str, index: usize) -> SubGoal {
    // Inline verification clause: "click Submit and verify 'Saved'" keeps
    // the clause attached to the click sub-goal. Only applies when the
    // clause is not the segment's own verb.
    let (body, verification) = detach_verification_clause(segment);

    let (quoted, without_quote) = extract_quoted(&body);
    let verb = classify_verb(&body);

    let Some((verb, verb_token)) = verb else {
        // No verb keyword: default click, whole segment as description.
        let description = clean_description(&body);
        let mut sub_goal = SubGoal::new(ActionVerb::Click, description, index);
        sub_goal.verification = verification;
        return sub_goal;
    };

    let value = match verb {
        ActionVerb::Type | ActionVerb::Verify => quoted.clone(),
        ActionVerb::Navigate => URL_RE
            .find(&body)
            .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
            .or(quoted.clone()),
        _ => None,
    };

    // Description: the segment minus its verb word and minus the literal
    // already captured as the value.
    let description_source = if value.is_some() && quoted.is_some() {
        without_quote
    } else {
        body.clone()
    };
    let description = clean_description(&strip_first_token(&description_source, verb_token));
    let description = match verb {
        ActionVerb::Verify => PRESENCE_SUFFIX_RE.replace(&description, "").to_string(),
        _ => description,
    };

    let mut sub_goal = SubGoal::new(verb, description, index);
    sub_goal.value = value;
    sub_goal.verification = verification;
    sub_goal
}

/// Split "<action> ... verify <expectation>" into the action body and the
/// expectation clause. The clause only counts when "verify" is not the
/// segment's leading verb.
fn detach_verification_clause(segment: &str) -> (String, Option<String>) {
    let Some(m) = VERIFY_CLAUSE_RE.find(segment) else {
        return (segment.to_string(), None);
    };
    // Detach only when another verb precedes "verify"; a leading verify is
    // the segment's own verb and stays put.
    if classify_verb(&segment[..m.start()]).is_some() {
        let clause_raw = segment[m.end()..].trim();
        if clause_raw.is_empty() {
            return (segment.to_string(), None);
        }
        let (quoted, _) = extract_quoted(clause_raw);
        let clause = quoted.unwrap_or_else(|| {
            PRESENCE_SUFFIX_RE
                .replace(clause_raw, "")
                .trim()
                .to_string()
        });
        let body = segment[..m.start()].trim().trim_end_matches("and").trim();
        return (body.to_string(), Some(clause));
    }
    (segment.to_string(), None)
}

fn strip_first_token(text: &str, token: &str) -> String {
    match text.find(token) {
        Some(pos) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..pos]);
            out.push_str(&text[pos + token.len()..]);
            out
        }
        None => text.to_string(),
    }
}
