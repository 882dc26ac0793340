//! Typed access into a parsed `Segment`: nominal-field lookup, component and
//! repetition splitting, and HL7 timestamp/date normalization.
//!
//! HL7 field numbering is 1-based and counts the segment name as field 1.
//! After `lexer::parse_segment` strips the name, `fields[0]` holds MSH-2
//! (the encoding characters) for MSH, or the nominal field 2 for every other
//! segment. So the nominal field N maps to array position N-2 for MSH, and
//! N-1 for everything else.

use super::lexer::Segment;

const COMPONENT_SEP: char = '^';
const REPETITION_SEP: char = '~';
const SUBCOMPONENT_SEP: char = '&';

fn field_index(segment: &Segment, nominal: usize) -> Option<usize> {
    let offset = if segment.name == "MSH" { 2 } else { 1 };
    nominal.checked_sub(offset)
}

/// Raw text of nominal field N, or `""` if absent / out of range.
pub fn field(segment: &Segment, nominal: usize) -> String {
    field_index(segment, nominal)
        .and_then(|i| segment.fields.get(i))
        .cloned()
        .unwrap_or_default()
}

/// Repetitions of nominal field N (split on `~`). A field with no `~` yields
/// a single-element vector; an absent field yields an empty vector.
pub fn reps(segment: &Segment, nominal: usize) -> Vec<String> {
    let raw = field(segment, nominal);
    if raw.is_empty() {
        Vec::new()
    } else {
        raw.split(REPETITION_SEP).map(|s| s.to_string()).collect()
    }
}

/// Component `index` (1-based) of the given raw field text, split on `^`.
/// Returns `""` if the component is absent.
pub fn comp(raw: &str, index: usize) -> String {
    raw.split(COMPONENT_SEP)
        .nth(index.saturating_sub(1))
        .unwrap_or("")
        .to_string()
}

/// Subcomponents of a component, split on `&`.
pub fn subcomponents(raw: &str) -> Vec<String> {
    raw.split(SUBCOMPONENT_SEP).map(|s| s.to_string()).collect()
}

/// Normalize an HL7 TS (`YYYYMMDD[HHMMSS][.f][^...]`) or an ISO-like date or
/// dateTime into a FHIR R4 `dateTime`. Rules:
/// - a bare date stays a date (`YYYY-MM-DD`)
/// - date+time with no zone gets `Z` appended (treated as UTC); `HH:MM` pads
///   to `HH:MM:00` first
/// - anything already carrying a zone, or not matching either shape, passes
///   through unchanged
/// - unparseable input (empty, too short) yields `None`
pub fn to_fhir_datetime(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let s = raw.trim();
    let s = s.split('^').next().unwrap_or("").trim();
    if s.is_empty() {
        return None;
    }

    if s.len() >= 8 && s.as_bytes()[..8].iter().all(|b| b.is_ascii_digit()) {
        let date_part = format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]);
        if s.len() >= 14 && s.as_bytes()[8..14].iter().all(|b| b.is_ascii_digit()) {
            return Some(format!(
                "{date_part}T{}:{}:{}Z",
                &s[8..10],
                &s[10..12],
                &s[12..14]
            ));
        }
        return Some(date_part);
    }

    let bytes = s.as_bytes();
    if s.len() == 10 && bytes.get(4) == Some(&b'-') && bytes.get(7) == Some(&b'-') {
        return Some(s.to_string());
    }

    if let Some((date_part, time_part)) = s.split_once('T') {
        let has_zone = time_part.contains('Z')
            || time_part[time_part.len().min(5)..].contains('+')
            || time_part[time_part.len().min(5)..].contains('-');
        if !has_zone {
            let time_part = if time_part.len() == 5 {
                format!("{time_part}:00")
            } else {
                time_part.to_string()
            };
            return Some(format!("{date_part}T{time_part}Z"));
        }
    }

    Some(s.to_string())
}

/// `YYYYMMDD` -> `YYYY-MM-DD`; an already-dashed `YYYY-MM-DD` is preserved;
/// anything else yields `None`.
pub fn to_iso_date(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let s = raw.trim();
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return Some(format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]));
    }
    let bytes = s.as_bytes();
    if s.len() == 10
        && bytes.get(4) == Some(&b'-')
        && bytes.get(7) == Some(&b'-')
        && s[0..4].bytes().all(|b| b.is_ascii_digit())
        && s[5..7].bytes().all(|b| b.is_ascii_digit())
        && s[8..10].bytes().all(|b| b.is_ascii_digit())
    {
        return Some(s.to_string());
    }
    None
}
