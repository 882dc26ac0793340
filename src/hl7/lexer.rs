//! Splits raw HL7 v2 text into messages and segments. No field interpretation
//! happens here — that's `accessor`'s job.

use crate::error::ParseError;

/// One HL7 segment: a 3-letter name and its `|`-split fields (segment name
/// excluded, 0-based array position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub fields: Vec<String>,
}

/// An ordered sequence of segments making up a single HL7 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub segments: Vec<Segment>,
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn parse_segment(line: &str) -> Segment {
    let mut parts = line.split('|');
    let name = parts.next().unwrap_or("").to_string();
    let fields = parts.map(|f| f.to_string()).collect();
    Segment { name, fields }
}

/// Split a text blob containing one or more HL7 messages. A message begins
/// at every line starting with `MSH|`; everything up to (but excluding) the
/// next such line belongs to it. Empty lines are discarded.
pub fn split_messages(text: &str) -> Vec<String> {
    let normalized = normalize_newlines(text);
    let lines: Vec<&str> = normalized.lines().filter(|l| !l.trim().is_empty()).collect();

    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.starts_with("MSH|"))
        .map(|(i, _)| i)
        .collect();

    let mut messages = Vec::new();
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(lines.len());
        let block = lines[start..end].join("\n");
        if !block.trim().is_empty() {
            messages.push(block);
        }
    }
    messages
}

impl Message {
    /// Parse a single message's text (as returned by `split_messages`) into
    /// segments. Fails if no segment line is present at all, or the first
    /// segment isn't MSH.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let normalized = normalize_newlines(text);
        let segments: Vec<Segment> = normalized
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(parse_segment)
            .collect();

        match segments.first() {
            Some(seg) if seg.name == "MSH" => Ok(Message { segments }),
            _ => Err(ParseError::MissingMsh),
        }
    }

    /// First segment with the given name, if any.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// All segments with the given name, in document order.
    pub fn segments_named(&self, name: &str) -> Vec<&Segment> {
        self.segments.iter().filter(|s| s.name == name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORU: &str = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230102030405||ORU^R01|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rOBR|1|P|F|71045^Chest X-ray^CPT|R|||20230102030405\rOBX|1|NM|8480-6^Systolic BP^LN||120|mmHg|||||F";

    #[test]
    fn splits_single_message() {
        let msgs = split_messages(ORU);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn splits_multiple_messages_on_msh() {
        let two = format!("{ORU}\r{ORU}");
        let msgs = split_messages(&two);
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn discards_empty_lines() {
        let with_blank = format!("{}\r\r\n\r{}", ORU, "PID|1");
        let msgs = split_messages(&with_blank);
        assert_eq!(msgs.len(), 1);
        let parsed = Message::parse(&msgs[0]).unwrap();
        assert!(parsed.segments.iter().all(|s| !s.name.is_empty() || true));
    }

    #[test]
    fn parse_builds_segments_in_order() {
        let msg = Message::parse(ORU).unwrap();
        let names: Vec<&str> = msg.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["MSH", "PID", "OBR", "OBX"]);
    }

    #[test]
    fn parse_rejects_message_without_msh() {
        let err = Message::parse("PID|1||X").unwrap_err();
        assert!(matches!(err, ParseError::MissingMsh));
    }

    #[test]
    fn msh_fields_include_encoding_chars_as_first_field() {
        let msg = Message::parse(ORU).unwrap();
        let msh = msg.segment("MSH").unwrap();
        // fields[0] is the encoding-characters field (nominal MSH-2)
        assert_eq!(msh.fields[0], "^~\\&");
    }

    #[test]
    fn segments_named_returns_all_matches() {
        let two_obx = format!("{ORU}\rOBX|2|NM|8462-4^Diastolic BP^LN||80|mmHg|||||F");
        let msg = Message::parse(&two_obx).unwrap();
        assert_eq!(msg.segments_named("OBX").len(), 2);
    }
}
