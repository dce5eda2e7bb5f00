//! Raw feed parsing: logical-line unfolding and property blocks.
//!
//! Turns iCalendar-style feed text into flat property blocks, one per
//! `VEVENT`. Interpretation of the properties happens in the builder;
//! this layer only deals with the line grammar.

/// One `KEY;PARAM=V;PARAM=V:value` content line, split apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Case-folded to upper case.
    pub name: String,
    /// Parameter keys case-folded, values unquoted.
    pub params: Vec<(String, String)>,
    /// Raw value, still escaped.
    pub value: String,
}

impl Property {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// All properties of one event definition.
#[derive(Debug, Clone, Default)]
pub struct PropertyBlock {
    pub properties: Vec<Property>,
}

impl PropertyBlock {
    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> {
        self.properties.iter().filter(move |p| p.name == name)
    }
}

/// Parse raw feed text into one property block per VEVENT.
///
/// Content outside BEGIN:VEVENT/END:VEVENT is ignored; malformed lines
/// (no colon) are dropped, not fatal.
pub fn parse(raw: &str) -> Vec<PropertyBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<PropertyBlock> = None;

    for line in unfold(raw) {
        if line == "BEGIN:VEVENT" {
            current = Some(PropertyBlock::default());
            continue;
        }
        if line == "END:VEVENT" {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }
        if let Some(ref mut block) = current {
            if let Some(property) = parse_content_line(&line) {
                block.properties.push(property);
            }
        }
    }

    blocks
}

/// Unfold logical lines: a physical line starting with a space or tab
/// continues the previous one, minus the single continuation character.
fn unfold(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for physical in raw.lines() {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        if physical.starts_with(' ') || physical.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&physical[1..]);
            }
        } else {
            lines.push(physical.to_string());
        }
    }

    lines
}

/// Split one content line into name, parameters, and value.
///
/// The split happens at the first colon outside a quoted parameter value;
/// parameter values may be quoted (and may then contain `:` and `;`).
fn parse_content_line(line: &str) -> Option<Property> {
    let colon = find_value_colon(line)?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = head.split(';');
    let name = segments.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    for segment in segments {
        // Each parameter splits on its first '='; a bare segment is dropped.
        if let Some((key, val)) = segment.split_once('=') {
            params.push((key.to_uppercase(), unquote(val).to_string()));
        }
    }

    Some(Property {
        name: name.to_uppercase(),
        params,
        value: value.to_string(),
    })
}

fn find_value_colon(line: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_properties_within_vevent_only() {
        let raw = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:evt-1\r\n\
SUMMARY:Hello\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let blocks = parse(raw);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].properties.len(), 2);
        assert_eq!(blocks[0].find("UID").unwrap().value, "evt-1");
        assert_eq!(blocks[0].find("SUMMARY").unwrap().value, "Hello");
    }

    #[test]
    fn test_unfolds_continuation_lines() {
        let raw = "BEGIN:VEVENT\r\n\
UID:evt-1\r\n\
DESCRIPTION:Hello \r\n world and \r\n\tmore text\r\n\
END:VEVENT\r\n";

        let blocks = parse(raw);
        assert_eq!(
            blocks[0].find("DESCRIPTION").unwrap().value,
            "Hello world and more text"
        );
    }

    #[test]
    fn test_parameters_are_split_and_unquoted() {
        let raw = "BEGIN:VEVENT\n\
DTSTART;TZID=\"America/New_York\";VALUE=DATE-TIME:20260301T150000\n\
END:VEVENT\n";

        let blocks = parse(raw);
        let prop = blocks[0].find("DTSTART").unwrap();
        assert_eq!(prop.param("TZID"), Some("America/New_York"));
        assert_eq!(prop.param("VALUE"), Some("DATE-TIME"));
        assert_eq!(prop.value, "20260301T150000");
    }

    #[test]
    fn test_quoted_param_value_may_contain_colon() {
        let raw = "BEGIN:VEVENT\n\
ORGANIZER;CN=\"Smith: Boss\":mailto:boss@example.com\n\
END:VEVENT\n";

        let blocks = parse(raw);
        let prop = blocks[0].find("ORGANIZER").unwrap();
        assert_eq!(prop.param("CN"), Some("Smith: Boss"));
        assert_eq!(prop.value, "mailto:boss@example.com");
    }

    #[test]
    fn test_names_and_param_keys_are_case_folded() {
        let raw = "BEGIN:VEVENT\nsummary;language=en:Standup\nEND:VEVENT\n";

        let blocks = parse(raw);
        let prop = blocks[0].find("SUMMARY").unwrap();
        assert_eq!(prop.param("LANGUAGE"), Some("en"));
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let raw = "BEGIN:VEVENT\nUID:evt-1\nTHIS LINE HAS NO COLON\nEND:VEVENT\n";

        let blocks = parse(raw);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].properties.len(), 1);
    }

    #[test]
    fn test_multiple_blocks() {
        let raw = "BEGIN:VEVENT\nUID:a\nEND:VEVENT\nBEGIN:VEVENT\nUID:b\nEND:VEVENT\n";
        let blocks = parse(raw);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].find("UID").unwrap().value, "b");
    }
}
