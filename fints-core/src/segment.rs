//! Segment codec: the text framing every FinTS message is built from.
//!
//! A segment is `NAME:SEQ:VERSION+field+field...'`. Fields are separated by
//! `+`, subfields by `:`, segments end with `'`. The characters `'`, `+`,
//! `:` and `?` inside a value are escaped by prefixing `?`.

/// Escape delimiter characters in caller-supplied data.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\'' | '+' | ':' | '?') {
            out.push('?');
        }
        out.push(c);
    }
    out
}

/// Undo [`escape`]. Unknown escape pairs keep the escaped character.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '?' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Builds one `NAME:SEQ:VERSION+...'` segment.
///
/// Sequence numbers come from the caller (dialog state owns the counter);
/// the builder never invents them. `field` escapes caller data, `raw_field`
/// passes pre-composed subfield groups through verbatim.
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    head: String,
    fields: Vec<String>,
}

impl SegmentBuilder {
    pub fn new(name: &str, number: u32, version: u32) -> Self {
        Self {
            head: format!("{name}:{number}:{version}"),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, value: &str) -> Self {
        self.fields.push(escape(value));
        self
    }

    pub fn raw_field(mut self, value: &str) -> Self {
        self.fields.push(value.to_string());
        self
    }

    pub fn finish(self) -> String {
        let mut out = self.head;
        for f in &self.fields {
            out.push('+');
            out.push_str(f);
        }
        out.push('\'');
        out
    }
}

/// Split a full response body on unescaped `'` into segment strings.
/// Empty trailing fragments are dropped.
pub fn split_segments(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '?' => {
                current.push(c);
                escaped = true;
            }
            '\'' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Extract the substring between the first occurrence of `start` and the
/// next occurrence of `end` after it. Returns an empty string when either
/// marker is missing; never panics. This is the workhorse behind every
/// field extraction in the response classifier.
pub fn extract_between(source: &str, start: &str, end: &str) -> String {
    let Some(s) = source.find(start) else {
        return String::new();
    };
    let from = s + start.len();
    let Some(e) = source[from..].find(end) else {
        return String::new();
    };
    source[from..from + e].to_string()
}

/// Parse a delimited list of numeric tokens leniently: non-numeric tokens
/// are skipped, not fatal.
pub fn parse_numeric_list(list: &str, sep: char) -> Vec<u32> {
    list.split(sep)
        .filter_map(|t| t.trim().parse::<u32>().ok())
        .collect()
}
