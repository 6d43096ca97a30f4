//! Converts legacy rich-text blobs (RTF) into plain text plus the portable
//! `shed-rich` JSON payload.

use serde::Serialize;
use thiserror::Error;

pub const PAYLOAD_FORMAT: &str = "shed-rich";
pub const PAYLOAD_VERSION: u32 = 1;

/// Result of converting one blob. `rich_payload` is `None` whenever
/// `warning` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub plain_text: String,
    pub rich_payload: Option<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RtfError {
    #[error("content is not RTF")]
    NotRtf,
    #[error("unbalanced group close at byte {0}")]
    UnbalancedGroup(usize),
    #[error("{0} group(s) left open at end of content")]
    UnterminatedGroups(usize),
    #[error("truncated control sequence at byte {0}")]
    TruncatedControl(usize),
    #[error("invalid hex escape at byte {0}")]
    BadHexEscape(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    font_size: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub font_size: Option<f32>,
}

impl Run {
    fn style(&self) -> Style {
        Style {
            bold: self.bold,
            italic: self.italic,
            underline: self.underline,
            strikethrough: self.strikethrough,
            font_size: self.font_size,
        }
    }
}

#[derive(Debug, Serialize)]
struct RichPayload<'a> {
    format: &'static str,
    version: u32,
    runs: &'a [Run],
}

pub fn convert(blob: &[u8]) -> Conversion {
    if blob.is_empty() {
        return Conversion {
            plain_text: String::new(),
            rich_payload: None,
            warning: None,
        };
    }

    let runs = match parse(blob, true) {
        Ok(runs) => runs,
        Err(err) => return fallback(blob, err.to_string()),
    };
    let payload = RichPayload {
        format: PAYLOAD_FORMAT,
        version: PAYLOAD_VERSION,
        runs: &runs,
    };
    match serde_json::to_string(&payload) {
        Ok(encoded) => Conversion {
            plain_text: runs.iter().map(|run| run.text.as_str()).collect(),
            rich_payload: Some(encoded),
            warning: None,
        },
        Err(err) => fallback(blob, format!("payload encoding failed: {err}")),
    }
}

fn fallback(blob: &[u8], reason: String) -> Conversion {
    Conversion {
        plain_text: lenient_plain_text(blob),
        rich_payload: None,
        warning: Some(format!("rich content kept as plain text: {reason}")),
    }
}

/// Best-effort text extraction that never fails. Non-empty input always
/// produces non-empty output.
pub fn lenient_plain_text(blob: &[u8]) -> String {
    if looks_like_rtf(blob) {
        if let Ok(runs) = parse(blob, false) {
            let text: String = runs.iter().map(|run| run.text.as_str()).collect();
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    String::from_utf8_lossy(blob).into_owned()
}

fn looks_like_rtf(blob: &[u8]) -> bool {
    let start = blob
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(blob.len());
    blob[start..].starts_with(b"{\\rtf")
}

const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "expandedcolortbl",
    "stylesheet",
    "info",
    "pict",
    "listtable",
    "listoverridetable",
    "revtbl",
    "rsidtbl",
    "generator",
    "xmlnstbl",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "fldinst",
    "object",
    "header",
    "headerl",
    "headerr",
    "footer",
    "footerl",
    "footerr",
];

#[derive(Debug, Clone, Copy)]
struct Group {
    style: Style,
    skip: bool,
    unicode_fallback: usize,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            style: Style::default(),
            skip: false,
            unicode_fallback: 1,
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    strict: bool,
    stack: Vec<Group>,
    current: Group,
    pending_skip: usize,
    runs: Vec<Run>,
}

fn parse(bytes: &[u8], strict: bool) -> Result<Vec<Run>, RtfError> {
    if strict && !looks_like_rtf(bytes) {
        return Err(RtfError::NotRtf);
    }
    let mut parser = Parser {
        bytes,
        pos: 0,
        strict,
        stack: Vec::new(),
        current: Group::default(),
        pending_skip: 0,
        runs: Vec::new(),
    };
    parser.run()?;
    Ok(parser.runs)
}

impl Parser<'_> {
    fn run(&mut self) -> Result<(), RtfError> {
        let mut opened_root = false;
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            match byte {
                b'{' => {
                    self.pos += 1;
                    self.stack.push(self.current);
                    opened_root = true;
                }
                b'}' => {
                    let at = self.pos;
                    self.pos += 1;
                    match self.stack.pop() {
                        Some(group) => {
                            self.current = group;
                            self.pending_skip = 0;
                        }
                        None if self.strict => return Err(RtfError::UnbalancedGroup(at)),
                        None => {}
                    }
                    if opened_root && self.stack.is_empty() && self.strict {
                        // Anything after the root group is ignored.
                        self.pos = self.bytes.len();
                    }
                }
                b'\\' => self.control()?,
                b'\r' | b'\n' => self.pos += 1,
                _ => {
                    self.pos += 1;
                    self.emit_char(decode_cp1252(byte));
                }
            }
        }
        if self.strict && !self.stack.is_empty() {
            return Err(RtfError::UnterminatedGroups(self.stack.len()));
        }
        Ok(())
    }

    fn control(&mut self) -> Result<(), RtfError> {
        let start = self.pos;
        self.pos += 1;
        let Some(&next) = self.bytes.get(self.pos) else {
            return self.soft(RtfError::TruncatedControl(start));
        };

        if next.is_ascii_alphabetic() {
            let word_start = self.pos;
            while self
                .bytes
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_alphabetic())
            {
                self.pos += 1;
            }
            let word = String::from_utf8_lossy(&self.bytes[word_start..self.pos]).into_owned();
            let param = self.read_param();
            if self.bytes.get(self.pos) == Some(&b' ') {
                self.pos += 1;
            }
            self.apply_word(&word, param);
            return Ok(());
        }

        self.pos += 1;
        match next {
            b'\'' => {
                let hex = self.bytes.get(self.pos..self.pos + 2);
                let value = hex
                    .filter(|digits| digits.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|digits| std::str::from_utf8(digits).ok())
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok());
                match value {
                    Some(value) => {
                        self.pos += 2;
                        self.emit_char(decode_cp1252(value));
                        Ok(())
                    }
                    None => self.soft(RtfError::BadHexEscape(start)),
                }
            }
            b'*' => {
                self.current.skip = true;
                Ok(())
            }
            b'\\' | b'{' | b'}' => {
                self.emit_char(next as char);
                Ok(())
            }
            b'~' => {
                self.emit_char('\u{a0}');
                Ok(())
            }
            b'_' => {
                self.emit_char('\u{2011}');
                Ok(())
            }
            b'\n' | b'\r' => {
                self.emit_text("\n");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn soft(&mut self, err: RtfError) -> Result<(), RtfError> {
        if self.strict {
            Err(err)
        } else {
            Ok(())
        }
    }

    fn read_param(&mut self) -> Option<i32> {
        let start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            self.pos = start;
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
    }

    fn apply_word(&mut self, word: &str, param: Option<i32>) {
        if SKIPPED_DESTINATIONS.contains(&word) {
            self.current.skip = true;
            return;
        }
        let on = param.map(|value| value != 0).unwrap_or(true);
        let style = &mut self.current.style;
        match word {
            "par" | "line" | "sect" | "page" => self.emit_text("\n"),
            "tab" => self.emit_text("\t"),
            "emdash" => self.emit_char('\u{2014}'),
            "endash" => self.emit_char('\u{2013}'),
            "bullet" => self.emit_char('\u{2022}'),
            "lquote" => self.emit_char('\u{2018}'),
            "rquote" => self.emit_char('\u{2019}'),
            "ldblquote" => self.emit_char('\u{201c}'),
            "rdblquote" => self.emit_char('\u{201d}'),
            "b" => style.bold = on,
            "i" => style.italic = on,
            "ul" => style.underline = on,
            "ulnone" => style.underline = false,
            "strike" => style.strikethrough = on,
            "fs" => style.font_size = param.filter(|v| *v > 0).map(|v| v as f32 / 2.0),
            "plain" => *style = Style::default(),
            "uc" => self.current.unicode_fallback = param.unwrap_or(1).max(0) as usize,
            "u" => {
                if let Some(value) = param {
                    let code = if value < 0 { value + 65_536 } else { value };
                    let ch = u32::try_from(code)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or('\u{fffd}');
                    self.emit_char(ch);
                    self.pending_skip = self.current.unicode_fallback;
                }
            }
            _ => {}
        }
    }

    fn emit_char(&mut self, ch: char) {
        if self.pending_skip > 0 {
            self.pending_skip -= 1;
            return;
        }
        let mut buf = [0u8; 4];
        self.push(ch.encode_utf8(&mut buf));
    }

    fn emit_text(&mut self, text: &str) {
        self.pending_skip = 0;
        self.push(text);
    }

    fn push(&mut self, text: &str) {
        if self.current.skip || (self.stack.is_empty() && self.strict) {
            return;
        }
        let style = self.current.style;
        match self.runs.last_mut() {
            Some(last) if last.style() == style => last.text.push_str(text),
            _ => self.runs.push(Run {
                text: text.to_string(),
                bold: style.bold,
                italic: style.italic,
                underline: style.underline,
                strikethrough: style.strikethrough,
                font_size: style.font_size,
            }),
        }
    }
}

/// Windows-1252 differs from Latin-1 only in 0x80..=0x9F.
fn decode_cp1252(byte: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20ac}', '\u{fffd}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02c6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{fffd}',
        '\u{017d}', '\u{fffd}', '\u{fffd}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
        '\u{0153}', '\u{fffd}', '\u{017e}', '\u{0178}',
    ];
    match byte {
        0x80..=0x9f => HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = r"{\rtf1\ansi\ansicpg1252\cocoartf2639
{\fonttbl\f0\fswiss\fcharset0 Helvetica;}
{\colortbl;\red255\green255\blue255;}
\pard\f0\fs24 It was a \b dark\b0  and stormy night.\par
Caf\'e9 \emdash  closed.}";

    #[test]
    fn extracts_text_and_styles() {
        let conversion = convert(SAMPLE.as_bytes());
        assert!(conversion.warning.is_none());
        assert_eq!(
            conversion.plain_text,
            "It was a dark and stormy night.\nCafé \u{2014} closed."
        );

        let payload: serde_json::Value =
            serde_json::from_str(conversion.rich_payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["format"], "shed-rich");
        assert_eq!(payload["version"], 1);
        let runs = payload["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1]["text"], "dark");
        assert_eq!(runs[1]["bold"], true);
        assert_eq!(runs[1]["fontSize"], 12.0);
    }

    #[test]
    fn starred_destinations_are_skipped() {
        let blob = br"{\rtf1{\*\expandedcolortbl;;}{\info{\title Hidden}}Shown}";
        assert_eq!(convert(blob).plain_text, "Shown");
    }

    #[test]
    fn adjacent_runs_with_same_style_merge() {
        let blob = br"{\rtf1 one {two} \b0 three}";
        let conversion = convert(blob);
        let payload: serde_json::Value =
            serde_json::from_str(conversion.rich_payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["runs"].as_array().unwrap().len(), 1);
        assert_eq!(conversion.plain_text, "one two three");
    }

    #[test]
    fn empty_blob_converts_silently() {
        let conversion = convert(b"");
        assert_eq!(conversion.plain_text, "");
        assert!(conversion.rich_payload.is_none());
        assert!(conversion.warning.is_none());
    }

    #[test]
    fn non_rtf_falls_back_to_lossy_text() {
        let conversion = convert(b"bplist00\xd4\x01\x02 archived");
        assert!(conversion.rich_payload.is_none());
        assert!(conversion.warning.unwrap().contains("not RTF"));
        assert!(conversion.plain_text.contains("archived"));
    }

    #[test]
    fn unterminated_rtf_keeps_stripped_text() {
        let conversion = convert(br"{\rtf1\ansi {\b Chapter one\par and on");
        assert!(conversion.rich_payload.is_none());
        assert!(conversion.warning.is_some());
        assert_eq!(conversion.plain_text, "Chapter one\nand on");
    }

    #[test]
    fn signed_hex_escape_is_rejected() {
        let conversion = convert(br"{\rtf1 a\'+fb}");
        assert!(conversion.rich_payload.is_none());
        assert!(conversion.warning.is_some());
        assert!(!conversion.plain_text.contains('\u{0f}'));
        assert!(conversion.plain_text.starts_with('a'));
    }

    #[test]
    fn unicode_fallback_characters_are_consumed() {
        let blob = br"{\rtf1\uc2 x\u20320\'c4\'e3y}";
        assert_eq!(convert(blob).plain_text, "x\u{4f60}y");
    }

    proptest! {
        #[test]
        fn failed_conversion_never_loses_content(bytes in proptest::collection::vec(any::<u8>(), 1..256)) {
            let conversion = convert(&bytes);
            if conversion.rich_payload.is_none() {
                prop_assert!(conversion.warning.is_some());
                prop_assert!(!conversion.plain_text.is_empty());
            } else {
                prop_assert!(conversion.warning.is_none());
            }
        }
    }
}
