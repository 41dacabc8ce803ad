//! Line-oriented markdown tagger used for live styling in the editor.
//!
//! `annotate` turns the whole document into a flat list of styled ranges.
//! Offsets are code points so they line up with what the editor shows,
//! regardless of how many bytes a character takes.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StyleTag {
    Heading1,
    Heading2,
    Heading3,
    Bold,
    Italic,
    InlineCode,
    CodeBlock,
    Blockquote,
    Strikethrough,
    Link,
    ListBullet,
    ListNumber,
    ListItem,
}

impl StyleTag {
    pub fn is_inline(self) -> bool {
        matches!(
            self,
            StyleTag::Bold
                | StyleTag::Italic
                | StyleTag::InlineCode
                | StyleTag::Strikethrough
                | StyleTag::Link
        )
    }
}

/// A styled half-open range `[start, end)` in code points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub style: StyleTag,
}

impl Annotation {
    pub fn new(start: usize, end: usize, style: StyleTag) -> Self {
        Self { start, end, style }
    }

    pub fn shifted(self, by: usize) -> Self {
        Self::new(self.start + by, self.end + by, self.style)
    }
}

/// Block-level role of a single line. List variants carry the marker length
/// in code points (leading whitespace, marker and the spaces after it).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStyle {
    Heading1,
    Heading2,
    Heading3,
    Blockquote,
    CodeBlock,
    Ordered { marker_len: usize },
    Bullet { marker_len: usize },
}

const INLINE_EXEMPT_PREFIXES: [&str; 6] = ["# ", "## ", "### ", "> ", "    ", "\t"];

fn ordered_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.\s+").expect("valid ordered marker regex"))
}

fn bullet_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+]\s+").expect("valid bullet marker regex"))
}

fn inline_patterns() -> &'static [(Regex, StyleTag); 5] {
    static PATTERNS: OnceLock<[(Regex, StyleTag); 5]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("valid inline regex");
        [
            (compile(r"\*\*(.+?)\*\*"), StyleTag::Bold),
            (compile(r"_(.+?)_"), StyleTag::Italic),
            (compile(r"`(.+?)`"), StyleTag::InlineCode),
            (compile(r"~~(.+?)~~"), StyleTag::Strikethrough),
            (compile(r"\[(.+?)\]\((.+?)\)"), StyleTag::Link),
        ]
    })
}

/// Iterates the lines of `text` split on `\n`, each paired with the code
/// point offset of its first character.
pub fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0usize;
    text.split('\n').map(move |line| {
        let start = offset;
        offset += line.chars().count() + 1;
        (start, line)
    })
}

pub fn classify_line(line: &str) -> Option<BlockStyle> {
    if line.starts_with("# ") {
        Some(BlockStyle::Heading1)
    } else if line.starts_with("## ") {
        Some(BlockStyle::Heading2)
    } else if line.starts_with("### ") {
        Some(BlockStyle::Heading3)
    } else if line.starts_with("> ") {
        Some(BlockStyle::Blockquote)
    } else if line.starts_with("    ") || line.starts_with('\t') {
        Some(BlockStyle::CodeBlock)
    } else if let Some(m) = ordered_marker_re().find(line) {
        Some(BlockStyle::Ordered {
            marker_len: line[..m.end()].chars().count(),
        })
    } else {
        bullet_marker_re().find(line).map(|m| BlockStyle::Bullet {
            marker_len: line[..m.end()].chars().count(),
        })
    }
}

/// Headings, quotes and code lines keep their markdown literal; list lines
/// and plain lines get inline styling.
pub fn accepts_inline(line: &str) -> bool {
    !INLINE_EXEMPT_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn block_annotations(line: &str, line_len: usize, out: &mut Vec<Annotation>) {
    let Some(block) = classify_line(line) else {
        return;
    };
    match block {
        BlockStyle::Heading1 => out.push(Annotation::new(0, line_len, StyleTag::Heading1)),
        BlockStyle::Heading2 => out.push(Annotation::new(0, line_len, StyleTag::Heading2)),
        BlockStyle::Heading3 => out.push(Annotation::new(0, line_len, StyleTag::Heading3)),
        BlockStyle::Blockquote => out.push(Annotation::new(0, line_len, StyleTag::Blockquote)),
        BlockStyle::CodeBlock => out.push(Annotation::new(0, line_len, StyleTag::CodeBlock)),
        BlockStyle::Ordered { marker_len } => {
            out.push(Annotation::new(0, marker_len, StyleTag::ListNumber));
            out.push(Annotation::new(0, line_len, StyleTag::ListItem));
        }
        BlockStyle::Bullet { marker_len } => {
            out.push(Annotation::new(0, marker_len, StyleTag::ListBullet));
            out.push(Annotation::new(0, line_len, StyleTag::ListItem));
        }
    }
}

/// Byte to code point translation for one line. ASCII lines skip the table.
struct CharMap {
    table: Option<Vec<usize>>,
}

impl CharMap {
    fn new(line: &str) -> Self {
        if line.is_ascii() {
            return Self { table: None };
        }
        let mut table = vec![0; line.len() + 1];
        let mut count = 0;
        for (byte, _) in line.char_indices() {
            table[byte] = count;
            count += 1;
        }
        table[line.len()] = count;
        Self { table: Some(table) }
    }

    fn char_at(&self, byte: usize) -> usize {
        match &self.table {
            Some(table) => table[byte],
            None => byte,
        }
    }
}

/// Single `*` emphasis. An opening star must not touch another star on
/// either side; the closing star is the first later one with the same
/// property, leaving at least one character in between.
fn single_star_spans(chars: &[char], out: &mut Vec<Annotation>) {
    let is_lone_star = |i: usize| {
        chars[i] == '*'
            && (i == 0 || chars[i - 1] != '*')
            && chars.get(i + 1).copied() != Some('*')
    };

    let mut i = 0;
    while i < chars.len() {
        if !is_lone_star(i) {
            i += 1;
            continue;
        }
        match (i + 2..chars.len()).find(|&j| is_lone_star(j)) {
            Some(close) => {
                out.push(Annotation::new(i, close + 1, StyleTag::Italic));
                i = close + 1;
            }
            // Later openers only see a subset of these closers.
            None => break,
        }
    }
}

/// Inline spans of one line in line-local code points. Categories are
/// scanned independently; spans of different categories may overlap.
pub fn inline_annotations(line: &str) -> Vec<Annotation> {
    let mut out = Vec::new();
    if line.is_empty() {
        return out;
    }
    let map = CharMap::new(line);
    let [bold, rest @ ..] = inline_patterns();

    for m in bold.0.find_iter(line) {
        out.push(Annotation::new(map.char_at(m.start()), map.char_at(m.end()), bold.1));
    }

    let chars: Vec<char> = line.chars().collect();
    single_star_spans(&chars, &mut out);

    for (re, style) in rest {
        for m in re.find_iter(line) {
            out.push(Annotation::new(map.char_at(m.start()), map.char_at(m.end()), *style));
        }
    }
    out
}

fn sort_annotations(annotations: &mut [Annotation]) {
    annotations.sort_by_key(|a| (a.start, a.style, a.end));
}

/// Annotates every line of `document`. The result depends only on the text
/// and is ordered by start offset, then style, then end offset.
pub fn annotate(document: &str) -> Vec<Annotation> {
    let mut out = Vec::new();
    let mut line_spans = Vec::new();

    for (offset, line) in lines_with_offsets(document) {
        if line.is_empty() {
            continue;
        }
        let line_len = line.chars().count();
        line_spans.clear();
        block_annotations(line, line_len, &mut line_spans);
        if accepts_inline(line) {
            line_spans.extend(inline_annotations(line));
        }
        out.extend(line_spans.iter().map(|a| a.shifted(offset)));
    }

    sort_annotations(&mut out);
    out
}
