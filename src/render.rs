//! Turning annotations into markup.
//!
//! Renderers only see one line at a time together with the annotations that
//! fall on it, in line-local code points. Classification stays in
//! [`crate::annotate`].

use crate::annotate::{lines_with_offsets, Annotation, StyleTag};
use pulldown_cmark::{html, Event, Options, Parser};

pub trait StyleRenderer {
    /// Renders `line`. `spans` are sorted by start and lie within the line.
    fn render_line(&self, line: &str, spans: &[Annotation]) -> String;

    fn line_separator(&self) -> &str {
        "\n"
    }
}

/// Renders a whole document. `annotations` must be sorted by start, as
/// [`crate::annotate::annotate`] returns them.
pub fn render_document<R>(renderer: &R, text: &str, annotations: &[Annotation]) -> String
where
    R: StyleRenderer + ?Sized,
{
    let mut out = String::with_capacity(text.len() * 2);
    let mut next = 0usize;
    let mut local = Vec::new();

    for (idx, (offset, line)) in lines_with_offsets(text).enumerate() {
        if idx > 0 {
            out.push_str(renderer.line_separator());
        }
        let line_end = offset + line.chars().count();
        while next < annotations.len() && annotations[next].start < offset {
            next += 1;
        }
        local.clear();
        while next < annotations.len() && annotations[next].start < line_end {
            let a = annotations[next];
            if a.end <= line_end {
                local.push(Annotation::new(a.start - offset, a.end - offset, a.style));
            }
            next += 1;
        }
        out.push_str(&renderer.render_line(line, &local));
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn css_class(style: StyleTag) -> &'static str {
    match style {
        StyleTag::Heading1 => "md-h1",
        StyleTag::Heading2 => "md-h2",
        StyleTag::Heading3 => "md-h3",
        StyleTag::Bold => "md-bold",
        StyleTag::Italic => "md-italic",
        StyleTag::InlineCode => "md-code",
        StyleTag::CodeBlock => "md-code-block",
        StyleTag::Blockquote => "md-quote",
        StyleTag::Strikethrough => "md-strike",
        StyleTag::Link => "md-link",
        StyleTag::ListBullet => "md-bullet",
        StyleTag::ListNumber => "md-number",
        StyleTag::ListItem => "md-list-item",
    }
}

/// Highlight layer drawn under the transparent editor textarea. The text is
/// reproduced exactly; each run of characters sharing the same styles gets
/// one `<span>` carrying all of their classes, so overlapping spans never
/// produce crossed tags.
#[derive(Clone, Copy, Debug, Default)]
pub struct HtmlRenderer;

impl StyleRenderer for HtmlRenderer {
    fn render_line(&self, line: &str, spans: &[Annotation]) -> String {
        if spans.is_empty() {
            return escape_html(line);
        }
        let chars: Vec<char> = line.chars().collect();
        let mut bounds: Vec<usize> = spans.iter().flat_map(|s| [s.start, s.end]).collect();
        bounds.push(0);
        bounds.push(chars.len());
        bounds.sort_unstable();
        bounds.dedup();

        let mut out = String::new();
        for pair in bounds.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let segment: String = chars[from..to].iter().collect();
            let mut active: Vec<StyleTag> = spans
                .iter()
                .filter(|s| s.start <= from && to <= s.end)
                .map(|s| s.style)
                .collect();
            if active.is_empty() {
                out.push_str(&escape_html(&segment));
                continue;
            }
            active.sort_unstable();
            active.dedup();
            let classes: Vec<&str> = active.into_iter().map(css_class).collect();
            out.push_str("<span class=\"");
            out.push_str(&classes.join(" "));
            out.push_str("\">");
            out.push_str(&escape_html(&segment));
            out.push_str("</span>");
        }
        out
    }
}

/// Compact markup for list rows: markdown delimiters are dropped and the
/// remaining text is wrapped in simple tags (`<b>`, `<i>`, `<tt>`, `<s>`,
/// `<u>`). Bullets become `•`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreviewRenderer;

impl PreviewRenderer {
    fn inline_parts(style: StyleTag, inner: &[char]) -> Option<(&'static str, &'static str, usize, usize)> {
        match style {
            StyleTag::Bold => Some(("<b>", "</b>", 2, 2)),
            StyleTag::Italic => Some(("<i>", "</i>", 1, 1)),
            StyleTag::InlineCode => Some(("<tt>", "</tt>", 1, 1)),
            StyleTag::Strikethrough => Some(("<s>", "</s>", 2, 2)),
            StyleTag::Link => {
                let label_end = (2..inner.len().saturating_sub(1))
                    .find(|&i| inner[i] == ']' && inner[i + 1] == '(')?;
                Some(("<u>", "</u>", 1, inner.len() - label_end))
            }
            _ => None,
        }
    }

    fn render_inline(&self, chars: &[char], from: usize, spans: &[Annotation]) -> String {
        let mut inline: Vec<Annotation> = spans
            .iter()
            .copied()
            .filter(|s| s.style.is_inline() && s.start >= from)
            .collect();
        inline.sort_by_key(|s| (s.start, std::cmp::Reverse(s.end)));

        let mut out = String::new();
        let mut pos = from;
        for span in inline {
            if span.start < pos {
                continue;
            }
            let whole = &chars[span.start..span.end];
            let Some((open, close, lead, trail)) = Self::inline_parts(span.style, whole) else {
                continue;
            };
            let text: String = chars[pos..span.start].iter().collect();
            out.push_str(&escape_html(&text));
            let inner: String = whole[lead..whole.len() - trail].iter().collect();
            out.push_str(open);
            out.push_str(&escape_html(&inner));
            out.push_str(close);
            pos = span.end;
        }
        let rest: String = chars[pos..].iter().collect();
        out.push_str(&escape_html(&rest));
        out
    }
}

impl StyleRenderer for PreviewRenderer {
    fn render_line(&self, line: &str, spans: &[Annotation]) -> String {
        let chars: Vec<char> = line.chars().collect();
        let block = spans.iter().find(|s| !s.style.is_inline() && s.style != StyleTag::ListItem);

        match block.map(|s| (s.style, s.end)) {
            Some((StyleTag::Heading1, _)) => heading(&chars, 2),
            Some((StyleTag::Heading2, _)) => heading(&chars, 3),
            Some((StyleTag::Heading3, _)) => heading(&chars, 4),
            Some((StyleTag::CodeBlock, _)) => {
                let text: String = chars.iter().collect();
                format!("<tt>{}</tt>", escape_html(text.trim_start()))
            }
            Some((StyleTag::Blockquote, _)) => escape_html(line),
            Some((StyleTag::ListBullet, marker_end)) => {
                format!("• {}", self.render_inline(&chars, marker_end, spans))
            }
            Some((StyleTag::ListNumber, marker_end)) => {
                let marker: String = chars[..marker_end].iter().collect();
                format!(
                    "{} {}",
                    marker.trim(),
                    self.render_inline(&chars, marker_end, spans)
                )
            }
            _ => self.render_inline(&chars, 0, spans),
        }
    }
}

fn heading(chars: &[char], marker_len: usize) -> String {
    let text: String = chars[marker_len.min(chars.len())..].iter().collect();
    format!("<b>{}</b>", escape_html(text.trim()))
}

/// Full rendering for the read-only memo view. Raw HTML in the memo is
/// shown as text.
pub fn detail_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}
