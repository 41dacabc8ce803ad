use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Byte range inside a `Document`. The browser reports UTF-16 positions;
/// convert with [`utf16_to_byte`] before building one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn cursor(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn is_cursor(self) -> bool {
        self.start == self.end
    }

    fn clamp_to(self, text: &str) -> Self {
        Self::new(
            floor_char_boundary(text, self.start),
            floor_char_boundary(text, self.end),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub start: usize,
    pub end: usize,
    pub insert: String,
}

impl TextChange {
    pub fn new(start: usize, end: usize, insert: impl Into<String>) -> Self {
        Self {
            start,
            end,
            insert: insert.into(),
        }
    }
}

/// One replacement plus where the selection lands afterwards. Commands
/// build these; typed input goes through [`Document::replace_from_input`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub change: TextChange,
    pub selection_after: Selection,
}

impl Edit {
    pub fn new(change: TextChange, selection_after: Selection) -> Self {
        Self {
            change,
            selection_after,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub text_changed: bool,
    pub selection_changed: bool,
    pub revision: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("change {start}..{end} is outside the document (len {len}) or splits a character")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },
}

/// The text being edited plus its selection. `revision` increases on every
/// text change and identifies which content a set of annotations belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub selection: Selection,
    pub revision: u64,
}

impl Document {
    pub fn new(text: String) -> Self {
        let len = text.len();
        Self {
            text,
            selection: Selection::cursor(len),
            revision: 0,
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection.clamp_to(&self.text);
    }

    pub fn replace_from_input(&mut self, new_text: String, selection: Selection) -> ApplyOutcome {
        let next_selection = selection.clamp_to(&new_text);
        let text_changed = self.text != new_text;
        let selection_changed = self.selection != next_selection;

        self.text = new_text;
        self.selection = next_selection;
        if text_changed {
            self.revision += 1;
        }

        ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        }
    }

    pub fn apply_edit(&mut self, edit: Edit) -> Result<ApplyOutcome, CoreError> {
        let TextChange { start, end, insert } = edit.change;
        if start > end
            || end > self.text.len()
            || !self.text.is_char_boundary(start)
            || !self.text.is_char_boundary(end)
        {
            return Err(CoreError::InvalidRange {
                start,
                end,
                len: self.text.len(),
            });
        }

        let mut next_text = String::with_capacity(self.text.len() + insert.len());
        next_text.push_str(&self.text[..start]);
        next_text.push_str(&insert);
        next_text.push_str(&self.text[end..]);
        let next_selection = edit.selection_after.clamp_to(&next_text);

        let text_changed = self.text != next_text;
        let selection_changed = self.selection != next_selection;

        self.text = next_text;
        self.selection = next_selection;
        if text_changed {
            self.revision += 1;
        }

        Ok(ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        })
    }
}

/// What Enter should do on a list line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContinuationAction {
    /// Insert this text at the cursor and swallow the key press.
    InsertText(String),
    /// Remove `start..end` (code points, line-local) and let the newline
    /// through.
    DeleteRange { start: usize, end: usize },
    NoAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListMarker {
    Ordered { indent: String, number: String },
    Unordered { indent: String, bullet: char },
}

/// Marker of the list item starting `line_prefix`, and whether anything
/// other than whitespace follows it.
pub fn parse_list_marker(line_prefix: &str) -> Option<(ListMarker, bool)> {
    static RE_OL: OnceLock<Regex> = OnceLock::new();
    static RE_UL: OnceLock<Regex> = OnceLock::new();

    let re_ol = RE_OL.get_or_init(|| {
        Regex::new(r"^(\s*)(\d+)\.\s+(.*)$").expect("valid ordered list regex")
    });
    let re_ul = RE_UL.get_or_init(|| {
        Regex::new(r"^(\s*)([-*+])\s+(.*)$").expect("valid unordered list regex")
    });

    if let Some(cap) = re_ol.captures(line_prefix) {
        let body = cap.get(3).map(|m| m.as_str()).unwrap_or_default();
        let marker = ListMarker::Ordered {
            indent: cap[1].to_string(),
            number: cap[2].to_string(),
        };
        return Some((marker, !body.trim().is_empty()));
    }

    let cap = re_ul.captures(line_prefix)?;
    let body = cap.get(3).map(|m| m.as_str()).unwrap_or_default();
    let bullet = cap[2].chars().next().unwrap_or('-');
    let marker = ListMarker::Unordered {
        indent: cap[1].to_string(),
        bullet,
    };
    Some((marker, !body.trim().is_empty()))
}

fn is_decimal_digit(ch: char) -> bool {
    static RE_DIGIT: OnceLock<Regex> = OnceLock::new();
    let re = RE_DIGIT.get_or_init(|| Regex::new(r"^\d$").expect("valid digit regex"));
    let mut buf = [0u8; 4];
    re.is_match(ch.encode_utf8(&mut buf))
}

/// Value of a Unicode decimal digit. Every script's digits form runs of ten
/// starting at zero, and adjacent runs (the mathematical styles) are laid
/// out back to back, so the value is the distance from the run start mod 10.
fn digit_value(ch: char) -> Option<u8> {
    if let Some(value) = ch.to_digit(10) {
        return u8::try_from(value).ok();
    }
    if !is_decimal_digit(ch) {
        return None;
    }
    let mut first = ch as u32;
    while let Some(prev) = first.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        first -= 1;
    }
    u8::try_from((ch as u32 - first) % 10).ok()
}

/// Decimal successor of a digit string without a width limit, written with
/// ASCII digits. Any Unicode decimal digits are accepted, and leading zeros
/// are dropped, so `"009"` becomes `"10"` and `"٣"` becomes `"4"`.
fn next_number(digits: &str) -> Option<String> {
    let digits = digits
        .chars()
        .map(|ch| digit_value(ch).map(|v| char::from(b'0' + v)))
        .collect::<Option<String>>()?;
    if digits.is_empty() {
        return None;
    }
    if let Ok(n) = digits.parse::<u64>() {
        if let Some(next) = n.checked_add(1) {
            return Some(next.to_string());
        }
    }
    let trimmed = digits.trim_start_matches('0');
    let mut out: Vec<u8> = trimmed.bytes().collect();
    let mut carry = true;
    for b in out.iter_mut().rev() {
        if !carry {
            break;
        }
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            carry = false;
        }
    }
    if carry {
        out.insert(0, b'1');
    }
    String::from_utf8(out).ok()
}

/// Decides how Enter continues or ends a list. Only the part of the line
/// before the cursor (`cursor` in code points) is considered.
pub fn on_enter(current_line: &str, cursor: usize) -> ContinuationAction {
    let prefix_end = current_line
        .char_indices()
        .nth(cursor)
        .map(|(i, _)| i)
        .unwrap_or(current_line.len());
    let line_prefix = &current_line[..prefix_end];
    let cursor = line_prefix.chars().count();

    let Some((marker, has_content)) = parse_list_marker(line_prefix) else {
        return ContinuationAction::NoAction;
    };
    if !has_content {
        return ContinuationAction::DeleteRange {
            start: 0,
            end: cursor,
        };
    }
    match marker {
        ListMarker::Ordered { indent, number } => match next_number(&number) {
            Some(next) => ContinuationAction::InsertText(format!("\n{indent}{next}. ")),
            None => ContinuationAction::NoAction,
        },
        ListMarker::Unordered { indent, bullet } => {
            ContinuationAction::InsertText(format!("\n{indent}{bullet} "))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkdownCommand {
    Wrap {
        open: &'static str,
        close: &'static str,
        label: &'static str,
    },
    PrefixLine {
        prefix: &'static str,
        label: &'static str,
    },
    ContinueList,
}

impl MarkdownCommand {
    pub const BOLD: Self = Self::Wrap {
        open: "**",
        close: "**",
        label: "Bold",
    };
    pub const ITALIC: Self = Self::Wrap {
        open: "*",
        close: "*",
        label: "Italic",
    };
    pub const CODE: Self = Self::Wrap {
        open: "`",
        close: "`",
        label: "Inline code",
    };
    pub const STRIKETHROUGH: Self = Self::Wrap {
        open: "~~",
        close: "~~",
        label: "Strikethrough",
    };
    pub const LINK: Self = Self::Wrap {
        open: "[",
        close: "](url)",
        label: "Link",
    };
    pub const HEADING: Self = Self::PrefixLine {
        prefix: "# ",
        label: "Heading",
    };
    pub const QUOTE: Self = Self::PrefixLine {
        prefix: "> ",
        label: "Quote",
    };
    pub const BULLET_LIST: Self = Self::PrefixLine {
        prefix: "- ",
        label: "Bullet list",
    };
    pub const NUMBERED_LIST: Self = Self::PrefixLine {
        prefix: "1. ",
        label: "Numbered list",
    };

    /// Human-readable name, used for toolbar tooltips.
    pub fn label(self) -> &'static str {
        match self {
            Self::Wrap { label, .. } | Self::PrefixLine { label, .. } => label,
            Self::ContinueList => "Continue list",
        }
    }
}

/// Result of running a command against a document. `consumed` tells the
/// caller to suppress the key's default handling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub changed: bool,
    pub consumed: bool,
}

pub fn apply_markdown_command(
    document: &mut Document,
    command: MarkdownCommand,
) -> Result<CommandOutcome, CoreError> {
    let Some((edit, consumed)) = build_markdown_edit(document, command) else {
        return Ok(CommandOutcome::default());
    };
    let outcome = document.apply_edit(edit)?;
    log::debug!("{} -> revision {}", command.label(), outcome.revision);
    Ok(CommandOutcome {
        changed: outcome.text_changed || outcome.selection_changed,
        consumed,
    })
}

fn build_markdown_edit(document: &Document, command: MarkdownCommand) -> Option<(Edit, bool)> {
    match command {
        MarkdownCommand::Wrap { open, close, .. } => Some((wrap_edit(document, open, close), true)),
        MarkdownCommand::PrefixLine { prefix, .. } => Some((prefix_line_edit(document, prefix), true)),
        MarkdownCommand::ContinueList => continue_list_edit(document),
    }
}

fn wrap_edit(document: &Document, open: &str, close: &str) -> Edit {
    let selection = document.selection.clamp_to(&document.text);
    let mut insert = String::new();
    insert.push_str(open);
    insert.push_str(&document.text[selection.start..selection.end]);
    insert.push_str(close);
    let selection_after = if selection.is_cursor() {
        Selection::cursor(selection.start + open.len())
    } else {
        // Keep the wrapped text selected so a second command can nest.
        Selection::new(selection.start + open.len(), selection.end + open.len())
    };
    Edit::new(TextChange::new(selection.start, selection.end, insert), selection_after)
}

fn prefix_line_edit(document: &Document, prefix: &str) -> Edit {
    let selection = document.selection.clamp_to(&document.text);
    let start = line_start(&document.text, selection.start);
    Edit::new(
        TextChange::new(start, start, prefix),
        Selection::new(selection.start + prefix.len(), selection.end + prefix.len()),
    )
}

fn continue_list_edit(document: &Document) -> Option<(Edit, bool)> {
    let text = &document.text;
    let selection = document.selection.clamp_to(text);
    if !selection.is_cursor() {
        return None;
    }

    let ls = line_start(text, selection.start);
    let le = line_end(text, selection.start);
    let line = &text[ls..le];
    let cursor_in_line = text[ls..selection.start].chars().count();

    match on_enter(line, cursor_in_line) {
        ContinuationAction::InsertText(insert) => {
            let next_cursor = selection.start + insert.len();
            let change = TextChange::new(selection.start, selection.end, insert);
            Some((Edit::new(change, Selection::cursor(next_cursor)), true))
        }
        ContinuationAction::DeleteRange { start, end } => {
            let start = ls + char_to_byte(line, start);
            let end = ls + char_to_byte(line, end);
            Some((Edit::new(TextChange::new(start, end, ""), Selection::cursor(start)), false))
        }
        ContinuationAction::NoAction => None,
    }
}

pub fn line_start(text: &str, pos: usize) -> usize {
    let clamped = floor_char_boundary(text, pos);
    text[..clamped].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

pub fn line_end(text: &str, pos: usize) -> usize {
    let clamped = floor_char_boundary(text, pos);
    text[clamped..]
        .find('\n')
        .map(|i| clamped + i)
        .unwrap_or(text.len())
}

fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Byte offset of the code point at `chars`, clamped to the end of `text`.
pub fn char_to_byte(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Byte offset for a UTF-16 position as reported by `selectionStart`.
pub fn utf16_to_byte(text: &str, utf16: usize) -> usize {
    let mut units = 0usize;
    for (byte, ch) in text.char_indices() {
        if units >= utf16 {
            return byte;
        }
        units += ch.len_utf16();
    }
    text.len()
}

pub fn byte_to_utf16(text: &str, byte: usize) -> usize {
    let byte = floor_char_boundary(text, byte);
    text[..byte].chars().map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_end(text: &str) -> Document {
        let mut document = Document::new(text.to_string());
        document.set_selection(Selection::cursor(text.len()));
        document
    }

    #[test]
    fn applies_edit_and_places_selection() {
        let mut document = Document::new("hello world".to_string());
        document.set_selection(Selection::cursor(0));
        let edit = Edit::new(TextChange::new(6, 11, "memo"), Selection::cursor(10));

        let outcome = document.apply_edit(edit).unwrap();
        assert!(outcome.text_changed);
        assert_eq!(document.text, "hello memo");
        assert_eq!(document.selection, Selection::cursor(10));
        assert_eq!(document.revision, 1);
    }

    #[test]
    fn selection_after_is_clamped_to_new_text() {
        let mut document = Document::new("abc".to_string());
        let edit = Edit::new(TextChange::new(0, 3, "é"), Selection::cursor(1));
        document.apply_edit(edit).unwrap();
        assert_eq!(document.selection, Selection::cursor(0));
    }

    #[test]
    fn rejects_range_inside_a_character() {
        let mut document = Document::new("é".to_string());
        let edit = Edit::new(TextChange::new(1, 2, ""), Selection::cursor(0));
        assert!(matches!(
            document.apply_edit(edit),
            Err(CoreError::InvalidRange { .. })
        ));
        let edit = Edit::new(TextChange::new(0, 9, ""), Selection::cursor(0));
        assert!(matches!(
            document.apply_edit(edit),
            Err(CoreError::InvalidRange { len: 2, .. })
        ));
        assert_eq!(document.revision, 0);
    }

    #[test]
    fn wraps_selection_with_markdown() {
        let mut document = Document::new("memo".to_string());
        document.set_selection(Selection::new(0, 4));
        let outcome = apply_markdown_command(&mut document, MarkdownCommand::BOLD).unwrap();

        assert!(outcome.changed);
        assert_eq!(document.text, "**memo**");
        assert_eq!(document.selection, Selection::new(2, 6));
    }

    #[test]
    fn prefixes_current_line() {
        let mut document = Document::new("first\nsecond".to_string());
        document.set_selection(Selection::cursor(8));
        apply_markdown_command(&mut document, MarkdownCommand::QUOTE).unwrap();
        assert_eq!(document.text, "first\n> second");
        assert_eq!(document.selection, Selection::cursor(10));
    }

    #[test]
    fn enter_continues_ordered_list() {
        assert_eq!(
            on_enter("3. buy milk", 11),
            ContinuationAction::InsertText("\n4. ".to_string())
        );
        assert_eq!(
            on_enter("  9. nine", 9),
            ContinuationAction::InsertText("\n  10. ".to_string())
        );
    }

    #[test]
    fn enter_on_empty_item_ends_list() {
        assert_eq!(
            on_enter("3. ", 3),
            ContinuationAction::DeleteRange { start: 0, end: 3 }
        );
        assert_eq!(
            on_enter("  -   ", 6),
            ContinuationAction::DeleteRange { start: 0, end: 6 }
        );
    }

    #[test]
    fn enter_continues_unordered_list_with_same_marker() {
        assert_eq!(
            on_enter("    + nested", 12),
            ContinuationAction::InsertText("\n    + ".to_string())
        );
        assert_eq!(
            on_enter("* star", 6),
            ContinuationAction::InsertText("\n* ".to_string())
        );
    }

    #[test]
    fn enter_ignores_text_after_cursor() {
        // Cursor sits right after the marker, content follows it.
        assert_eq!(
            on_enter("- trailing", 2),
            ContinuationAction::DeleteRange { start: 0, end: 2 }
        );
        assert_eq!(on_enter("plain text", 5), ContinuationAction::NoAction);
        assert_eq!(on_enter("", 0), ContinuationAction::NoAction);
    }

    #[test]
    fn enter_counts_cursor_in_code_points() {
        assert_eq!(
            on_enter("- 😀", 3),
            ContinuationAction::InsertText("\n- ".to_string())
        );
    }

    #[test]
    fn next_number_handles_overflow() {
        assert_eq!(next_number("009").as_deref(), Some("10"));
        assert_eq!(
            next_number("18446744073709551615").as_deref(),
            Some("18446744073709551616")
        );
        assert_eq!(next_number("99999999999999999999").as_deref(), Some("100000000000000000000"));
    }

    #[test]
    fn next_number_reads_unicode_digits() {
        assert_eq!(next_number("٣").as_deref(), Some("4"));
        assert_eq!(next_number("१९").as_deref(), Some("20"));
        // U+1D7D8 is the zero of the second mathematical digit run.
        assert_eq!(next_number("\u{1D7DB}").as_deref(), Some("4"));
        assert_eq!(next_number("x1"), None);
        assert_eq!(
            on_enter("٣.\t_>  `2(", 10),
            ContinuationAction::InsertText("\n4. ".to_string())
        );
    }

    #[test]
    fn continue_list_command_inserts_marker() {
        let mut document = at_end("- item");
        let outcome = apply_markdown_command(&mut document, MarkdownCommand::ContinueList).unwrap();
        assert!(outcome.changed);
        assert!(outcome.consumed);
        assert_eq!(document.text, "- item\n- ");
        assert_eq!(document.selection, Selection::cursor(document.text.len()));
    }

    #[test]
    fn continue_list_command_clears_empty_marker() {
        let mut document = at_end("1. one\n2. ");
        let outcome = apply_markdown_command(&mut document, MarkdownCommand::ContinueList).unwrap();
        assert!(outcome.changed);
        assert!(!outcome.consumed);
        assert_eq!(document.text, "1. one\n");
        assert_eq!(document.selection, Selection::cursor(7));
    }

    #[test]
    fn continue_list_command_ignores_plain_lines() {
        let mut document = at_end("just text");
        let outcome = apply_markdown_command(&mut document, MarkdownCommand::ContinueList).unwrap();
        assert_eq!(outcome, CommandOutcome::default());
        assert_eq!(document.text, "just text");
    }

    #[test]
    fn converts_between_utf16_and_bytes() {
        let text = "a😀b";
        assert_eq!(utf16_to_byte(text, 0), 0);
        assert_eq!(utf16_to_byte(text, 1), 1);
        assert_eq!(utf16_to_byte(text, 3), 5);
        assert_eq!(utf16_to_byte(text, 4), 6);
        assert_eq!(byte_to_utf16(text, 5), 3);
        assert_eq!(char_to_byte(text, 2), 5);
    }
}
