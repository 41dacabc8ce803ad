use memories_ui::annotate::{accepts_inline, lines_with_offsets};
use memories_ui::editor_core::{MarkdownCommand, Selection};
use memories_ui::session::EditSession;
use memories_ui::{annotate, on_enter, ContinuationAction, StyleTag};

const SAMPLES: &[&str] = &[
    "",
    "plain text",
    "# Title with **bold**\nbody *it* and `code`",
    "## h2\n### h3\n#### not a heading",
    "> quote with ~~strike~~\n    code **x**\n\ttabbed",
    "- one\n- [link](http://x.y) **b**\n  3. nested _u_",
    "日本語 **太字** *斜体*\n🙂 `emoji`",
    "e\u{301} **b** ~~s\u{308}~~\n- a\u{20dd} `c\u{327}`",
    "***\n**a** *b* **c**\n*",
    "\n\n1. \n\n",
];

#[test]
fn annotate_is_deterministic_and_sorted() {
    for sample in SAMPLES {
        let first = annotate(sample);
        assert_eq!(first, annotate(sample), "{sample:?}");
        assert!(
            first.windows(2).all(|w| (w[0].start, w[0].style, w[0].end) <= (w[1].start, w[1].style, w[1].end)),
            "{sample:?} not sorted"
        );
    }
}

#[test]
fn spans_stay_within_one_line() {
    for sample in SAMPLES {
        let annotations = annotate(sample);
        let lines: Vec<(usize, usize)> = lines_with_offsets(sample)
            .map(|(offset, line)| (offset, offset + line.chars().count()))
            .collect();
        let chars: Vec<char> = sample.chars().collect();
        for a in &annotations {
            assert!(a.start < a.end, "{sample:?}: empty span {a:?}");
            let covered: String = chars[a.start..a.end].iter().collect();
            let delimiter = match a.style {
                StyleTag::Bold => Some("**"),
                StyleTag::Strikethrough => Some("~~"),
                StyleTag::InlineCode => Some("`"),
                _ => None,
            };
            if let Some(delimiter) = delimiter {
                assert!(
                    covered.starts_with(delimiter) && covered.ends_with(delimiter),
                    "{sample:?}: {a:?} covers {covered:?}"
                );
            }
            assert!(
                lines.iter().any(|&(from, to)| from <= a.start && a.end <= to),
                "{sample:?}: {a:?} crosses a line boundary"
            );
        }
    }
}

#[test]
fn exempt_lines_carry_no_inline_styles() {
    for sample in SAMPLES {
        let annotations = annotate(sample);
        for (offset, line) in lines_with_offsets(sample) {
            if accepts_inline(line) {
                continue;
            }
            let end = offset + line.chars().count();
            assert!(
                annotations
                    .iter()
                    .filter(|a| a.start >= offset && a.end <= end)
                    .all(|a| !a.style.is_inline()),
                "{line:?} got inline styles"
            );
        }
    }
}

#[test]
fn list_continuation_examples() {
    assert_eq!(on_enter("3. buy milk", 11), ContinuationAction::InsertText("\n4. ".to_string()));
    assert_eq!(on_enter("3. ", 3), ContinuationAction::DeleteRange { start: 0, end: 3 });
    assert_eq!(on_enter("  * a", 5), ContinuationAction::InsertText("\n  * ".to_string()));
    assert_eq!(on_enter("plain", 5), ContinuationAction::NoAction);
}

#[test]
fn typing_a_list_through_a_session() {
    let mut session = EditSession::new_memo();
    session.input("- milk".to_string(), Selection::cursor(6));

    let (outcome, _) = session.command(MarkdownCommand::ContinueList).unwrap();
    assert!(outcome.consumed);
    assert_eq!(session.document().text, "- milk\n- ");

    let (outcome, _) = session.command(MarkdownCommand::ContinueList).unwrap();
    assert!(outcome.changed);
    assert!(!outcome.consumed);
    assert_eq!(session.document().text, "- milk\n");

    session.restyle_now();
    let styles: Vec<StyleTag> = session.annotations().iter().map(|a| a.style).collect();
    assert_eq!(styles, vec![StyleTag::ListBullet, StyleTag::ListItem]);
}
