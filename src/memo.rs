//! Memo records as returned by the server, and the month/pinned grouping
//! used by the list view.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const PINNED_SECTION: &str = "Pinned";
pub const UNKNOWN_SECTION: &str = "Unknown";
pub const PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "type")]
    pub mime_type: String,
    #[serde(default, deserialize_with = "size_from_json")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_link: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().contains("image")
    }

    /// Path of the file body relative to the server base URL, e.g.
    /// `/file/attachments/abc/photo.png`.
    pub fn file_path(&self) -> Option<String> {
        if self.name.is_empty() || self.filename.is_empty() {
            return None;
        }
        Some(format!("/file/{}/{}", self.name, urlencoding::encode(&self.filename)))
    }

    pub fn size_label(&self) -> String {
        format!("{:.1} KB", self.size as f64 / 1024.0)
    }
}

// int64 fields arrive as JSON strings from the gateway.
fn size_from_json<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Older servers call attachments "resources".
    #[serde(default, skip_serializing)]
    pub resources: Vec<Attachment>,
}

impl Memo {
    pub fn attachments(&self) -> &[Attachment] {
        if self.resources.is_empty() {
            &self.attachments
        } else {
            &self.resources
        }
    }

    /// The first attachment, when it is an image the row can show.
    pub fn thumbnail(&self) -> Option<&Attachment> {
        self.attachments()
            .first()
            .filter(|a| a.is_image() && a.file_path().is_some())
    }

    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        self.create_time.as_deref().and_then(parse_timestamp)
    }

    /// Row text: the first 200 code points, with `...` when cut.
    pub fn preview(&self) -> String {
        let mut chars = self.content.chars();
        let mut preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            preview.push_str("...");
        }
        preview
    }

    pub fn display_date(&self) -> Option<String> {
        self.created_at()
            .map(|dt| dt.format("%B %d, %Y at %I:%M %p").to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoPage {
    #[serde(default)]
    pub memos: Vec<Memo>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl MemoPage {
    pub fn next_page(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|token| !token.is_empty())
    }
}

pub fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(ts.trim()).ok()
}

/// Section a memo is listed under: "Pinned", its creation month such as
/// "October 2026", or "Unknown" without a readable timestamp.
pub fn section_title(memo: &Memo) -> String {
    if memo.pinned {
        return PINNED_SECTION.to_string();
    }
    match memo.created_at() {
        Some(dt) => dt.format("%B %Y").to_string(),
        None => UNKNOWN_SECTION.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoSection {
    pub title: String,
    pub memos: Vec<Memo>,
}

/// Groups memos into sections. Pinned memos lead; month sections keep the
/// order in which the server listed their first memo.
pub fn group_memos(memos: Vec<Memo>) -> Vec<MemoSection> {
    let mut sections = Vec::new();
    merge_into_sections(&mut sections, memos);
    sections
}

fn merge_into_sections(sections: &mut Vec<MemoSection>, memos: Vec<Memo>) -> usize {
    let mut added = 0;
    for memo in memos {
        let title = section_title(&memo);
        match sections.iter_mut().find(|section| section.title == title) {
            Some(section) => section.memos.push(memo),
            None => {
                let section = MemoSection {
                    title,
                    memos: vec![memo],
                };
                if section.title == PINNED_SECTION {
                    sections.insert(0, section);
                } else {
                    sections.push(section);
                }
            }
        }
        added += 1;
    }
    added
}

/// Paginated memo list as shown in the main view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoFeed {
    sections: Vec<MemoSection>,
    page_token: Option<String>,
    loading_more: bool,
}

impl MemoFeed {
    pub fn from_page(page: MemoPage) -> Self {
        let page_token = page.next_page().map(str::to_string);
        Self {
            sections: group_memos(page.memos),
            page_token,
            loading_more: false,
        }
    }

    pub fn sections(&self) -> &[MemoSection] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.memos.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.page_token.is_some()
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn memos(&self) -> impl Iterator<Item = &Memo> {
        self.sections.iter().flat_map(|s| s.memos.iter())
    }

    /// Token for the next page, or `None` when nothing is left or a load is
    /// already running. Marks the feed as loading.
    pub fn begin_load_more(&mut self) -> Option<String> {
        if self.loading_more {
            return None;
        }
        let token = self.page_token.clone()?;
        self.loading_more = true;
        Some(token)
    }

    /// Merges a fetched page. An empty page ends pagination. Returns the
    /// number of memos added.
    pub fn finish_load_more(&mut self, page: MemoPage) -> usize {
        self.loading_more = false;
        if page.memos.is_empty() {
            self.page_token = None;
            return 0;
        }
        self.page_token = page.next_page().map(str::to_string);
        merge_into_sections(&mut self.sections, page.memos)
    }

    pub fn fail_load_more(&mut self) {
        self.loading_more = false;
        self.page_token = None;
    }

    /// Replaces a memo in place after an update, regrouping if its section
    /// changed (e.g. it was pinned).
    pub fn upsert(&mut self, memo: Memo) {
        let title = section_title(&memo);
        for section in &mut self.sections {
            if let Some(slot) = section.memos.iter_mut().find(|m| m.name == memo.name) {
                if section.title == title {
                    *slot = memo;
                    return;
                }
            }
        }
        self.remove(&memo.name);
        let mut memos = vec![memo];
        if title != PINNED_SECTION {
            if let Some(section) = self.sections.iter_mut().find(|s| s.title == title) {
                memos.append(&mut section.memos);
                section.memos = memos;
                return;
            }
        }
        merge_into_sections(&mut self.sections, memos);
    }

    pub fn remove(&mut self, name: &str) {
        for section in &mut self.sections {
            section.memos.retain(|m| m.name != name);
        }
        self.sections.retain(|s| !s.memos.is_empty());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeatLevel {
    Empty,
    Low,
    Medium,
    High,
}

impl HeatLevel {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => HeatLevel::Empty,
            1..=3 => HeatLevel::Low,
            4..=10 => HeatLevel::Medium,
            _ => HeatLevel::High,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            HeatLevel::Empty => "heat-empty",
            HeatLevel::Low => "heat-low",
            HeatLevel::Medium => "heat-medium",
            HeatLevel::High => "heat-high",
        }
    }
}

/// Memos created per calendar day, in the timestamp's own offset.
pub fn daily_counts<'a>(memos: impl IntoIterator<Item = &'a Memo>) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for memo in memos {
        if let Some(dt) = memo.created_at() {
            *counts.entry(dt.date_naive()).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeatCell {
    pub day: u32,
    pub count: usize,
    pub level: HeatLevel,
}

/// Calendar grid for one month, Monday first. Leading `None`s pad the first
/// week. Returns an empty grid for an invalid month.
pub fn month_grid(year: i32, month: u32, counts: &BTreeMap<NaiveDate, usize>) -> Vec<Option<HeatCell>> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let days = next_month
        .map(|next| (next - first).num_days())
        .unwrap_or(31);

    let lead = first.weekday().num_days_from_monday() as usize;
    let mut grid = vec![None; lead];
    for offset in 0..days {
        let date = first + Duration::days(offset);
        let count = counts.get(&date).copied().unwrap_or(0);
        grid.push(Some(HeatCell {
            day: date.day(),
            count,
            level: HeatLevel::for_count(count),
        }));
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memo(name: &str, created: &str, pinned: bool) -> Memo {
        Memo {
            name: name.to_string(),
            content: format!("content of {name}"),
            pinned,
            create_time: Some(created.to_string()),
            ..Memo::default()
        }
    }

    #[test]
    fn groups_by_month_in_listing_order() {
        let sections = group_memos(vec![
            memo("memos/3", "2026-10-02T08:00:00Z", false),
            memo("memos/2", "2026-09-30T23:00:00Z", false),
            memo("memos/1", "2026-10-01T09:00:00Z", false),
        ]);
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["October 2026", "September 2026"]);
        assert_eq!(sections[0].memos.len(), 2);
    }

    #[test]
    fn pinned_section_comes_first() {
        let sections = group_memos(vec![
            memo("memos/2", "2026-10-02T08:00:00Z", false),
            memo("memos/1", "2025-01-01T00:00:00Z", true),
        ]);
        assert_eq!(sections[0].title, PINNED_SECTION);
        assert_eq!(sections[0].memos[0].name, "memos/1");
        assert_eq!(sections[1].title, "October 2026");
    }

    #[test]
    fn unreadable_timestamps_are_unknown() {
        let mut broken = memo("memos/1", "yesterday", false);
        assert_eq!(section_title(&broken), UNKNOWN_SECTION);
        broken.create_time = None;
        assert_eq!(section_title(&broken), UNKNOWN_SECTION);
    }

    #[test]
    fn deserializes_server_json() {
        let page: MemoPage = serde_json::from_str(
            r#"{
                "memos": [{
                    "name": "memos/42",
                    "content": "hello",
                    "pinned": true,
                    "createTime": "2026-10-18T10:15:00Z",
                    "resources": [{"name": "attachments/7", "filename": "a.png", "type": "image/png", "size": "2048"}]
                }],
                "nextPageToken": ""
            }"#,
        )
        .unwrap();
        assert_eq!(page.next_page(), None);
        let memo = &page.memos[0];
        assert!(memo.pinned);
        assert_eq!(memo.attachments().len(), 1);
        assert_eq!(memo.attachments()[0].size, 2048);
        assert!(memo.attachments()[0].is_image());
        assert_eq!(memo.display_date().as_deref(), Some("October 18, 2026 at 10:15 AM"));
    }

    #[test]
    fn attachment_paths_and_labels() {
        let photo = Attachment {
            name: "attachments/abc".to_string(),
            filename: "my photo.PNG".to_string(),
            mime_type: "Image/PNG".to_string(),
            size: 1536,
            ..Attachment::default()
        };
        assert!(photo.is_image());
        assert_eq!(photo.file_path().as_deref(), Some("/file/attachments/abc/my%20photo.PNG"));
        assert_eq!(photo.size_label(), "1.5 KB");

        let unnamed = Attachment {
            mime_type: "image/jpeg".to_string(),
            ..Attachment::default()
        };
        assert_eq!(unnamed.file_path(), None);
    }

    #[test]
    fn thumbnail_is_first_attachment_only_if_image() {
        let pdf = Attachment {
            name: "attachments/1".to_string(),
            filename: "a.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            ..Attachment::default()
        };
        let png = Attachment {
            name: "attachments/2".to_string(),
            filename: "b.png".to_string(),
            mime_type: "image/png".to_string(),
            ..Attachment::default()
        };
        let memo = Memo {
            attachments: vec![pdf.clone(), png.clone()],
            ..Memo::default()
        };
        assert_eq!(memo.thumbnail(), None);

        let memo = Memo {
            resources: vec![png.clone(), pdf],
            ..Memo::default()
        };
        assert_eq!(memo.thumbnail(), Some(&png));
    }

    #[test]
    fn preview_truncates_on_code_points() {
        let mut m = Memo::default();
        m.content = "é".repeat(PREVIEW_CHARS);
        assert_eq!(m.preview(), m.content);
        m.content.push('x');
        let preview = m.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn feed_pagination_merges_sections() {
        let mut feed = MemoFeed::from_page(MemoPage {
            memos: vec![memo("memos/3", "2026-10-02T08:00:00Z", false)],
            next_page_token: Some("page-2".to_string()),
        });
        assert!(feed.has_more());
        assert_eq!(feed.begin_load_more().as_deref(), Some("page-2"));
        assert_eq!(feed.begin_load_more(), None);

        let added = feed.finish_load_more(MemoPage {
            memos: vec![
                memo("memos/2", "2026-10-01T08:00:00Z", false),
                memo("memos/1", "2026-08-01T08:00:00Z", false),
            ],
            next_page_token: None,
        });
        assert_eq!(added, 2);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.sections().len(), 2);
        assert!(!feed.has_more());
        assert_eq!(feed.begin_load_more(), None);
    }

    #[test]
    fn empty_page_ends_pagination() {
        let mut feed = MemoFeed::from_page(MemoPage {
            memos: vec![memo("memos/1", "2026-10-02T08:00:00Z", false)],
            next_page_token: Some("t".to_string()),
        });
        feed.begin_load_more();
        assert_eq!(feed.finish_load_more(MemoPage::default()), 0);
        assert!(!feed.has_more());
        assert!(!feed.is_loading_more());
    }

    #[test]
    fn upsert_moves_newly_pinned_memo() {
        let mut feed = MemoFeed::from_page(MemoPage {
            memos: vec![
                memo("memos/2", "2026-10-02T08:00:00Z", false),
                memo("memos/1", "2026-10-01T08:00:00Z", false),
            ],
            next_page_token: None,
        });
        let mut pinned = memo("memos/1", "2026-10-01T08:00:00Z", true);
        pinned.content = "edited".to_string();
        feed.upsert(pinned);

        assert_eq!(feed.sections()[0].title, PINNED_SECTION);
        assert_eq!(feed.sections()[0].memos[0].content, "edited");
        assert_eq!(feed.sections()[1].memos.len(), 1);

        feed.remove("memos/1");
        assert_eq!(feed.sections().len(), 1);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn upsert_new_memo_goes_to_top_of_its_month() {
        let mut feed = MemoFeed::from_page(MemoPage {
            memos: vec![memo("memos/1", "2026-10-01T08:00:00Z", false)],
            next_page_token: None,
        });
        feed.upsert(memo("memos/2", "2026-10-18T08:00:00Z", false));
        let names: Vec<_> = feed.memos().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["memos/2", "memos/1"]);
    }

    #[test]
    fn heat_levels_and_month_grid() {
        assert_eq!(HeatLevel::for_count(0), HeatLevel::Empty);
        assert_eq!(HeatLevel::for_count(3), HeatLevel::Low);
        assert_eq!(HeatLevel::for_count(10), HeatLevel::Medium);
        assert_eq!(HeatLevel::for_count(11), HeatLevel::High);

        let memos = vec![
            memo("memos/1", "2026-10-18T08:00:00Z", false),
            memo("memos/2", "2026-10-18T20:00:00Z", false),
            memo("memos/3", "2026-10-01T08:00:00Z", false),
        ];
        let counts = daily_counts(&memos);
        let grid = month_grid(2026, 10, &counts);
        // 2026-10-01 is a Thursday.
        assert_eq!(grid.iter().take_while(|c| c.is_none()).count(), 3);
        assert_eq!(grid.iter().flatten().count(), 31);
        let day18 = grid.iter().flatten().find(|c| c.day == 18).unwrap();
        assert_eq!(day18.count, 2);
        assert_eq!(day18.level, HeatLevel::Low);
        assert!(month_grid(2026, 13, &counts).is_empty());
    }
}
