use crate::annotate::{annotate, Annotation};
use crate::api::{ApiError, MemosClient};
use crate::debounce::{SearchStep, SearchTracker, Ticket, AUTOSAVE_DELAY, RESTYLE_DELAY, SEARCH_DELAY};
use crate::editor_core::{byte_to_utf16, utf16_to_byte, MarkdownCommand, Selection};
use crate::memo::{daily_counts, group_memos, month_grid, Attachment, Memo, MemoFeed, MemoSection};
use crate::render::{detail_html, render_document, HtmlRenderer, PreviewRenderer};
use crate::session::{
    AttachmentBadge, EditEffects, EditSession, PendingAttachment, SaveRequest, MAX_ATTACHMENT_BYTES,
};
use crate::settings::{LocalStorageStore, Settings, REFRESH_CHOICES};
use chrono::Datelike;
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::time::Duration;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

const BASE_CSS: &str = r#"
:root { --accent: #6366f1; --muted: #6b7280; --border: #e5e7eb; --bg: #ffffff; --bg-alt: #f4f5f7; }
body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg); color: #1a1a1a; }
button { cursor: pointer; }
.md-h1 { font-weight: 700; color: #111827; }
.md-h2 { font-weight: 700; color: #1f2937; }
.md-h3 { font-weight: 600; color: #374151; }
.md-bold { font-weight: 700; color: #4f46e5; }
.md-italic { font-style: italic; }
.md-code, .md-code-block { background: #e9ecef; border-radius: 3px; }
.md-quote { color: #9ca3af; }
.md-strike { text-decoration: line-through; }
.md-link { color: #2563eb; text-decoration: underline; }
.md-bullet, .md-number { color: var(--accent); }
.heat-grid { display: grid; grid-template-columns: repeat(7, 1.4rem); gap: 3px; }
.heat-cell { height: 1.4rem; font-size: 0.6rem; border-radius: 3px; text-align: center; line-height: 1.4rem; }
.heat-empty { background: #ebedf0; }
.heat-low { background: #9be9a8; }
.heat-medium { background: #40c463; }
.heat-high { background: #216e39; color: white; }
.memo-row { padding: 0.6rem 0.8rem; border-bottom: 1px solid var(--border); cursor: pointer; }
.memo-row:hover { background: var(--bg-alt); }
.memo-date { color: var(--muted); font-size: 0.8rem; }
.memo-thumb { max-height: 4rem; max-width: 6rem; border-radius: 4px; margin-top: 0.3rem; }
.attachment-card { display: inline-flex; flex-direction: column; align-items: center; gap: 0.3rem; margin: 0 0.8rem 0.8rem 0; padding: 0.5rem; border: 1px solid var(--border); border-radius: 6px; max-width: 10rem; }
.attachment-card img { max-width: 9rem; max-height: 9rem; }
.saved-badge { margin-left: 0.3rem; padding: 0 0.3rem; border-radius: 3px; background: #dcfce7; color: #166534; }
"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Screen {
    Connect,
    Memos,
    Edit,
}

/// Everything the views share. All fields are arena handles, so the struct
/// is `Copy` and can move into any number of closures.
#[derive(Clone, Copy)]
struct AppState {
    settings: RwSignal<Settings>,
    client: RwSignal<Option<MemosClient>>,
    feed: RwSignal<MemoFeed>,
    search_results: RwSignal<Option<Vec<MemoSection>>>,
    search: StoredValue<SearchTracker>,
    search_timer: StoredValue<Option<TimeoutHandle>>,
    screen: RwSignal<Screen>,
    status: RwSignal<String>,
    session: StoredValue<EditSession>,
    /// Bumped whenever a different memo is opened; async results carrying
    /// an older epoch are dropped.
    session_epoch: StoredValue<u64>,
    editor_text: RwSignal<String>,
    highlight: RwSignal<String>,
    badge: RwSignal<AttachmentBadge>,
    saved_attachments: RwSignal<Vec<Attachment>>,
    pending_names: RwSignal<Vec<String>>,
    saving: RwSignal<bool>,
    restyle_timer: StoredValue<Option<TimeoutHandle>>,
    autosave_timer: StoredValue<Option<TimeoutHandle>>,
    refresh_timer: StoredValue<Option<IntervalHandle>>,
}

impl AppState {
    fn new(settings: Settings) -> Self {
        Self {
            settings: RwSignal::new(settings),
            client: RwSignal::new(None),
            feed: RwSignal::new(MemoFeed::default()),
            search_results: RwSignal::new(None),
            search: StoredValue::new(SearchTracker::default()),
            search_timer: StoredValue::new(None),
            screen: RwSignal::new(Screen::Connect),
            status: RwSignal::new(String::new()),
            session: StoredValue::new(EditSession::new_memo()),
            session_epoch: StoredValue::new(0),
            editor_text: RwSignal::new(String::new()),
            highlight: RwSignal::new(String::new()),
            badge: RwSignal::new(AttachmentBadge::default()),
            saved_attachments: RwSignal::new(Vec::new()),
            pending_names: RwSignal::new(Vec::new()),
            saving: RwSignal::new(false),
            restyle_timer: StoredValue::new(None),
            autosave_timer: StoredValue::new(None),
            refresh_timer: StoredValue::new(None),
        }
    }

    fn epoch(&self) -> u64 {
        self.session_epoch.get_value()
    }
}

fn load_settings() -> Settings {
    match LocalStorageStore::open().and_then(|store| Settings::load(&store)) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("using default settings: {err}");
            Settings::default()
        }
    }
}

fn persist_settings(settings: &Settings) {
    if let Err(err) = LocalStorageStore::open().and_then(|store| settings.save(&store)) {
        log::warn!("could not store settings: {err}");
    }
}

/// Overlay markup. The trailing newline keeps the layer as tall as the
/// textarea when the text ends in a line break.
fn overlay_html(text: &str, annotations: &[Annotation]) -> String {
    let mut html = render_document(&HtmlRenderer, text, annotations);
    html.push_str("\n ");
    html
}

fn preview_html(memo: &Memo) -> String {
    let preview = memo.preview();
    render_document(&PreviewRenderer, &preview, &annotate(&preview))
}

fn connect(state: AppState, server_url: String, token: String) {
    let mut settings = state.settings.get_untracked();
    if let Err(err) = settings.set_credentials(&server_url, &token) {
        state.status.set(err.to_string());
        return;
    }
    let client = MemosClient::new(&settings.server_url, &settings.api_token);
    state.status.set(format!("Connecting to {}...", client.base_url()));

    spawn_local(async move {
        let result = async {
            client.test_connection().await?;
            let user = match client.current_user().await {
                Ok(user) => Some(user),
                Err(err) => {
                    log::debug!("current user unavailable: {err}");
                    None
                }
            };
            let page = client.list_memos(None).await?;
            Ok::<_, ApiError>((user, page))
        }
        .await;

        match result {
            Ok((user, page)) => {
                let who = user
                    .map(|u| if u.display_name.is_empty() { u.username } else { u.display_name })
                    .unwrap_or_default();
                log::info!("connected to {} as {who:?}", client.base_url());
                persist_settings(&settings);
                state.settings.set(settings);
                state.client.set(Some(client));
                state.feed.set(MemoFeed::from_page(page));
                state.status.set(if who.is_empty() {
                    "Connected".to_string()
                } else {
                    format!("Connected as {who}")
                });
                state.screen.set(Screen::Memos);
                start_auto_refresh(state);
            }
            Err(err) => {
                log::error!("connection failed: {err}");
                state.status.set(format!("Connection failed: {err}"));
            }
        }
    });
}

fn disconnect(state: AppState) {
    stop_auto_refresh(state);
    let mut settings = state.settings.get_untracked();
    settings.clear_credentials();
    persist_settings(&settings);
    state.settings.set(settings);
    state.client.set(None);
    state.feed.set(MemoFeed::default());
    clear_search(state);
    state.screen.set(Screen::Connect);
    state.status.set("Disconnected".to_string());
}

fn refresh(state: AppState) {
    let Some(client) = state.client.get_untracked() else {
        return;
    };
    spawn_local(async move {
        match client.list_memos(None).await {
            Ok(page) => {
                log::debug!("refreshed {} memos", page.memos.len());
                state.feed.set(MemoFeed::from_page(page));
            }
            Err(err) => {
                log::warn!("refresh failed: {err}");
                state.status.set(format!("Refresh failed: {err}"));
            }
        }
    });
}

fn load_more(state: AppState) {
    let Some(client) = state.client.get_untracked() else {
        return;
    };
    let Some(token) = state.feed.try_update(|feed| feed.begin_load_more()).flatten() else {
        return;
    };
    spawn_local(async move {
        match client.list_memos(Some(&token)).await {
            Ok(page) => {
                let mut added = 0;
                let mut total = 0;
                state.feed.update(|feed| {
                    added = feed.finish_load_more(page);
                    total = feed.len();
                });
                log::debug!("loaded {added} more memos, {total} in total");
            }
            Err(err) => {
                log::warn!("loading more memos failed: {err}");
                state.feed.update(|feed| feed.fail_load_more());
                state.status.set(format!("Could not load more: {err}"));
            }
        }
    });
}

/// Debounces search-as-you-type. Each keystroke supersedes the previous
/// query, and only the response to the latest request is shown.
fn search_changed(state: AppState, raw: &str) {
    let step = state
        .search
        .try_update_value(|search| search.query_changed(raw));
    match step {
        Some(SearchStep::Schedule(ticket)) => {
            replace_timer(state.search_timer, SEARCH_DELAY, move || run_search(state, ticket));
        }
        Some(SearchStep::Clear) => clear_search(state),
        None => {}
    }
}

fn clear_search(state: AppState) {
    clear_timer(state.search_timer);
    state.search.update_value(SearchTracker::clear);
    state.search_results.set(None);
}

fn run_search(state: AppState, ticket: Ticket) {
    let Some(query) = state.search.try_update_value(|search| search.start(ticket)).flatten() else {
        return;
    };
    let Some(client) = state.client.get_untracked() else {
        return;
    };
    spawn_local(async move {
        let result = client.search_memos(&query).await;
        if !state.search.with_value(|search| search.accepts(ticket)) {
            log::debug!("dropping stale results for {query:?}");
            return;
        }
        match result {
            Ok(page) => {
                state.status.set(format!("{} matches for {query:?}", page.memos.len()));
                state.search_results.set(Some(group_memos(page.memos)));
            }
            Err(err) => {
                log::warn!("search failed: {err}");
                state.status.set(format!("Search failed: {err}"));
            }
        }
    });
}

fn stop_auto_refresh(state: AppState) {
    if let Some(handle) = state.refresh_timer.try_update_value(Option::take).flatten() {
        handle.clear();
    }
}

/// (Re)starts the periodic list refresh with the configured interval.
fn start_auto_refresh(state: AppState) {
    stop_auto_refresh(state);
    let minutes = state.settings.get_untracked().auto_refresh_minutes;
    let period = Duration::from_secs(u64::from(minutes) * 60);
    let tick = move || {
        if state.screen.get_untracked() == Screen::Memos && state.search_results.with_untracked(Option::is_none) {
            refresh(state);
        }
    };
    match set_interval_with_handle(tick, period) {
        Ok(handle) => {
            state.refresh_timer.set_value(Some(handle));
            log::debug!("auto refresh every {minutes} minutes");
        }
        Err(err) => log::warn!("could not start auto refresh: {err:?}"),
    }
}

fn replace_timer(
    slot: StoredValue<Option<TimeoutHandle>>,
    delay: Duration,
    callback: impl FnOnce() + 'static,
) {
    clear_timer(slot);
    match set_timeout_with_handle(callback, delay) {
        Ok(handle) => slot.set_value(Some(handle)),
        Err(err) => log::warn!("could not arm timer: {err:?}"),
    }
}

fn clear_timer(slot: StoredValue<Option<TimeoutHandle>>) {
    if let Some(handle) = slot.try_update_value(Option::take).flatten() {
        handle.clear();
    }
}

fn cancel_timers(state: AppState) {
    clear_timer(state.restyle_timer);
    clear_timer(state.autosave_timer);
}

fn arm_timers(state: AppState, effects: EditEffects) {
    if let Some(ticket) = effects.restyle {
        replace_timer(state.restyle_timer, RESTYLE_DELAY, move || {
            let html = state
                .session
                .try_update_value(|session| {
                    let text = session.document().text.clone();
                    session
                        .restyle(ticket)
                        .map(|annotations| overlay_html(&text, annotations))
                })
                .flatten();
            if let Some(html) = html {
                state.highlight.set(html);
            }
        });
    }
    if let Some(ticket) = effects.autosave {
        replace_timer(state.autosave_timer, AUTOSAVE_DELAY, move || {
            let request = state
                .session
                .try_update_value(|session| session.autosave(ticket))
                .flatten();
            if let Some(request) = request {
                run_save(state, request, true);
            }
        });
    }
}

fn sync_attachments(state: AppState) {
    let (badge, saved, names) = state.session.with_value(|session| {
        (
            session.badge(),
            session.existing_attachments().to_vec(),
            session
                .pending_attachments()
                .iter()
                .map(|p| p.filename.clone())
                .collect::<Vec<_>>(),
        )
    });
    state.badge.set(badge);
    state.saved_attachments.set(saved);
    state.pending_names.set(names);
}

fn open_editor(state: AppState, memo: Option<Memo>) {
    cancel_timers(state);
    let fetch_attachments = memo
        .as_ref()
        .filter(|m| m.attachments().is_empty())
        .map(|m| m.name.clone());
    let session = match memo {
        Some(memo) => EditSession::edit(memo),
        None => EditSession::new_memo(),
    };
    let text = session.document().text.clone();
    let html = overlay_html(&text, session.annotations());
    state.session.set_value(session);
    state.session_epoch.update_value(|epoch| *epoch += 1);
    state.editor_text.set(text);
    state.highlight.set(html);
    sync_attachments(state);
    state.screen.set(Screen::Edit);

    let (Some(name), Some(client)) = (fetch_attachments, state.client.get_untracked()) else {
        return;
    };
    let epoch = state.epoch();
    spawn_local(async move {
        match client.list_attachments(&name).await {
            Ok(attachments) if state.epoch() == epoch => {
                state
                    .session
                    .update_value(|session| session.set_existing_attachments(attachments));
                sync_attachments(state);
            }
            Ok(_) => {}
            Err(err) => log::warn!("could not list attachments of {name}: {err}"),
        }
    });
}

fn close_editor(state: AppState) {
    cancel_timers(state);
    let request = state.session.try_update_value(|session| {
        (!session.is_new() && session.is_dirty()).then(|| session.save_request())
    });
    if let Some(request) = request.flatten() {
        run_save(state, request, true);
    }
    state.screen.set(Screen::Memos);
}

/// Sends a save and applies the result if the same memo is still open.
fn run_save(state: AppState, request: SaveRequest, automatic: bool) {
    let Some(client) = state.client.get_untracked() else {
        state.status.set("Not connected".to_string());
        return;
    };
    let epoch = state.epoch();
    let (existing, pending) = state
        .session
        .try_update_value(|session| (session.existing_attachments().to_vec(), session.take_pending()))
        .unwrap_or_default();
    sync_attachments(state);
    state.saving.set(true);
    state.status.set("Saving...".to_string());

    spawn_local(async move {
        let result = client.save(&request, &existing, &pending).await;
        let current = state.epoch() == epoch;
        match result {
            Ok(memo) => {
                log::info!("saved {} (revision {})", memo.name, request.revision);
                state.feed.update(|feed| feed.upsert(memo.clone()));
                if current {
                    state
                        .session
                        .update_value(|session| session.mark_saved(request.revision, memo));
                    sync_attachments(state);
                }
                state.status.set(if automatic { "Saved automatically" } else { "Saved" }.to_string());
            }
            Err(err) => {
                log::error!("save failed: {err}");
                if current {
                    state.session.update_value(|session| {
                        for file in pending {
                            if let Err(err) = session.add_attachment(file) {
                                log::debug!("not re-queued: {err}");
                            }
                        }
                    });
                    sync_attachments(state);
                }
                state.status.set(format!("Save failed: {err}"));
            }
        }
        state.saving.set(false);
    });
}

fn delete_current(state: AppState) {
    let Some(name) = state.session.with_value(|s| s.memo().map(|m| m.name.clone())) else {
        return;
    };
    let Some(client) = state.client.get_untracked() else {
        return;
    };
    let confirmed = window()
        .confirm_with_message("Delete this memo?")
        .unwrap_or(false);
    if !confirmed {
        return;
    }
    cancel_timers(state);
    spawn_local(async move {
        match client.delete_memo(&name).await {
            Ok(()) => {
                log::info!("deleted {name}");
                state.feed.update(|feed| feed.remove(&name));
                state.status.set("Memo deleted".to_string());
                state.screen.set(Screen::Memos);
            }
            Err(err) => {
                log::error!("delete failed: {err}");
                state.status.set(format!("Delete failed: {err}"));
            }
        }
    });
}

fn read_selection(textarea: &web_sys::HtmlTextAreaElement, text: &str) -> Selection {
    let start = textarea.selection_start().ok().flatten().unwrap_or(0) as usize;
    let end = textarea
        .selection_end()
        .ok()
        .flatten()
        .map_or(start, |end| end as usize);
    Selection::new(utf16_to_byte(text, start), utf16_to_byte(text, end))
}

/// Pushes the session's text and selection back into the textarea after a
/// command rewrote them.
fn write_back(state: AppState, textarea: &web_sys::HtmlTextAreaElement) {
    let (text, selection) = state
        .session
        .with_value(|session| (session.document().text.clone(), session.document().selection));
    textarea.set_value(&text);
    let start = byte_to_utf16(&text, selection.start) as u32;
    let end = byte_to_utf16(&text, selection.end) as u32;
    if let Err(err) = textarea.set_selection_range(start, end) {
        log::debug!("could not restore selection: {err:?}");
    }
    state.editor_text.set(text);
}

async fn read_file(file: web_sys::File) -> Result<PendingAttachment, JsValue> {
    let buffer = JsFuture::from(file.array_buffer()).await?;
    Ok(PendingAttachment {
        filename: file.name(),
        mime_type: file.type_(),
        content: js_sys::Uint8Array::new(&buffer).to_vec(),
    })
}

fn queue_files(state: AppState, files: web_sys::FileList) {
    for index in 0..files.length() {
        let Some(file) = files.get(index) else {
            continue;
        };
        if file.size() > MAX_ATTACHMENT_BYTES as f64 {
            state
                .status
                .set(format!("{} is larger than 30 MiB", file.name()));
            continue;
        }
        let epoch = state.epoch();
        spawn_local(async move {
            let name = file.name();
            match read_file(file).await {
                Ok(_) if state.epoch() != epoch => {}
                Ok(attachment) => {
                    let added = state
                        .session
                        .try_update_value(|session| session.add_attachment(attachment));
                    if let Some(Err(err)) = added {
                        state.status.set(err.to_string());
                    }
                    sync_attachments(state);
                }
                Err(err) => log::warn!("could not read {name}: {err:?}"),
            }
        });
    }
}

#[component]
pub fn App() -> impl IntoView {
    let state = AppState::new(load_settings());

    Effect::new(move |_| {
        let settings = state.settings.get_untracked();
        if settings.is_configured() {
            connect(state, settings.server_url, settings.api_token);
        }
    });

    let font_style = move || format!("--editor-font-size: {}px;", state.settings.get().font_size);

    view! {
        <style>{BASE_CSS}</style>
        <main style=move || format!("display: flex; flex-direction: column; height: 100vh; {}", font_style())>
            {move || match state.screen.get() {
                Screen::Connect => view! { <ConnectView state=state /> }.into_any(),
                Screen::Memos => view! { <MemoListView state=state /> }.into_any(),
                Screen::Edit => view! { <EditorView state=state /> }.into_any(),
            }}
            <footer style="padding: 0.3rem 1rem; border-top: 1px solid var(--border); color: var(--muted); font-size: 0.8rem;">
                {move || state.status.get()}
            </footer>
        </main>
    }
}

#[component]
fn ConnectView(state: AppState) -> impl IntoView {
    let settings = state.settings.get_untracked();
    let server_url = RwSignal::new(settings.server_url);
    let token = RwSignal::new(settings.api_token);

    view! {
        <form
            style="margin: 4rem auto; width: 24rem; display: flex; flex-direction: column; gap: 0.8rem;"
            on:submit=move |ev| {
                ev.prevent_default();
                connect(state, server_url.get_untracked(), token.get_untracked());
            }
        >
            <h2>"Connect to Memos"</h2>
            <input
                type="url"
                placeholder="https://memos.example.org"
                prop:value=move || server_url.get()
                on:input=move |ev| server_url.set(event_target_value(&ev))
            />
            <input
                type="password"
                placeholder="Access token"
                prop:value=move || token.get()
                on:input=move |ev| token.set(event_target_value(&ev))
            />
            <button type="submit">"Connect"</button>
        </form>
    }
}

#[component]
fn HeatMap(state: AppState) -> impl IntoView {
    let today = chrono::Local::now().date_naive();
    let cells = move || {
        let counts = state.feed.with(|feed| daily_counts(feed.memos()));
        month_grid(today.year(), today.month(), &counts)
            .into_iter()
            .map(|cell| match cell {
                Some(cell) => view! {
                    <div
                        class=format!("heat-cell {}", cell.level.css_class())
                        title=format!("{} memos", cell.count)
                    >
                        {cell.day}
                    </div>
                }
                .into_any(),
                None => view! { <div class="heat-cell"></div> }.into_any(),
            })
            .collect::<Vec<_>>()
    };

    view! {
        <div style="padding: 0.8rem 1rem;">
            <div class="memo-date">{today.format("%B %Y").to_string()}</div>
            <div class="heat-grid">{cells}</div>
        </div>
    }
}

/// An image attachment downloaded with the client's token and shown through
/// an object URL. The URL is revoked when the view is disposed.
#[component]
fn AttachmentImage(state: AppState, attachment: Attachment, class: &'static str) -> impl IntoView {
    let src = RwSignal::new(None::<String>);
    let alt = attachment.filename.clone();

    if let Some(client) = state.client.get_untracked() {
        spawn_local(async move {
            match client.image_object_url(&attachment).await {
                Ok(url) => {
                    if let Some(url) = src.try_set(Some(url)).flatten() {
                        revoke_object_url(&url);
                    }
                }
                Err(err) => log::debug!("no preview for {}: {err}", attachment.filename),
            }
        });
    }
    on_cleanup(move || {
        if let Some(Some(url)) = src.try_get_untracked() {
            revoke_object_url(&url);
        }
    });

    move || src.get().map(|url| view! { <img class=class src=url alt=alt.clone() /> })
}

fn revoke_object_url(url: &str) {
    if let Err(err) = web_sys::Url::revoke_object_url(url) {
        log::debug!("could not revoke {url}: {err:?}");
    }
}

fn attachment_icon(attachment: &Attachment) -> &'static str {
    if attachment.is_image() {
        "🖼"
    } else {
        "📄"
    }
}

fn attachment_card(state: AppState, attachment: Attachment) -> impl IntoView {
    let filename = attachment.filename.clone();
    let size = attachment.size_label();
    let title = format!("{filename} ({size})");
    let body = if attachment.is_image() && attachment.file_path().is_some() {
        view! { <AttachmentImage state=state attachment=attachment class="" /> }.into_any()
    } else {
        view! { <span style="font-size: 2rem;">{attachment_icon(&attachment)}</span> }.into_any()
    };
    view! {
        <div class="attachment-card" title=title>
            {body}
            <span>{filename}</span>
            <span class="memo-date">{size}</span>
        </div>
    }
}

fn section_view(state: AppState, section: MemoSection) -> impl IntoView {
    let rows = section
        .memos
        .into_iter()
        .map(|memo| {
            let preview = preview_html(&memo);
            let date = memo.display_date().unwrap_or_default();
            let attachments = memo.attachments().len();
            let thumbnail = memo.thumbnail().cloned();
            view! {
                <div class="memo-row" on:click=move |_| open_editor(state, Some(memo.clone()))>
                    <div inner_html=preview></div>
                    {thumbnail.map(|attachment| view! {
                        <AttachmentImage state=state attachment=attachment class="memo-thumb" />
                    })}
                    <div class="memo-date">
                        {date}
                        {(attachments > 0).then(|| format!(" · {attachments} attachments"))}
                    </div>
                </div>
            }
        })
        .collect::<Vec<_>>();

    view! {
        <section>
            <h4 style="margin: 0; padding: 0.5rem 1rem; background: var(--bg-alt);">{section.title}</h4>
            {rows}
        </section>
    }
}

#[component]
fn MemoListView(state: AppState) -> impl IntoView {
    let query = RwSignal::new(String::new());

    let sections = move || match state.search_results.get() {
        Some(results) => results,
        None => state.feed.with(|feed| feed.sections().to_vec()),
    };

    view! {
        <header style="display: flex; gap: 0.5rem; align-items: center; padding: 0.6rem 1rem; border-bottom: 1px solid var(--border);">
            <button on:click=move |_| open_editor(state, None)>"New memo"</button>
            <input
                type="search"
                placeholder="Search"
                style="flex: 1;"
                prop:value=move || query.get()
                on:input=move |ev| {
                    let value = event_target_value(&ev);
                    search_changed(state, &value);
                    query.set(value);
                }
            />
            {move || {
                let active = !query.with(String::is_empty) || state.search_results.with(Option::is_some);
                active.then(|| view! {
                    <button on:click=move |_| {
                        query.set(String::new());
                        clear_search(state);
                    }>"Clear"</button>
                })
            }}
            <button on:click=move |_| refresh(state)>"Refresh"</button>
            <select on:change=move |ev| {
                let Ok(minutes) = event_target_value(&ev).parse::<u32>() else { return };
                let mut settings = state.settings.get_untracked();
                settings.set_auto_refresh_minutes(minutes);
                persist_settings(&settings);
                state.settings.set(settings);
                start_auto_refresh(state);
            }>
                {REFRESH_CHOICES
                    .into_iter()
                    .map(|minutes| view! {
                        <option
                            value=minutes.to_string()
                            prop:selected=move || state.settings.get().auto_refresh_minutes == minutes
                        >
                            {format!("Refresh every {minutes} min")}
                        </option>
                    })
                    .collect::<Vec<_>>()}
            </select>
            <button on:click=move |_| disconnect(state)>"Disconnect"</button>
        </header>
        <div style="display: flex; flex: 1; overflow: hidden;">
            <aside style="border-right: 1px solid var(--border);">
                <HeatMap state=state />
            </aside>
            <div style="flex: 1; overflow-y: auto;">
                {move || {
                    let empty = match state.search_results.with(|r| r.as_ref().map(Vec::is_empty)) {
                        Some(no_matches) => no_matches.then_some("No matching memos"),
                        None => state.feed.with(MemoFeed::is_empty).then_some("No memos yet"),
                    };
                    empty.map(|message| view! { <p class="memo-date" style="padding: 1rem;">{message}</p> })
                }}
                {move || sections().into_iter().map(|section| section_view(state, section)).collect::<Vec<_>>()}
                {move || {
                    let (has_more, loading) = state.feed.with(|f| (f.has_more(), f.is_loading_more()));
                    (has_more && state.search_results.with(Option::is_none)).then(|| view! {
                        <button
                            style="margin: 1rem;"
                            disabled=loading
                            on:click=move |_| load_more(state)
                        >
                            {if loading { "Loading..." } else { "Load more" }}
                        </button>
                    })
                }}
            </div>
        </div>
    }
}

const TOOLBAR: [(&str, MarkdownCommand); 9] = [
    ("B", MarkdownCommand::BOLD),
    ("I", MarkdownCommand::ITALIC),
    ("S", MarkdownCommand::STRIKETHROUGH),
    ("</>", MarkdownCommand::CODE),
    ("Link", MarkdownCommand::LINK),
    ("H", MarkdownCommand::HEADING),
    (">", MarkdownCommand::QUOTE),
    ("•", MarkdownCommand::BULLET_LIST),
    ("1.", MarkdownCommand::NUMBERED_LIST),
];

/// Brings the overlay up to date before the textarea is shown again.
fn ensure_styled(state: AppState) {
    if state.session.with_value(EditSession::is_styled) {
        return;
    }
    clear_timer(state.restyle_timer);
    let html = state.session.try_update_value(|session| {
        session.restyle_now();
        overlay_html(&session.document().text, session.annotations())
    });
    if let Some(html) = html {
        state.highlight.set(html);
    }
}

#[component]
fn EditorView(state: AppState) -> impl IntoView {
    let textarea_ref: NodeRef<html::Textarea> = NodeRef::new();
    let (scroll_top, set_scroll_top) = signal(0);
    let show_preview = RwSignal::new(false);
    let is_new = state.session.with_value(EditSession::is_new);

    let run_command = move |command: MarkdownCommand| {
        let Some(textarea) = textarea_ref.get_untracked() else {
            return;
        };
        let selection = read_selection(&textarea, &state.editor_text.get_untracked());
        let result = state.session.try_update_value(|session| {
            session.set_selection(selection);
            session.command(command)
        });
        match result {
            Some(Ok((outcome, effects))) => {
                if outcome.changed {
                    write_back(state, &textarea);
                    arm_timers(state, effects);
                }
                if let Err(err) = textarea.focus() {
                    log::debug!("focus failed: {err:?}");
                }
            }
            Some(Err(err)) => log::warn!("command rejected: {err}"),
            None => {}
        }
    };

    let on_input = move |text: String| {
        let selection = textarea_ref
            .get_untracked()
            .map(|textarea| read_selection(&textarea, &text))
            .unwrap_or_else(|| Selection::cursor(text.len()));
        let effects = state
            .session
            .try_update_value(|session| session.input(text.clone(), selection).1);
        state.editor_text.set(text);
        if let Some(effects) = effects {
            arm_timers(state, effects);
        }
    };

    let on_keydown = move |ev: leptos::ev::KeyboardEvent| {
        if ev.key() != "Enter" || ev.shift_key() || ev.is_composing() {
            return;
        }
        let Some(textarea) = textarea_ref.get_untracked() else {
            return;
        };
        let text = textarea.value();
        let selection = read_selection(&textarea, &text);
        let result = state.session.try_update_value(|session| {
            let (_, typed) = session.input(text, selection);
            session
                .command(MarkdownCommand::ContinueList)
                .map(|(outcome, effects)| (outcome, effects, typed))
        });
        match result {
            Some(Ok((outcome, effects, typed))) => {
                if outcome.consumed {
                    ev.prevent_default();
                }
                if outcome.changed {
                    write_back(state, &textarea);
                    arm_timers(state, effects);
                } else {
                    arm_timers(state, typed);
                }
            }
            Some(Err(err)) => log::warn!("list continuation failed: {err}"),
            None => {}
        }
    };

    let save = move |_: leptos::ev::MouseEvent| {
        cancel_timers(state);
        if let Some(request) = state.session.try_update_value(EditSession::save_request) {
            run_save(state, request, false);
        }
    };

    let toolbar = TOOLBAR
        .into_iter()
        .map(|(label, command)| {
            view! { <button title=command.label() on:click=move |_| run_command(command)>{label}</button> }
        })
        .collect::<Vec<_>>();

    let saved = move || {
        state
            .saved_attachments
            .get()
            .into_iter()
            .map(|attachment| {
                view! {
                    <span style="margin-right: 0.6rem;">
                        {attachment_icon(&attachment)}" "
                        {attachment.filename.clone()}" "
                        {attachment.size_label()}
                        <span class="saved-badge">"Saved"</span>
                    </span>
                }
            })
            .collect::<Vec<_>>()
    };

    let pending = move || {
        state
            .pending_names
            .get()
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                view! {
                    <span style="margin-right: 0.6rem;">
                        {name}
                        <button on:click=move |_| {
                            state.session.update_value(|session| {
                                session.remove_attachment(index);
                            });
                            sync_attachments(state);
                        }>"x"</button>
                    </span>
                }
            })
            .collect::<Vec<_>>()
    };

    view! {
        <header style="display: flex; gap: 0.4rem; align-items: center; padding: 0.5rem 1rem; border-bottom: 1px solid var(--border);">
            <button on:click=move |_| close_editor(state)>"Back"</button>
            {toolbar}
            <span style="flex: 1;"></span>
            <label title="Attach files">
                {move || {
                    let badge = state.badge.get();
                    format!("Attachments: {} saved, {} new", badge.saved, badge.new)
                }}
                <input
                    type="file"
                    multiple
                    style="display: none;"
                    on:change=move |ev| {
                        let input: web_sys::HtmlInputElement = event_target(&ev);
                        if let Some(files) = input.files() {
                            queue_files(state, files);
                        }
                        input.set_value("");
                    }
                />
            </label>
            <button on:click=move |_| {
                if show_preview.get_untracked() {
                    ensure_styled(state);
                }
                show_preview.update(|on| *on = !*on);
            }>
                {move || if show_preview.get() { "Edit" } else { "Preview" }}
            </button>
            <button disabled=move || state.saving.get() on:click=save>"Save"</button>
            {(!is_new).then(|| view! { <button on:click=move |_| delete_current(state)>"Delete"</button> })}
        </header>
        <div style="padding: 0.2rem 1rem; font-size: 0.8rem; color: var(--muted);">{saved}{pending}</div>
        <Show
            when=move || !show_preview.get()
            fallback=move || view! {
                <div style="flex: 1; overflow-y: auto; padding: 2rem 3rem;">
                    <div class="memo-detail" inner_html=move || detail_html(&state.editor_text.get())></div>
                    <div>
                        {move || {
                            state
                                .saved_attachments
                                .get()
                                .into_iter()
                                .map(|attachment| attachment_card(state, attachment))
                                .collect::<Vec<_>>()
                        }}
                    </div>
                </div>
            }
        >
            <div
                class="editor-container"
                style="flex: 1; position: relative; overflow: hidden;"
                on:dragover=move |ev: leptos::ev::DragEvent| ev.prevent_default()
                on:drop=move |ev: leptos::ev::DragEvent| {
                    ev.prevent_default();
                    if let Some(files) = ev.data_transfer().and_then(|dt| dt.files()) {
                        queue_files(state, files);
                    }
                }
            >
                <div
                    class="markdown-highlight-layer"
                    style="position: absolute; inset: 0; padding: 2rem 3rem; font-family: monospace; font-size: var(--editor-font-size); line-height: 1.6; white-space: pre-wrap; word-wrap: break-word; pointer-events: none; box-sizing: border-box; overflow-y: hidden;"
                    inner_html=move || state.highlight.get()
                    prop:scrollTop=move || scroll_top.get()
                ></div>
                <textarea
                    node_ref=textarea_ref
                    class="raw-editor"
                    style="position: absolute; inset: 0; width: 100%; height: 100%; padding: 2rem 3rem; font-family: monospace; font-size: var(--editor-font-size); line-height: 1.6; color: transparent; background: transparent; caret-color: #1a1a1a; outline: none; border: none; resize: none; box-sizing: border-box; overflow-y: auto;"
                    prop:value=move || state.editor_text.get_untracked()
                    on:input=move |ev| on_input(event_target_value(&ev))
                    on:keydown=on_keydown
                    on:scroll=move |ev| {
                        let target: web_sys::Element = event_target(&ev);
                        set_scroll_top.set(target.scroll_top());
                    }
                    placeholder="Start writing markdown..."
                    spellcheck="false"
                ></textarea>
            </div>
        </Show>
    }
}
