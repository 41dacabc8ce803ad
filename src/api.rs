//! Memos v1 REST client. Requests go through the browser `fetch` and are
//! awaited inside `spawn_local`, so they never block rendering.

use crate::memo::{Attachment, Memo, MemoPage};
use crate::session::{PendingAttachment, SaveRequest};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, Request, RequestInit, RequestMode, Response, Url};

pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no browser window to send requests from")]
    NoWindow,
    #[error("request failed: {0}")]
    Js(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0} has no downloadable file")]
    NoFile(String),
    #[error("expected an image, got {0:?}")]
    NotAnImage(String),
}

impl ApiError {
    fn from_js(value: JsValue) -> Self {
        ApiError::Js(
            value
                .as_string()
                .unwrap_or_else(|| format!("{value:?}")),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct UploadBody<'a> {
    filename: &'a str,
    #[serde(rename = "type")]
    mime_type: &'a str,
    content: String,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct SetAttachmentsBody<'a> {
    name: &'a str,
    attachments: Vec<AttachmentRef<'a>>,
}

#[derive(Deserialize)]
struct AttachmentList {
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// `content.contains("...")` filter with quotes and backslashes escaped.
pub fn search_filter(query: &str) -> String {
    let escaped = query.replace('\\', "\\\\").replace('"', "\\\"");
    format!("content.contains(\"{escaped}\")")
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    Ok(serde_json::from_str(body)?)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemosClient {
    base_url: String,
    token: String,
}

impl MemosClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn list_url(&self, page_size: u32, page_token: Option<&str>) -> String {
        let mut url = self.url(&format!("memos?pageSize={page_size}"));
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    pub fn search_url(&self, query: &str) -> String {
        self.url(&format!(
            "memos?pageSize={PAGE_SIZE}&filter={}",
            urlencoding::encode(&search_filter(query))
        ))
    }

    pub fn memo_url(&self, memo_name: &str) -> String {
        self.url(memo_name)
    }

    pub fn update_url(&self, memo_name: &str) -> String {
        format!("{}?updateMask=content", self.memo_url(memo_name))
    }

    pub fn attachments_url(&self, memo_name: &str) -> String {
        self.url(&format!("{memo_name}/attachments"))
    }

    /// Absolute URL of a file served outside the API prefix.
    pub fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        accept: &str,
    ) -> Result<Response, ApiError> {
        let init = RequestInit::new();
        init.set_method(method.as_str());
        init.set_mode(RequestMode::Cors);
        if let Some(body) = body {
            init.set_body(&JsValue::from_str(&body));
        }

        let request = Request::new_with_str_and_init(url, &init).map_err(ApiError::from_js)?;
        let headers = request.headers();
        headers
            .set("Authorization", &format!("Bearer {}", self.token))
            .map_err(ApiError::from_js)?;
        headers
            .set("Content-Type", "application/json")
            .map_err(ApiError::from_js)?;
        headers.set("Accept", accept).map_err(ApiError::from_js)?;

        let window = web_sys::window().ok_or(ApiError::NoWindow)?;
        let value = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(ApiError::from_js)?;
        value.dyn_into().map_err(ApiError::from_js)
    }

    async fn send(&self, method: Method, url: &str, body: Option<String>) -> Result<String, ApiError> {
        let response = self.fetch(method, url, body, "application/json").await?;
        let text = JsFuture::from(response.text().map_err(ApiError::from_js)?)
            .await
            .map_err(ApiError::from_js)?
            .as_string()
            .unwrap_or_default();

        if !response.ok() {
            let body: String = text.chars().take(200).collect();
            log::warn!("{} {url} -> {}", method.as_str(), response.status());
            return Err(ApiError::Status {
                status: response.status(),
                body,
            });
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
    ) -> Result<T, ApiError> {
        let text = self.send(method, url, body).await?;
        decode(&text)
    }

    pub async fn test_connection(&self) -> Result<(), ApiError> {
        self.send(Method::Get, &self.list_url(1, None), None).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.send_json(Method::Get, &self.url("user/me"), None).await
    }

    pub async fn list_memos(&self, page_token: Option<&str>) -> Result<MemoPage, ApiError> {
        self.send_json(Method::Get, &self.list_url(PAGE_SIZE, page_token), None)
            .await
    }

    pub async fn search_memos(&self, query: &str) -> Result<MemoPage, ApiError> {
        self.send_json(Method::Get, &self.search_url(query), None).await
    }

    pub async fn create_memo(&self, content: &str) -> Result<Memo, ApiError> {
        let body = serde_json::to_string(&ContentBody { content })?;
        self.send_json(Method::Post, &self.url("memos"), Some(body)).await
    }

    pub async fn update_memo(&self, memo_name: &str, content: &str) -> Result<Memo, ApiError> {
        let body = serde_json::to_string(&UpdateBody {
            name: memo_name,
            content,
        })?;
        self.send_json(Method::Patch, &self.update_url(memo_name), Some(body))
            .await
    }

    pub async fn delete_memo(&self, memo_name: &str) -> Result<(), ApiError> {
        self.send(Method::Delete, &self.memo_url(memo_name), None).await?;
        Ok(())
    }

    pub async fn list_attachments(&self, memo_name: &str) -> Result<Vec<Attachment>, ApiError> {
        let list: AttachmentList = self
            .send_json(Method::Get, &self.attachments_url(memo_name), None)
            .await?;
        Ok(list.attachments)
    }

    pub async fn upload_attachment(&self, file: &PendingAttachment) -> Result<Attachment, ApiError> {
        let body = upload_body(file)?;
        self.send_json(Method::Post, &self.url("attachments"), Some(body))
            .await
    }

    pub async fn set_memo_attachments(
        &self,
        memo_name: &str,
        attachments: &[Attachment],
    ) -> Result<(), ApiError> {
        let body = serde_json::to_string(&SetAttachmentsBody {
            name: memo_name,
            attachments: attachments
                .iter()
                .map(|a| AttachmentRef { name: &a.name })
                .collect(),
        })?;
        self.send(Method::Patch, &self.attachments_url(memo_name), Some(body))
            .await?;
        Ok(())
    }

    /// Downloads an image attachment with the bearer token and returns an
    /// object URL for it. The caller revokes it with
    /// `Url::revoke_object_url` once the image is gone.
    pub async fn image_object_url(&self, attachment: &Attachment) -> Result<String, ApiError> {
        let path = attachment
            .file_path()
            .ok_or_else(|| ApiError::NoFile(attachment.name.clone()))?;
        let url = self.file_url(&path);
        let response = self
            .fetch(Method::Get, &url, None, "image/jpeg, image/png, image/*")
            .await?;
        if !response.ok() {
            log::warn!("GET {url} -> {}", response.status());
            return Err(ApiError::Status {
                status: response.status(),
                body: String::new(),
            });
        }
        let blob: Blob = JsFuture::from(response.blob().map_err(ApiError::from_js)?)
            .await
            .map_err(ApiError::from_js)?
            .dyn_into()
            .map_err(ApiError::from_js)?;
        if !blob.type_().contains("image") {
            return Err(ApiError::NotAnImage(blob.type_()));
        }
        Url::create_object_url_with_blob(&blob).map_err(ApiError::from_js)
    }

    /// Creates or updates the memo, uploads `pending` and links every
    /// attachment to it. Returns the memo as the editor should now see it.
    pub async fn save(
        &self,
        request: &SaveRequest,
        existing: &[Attachment],
        pending: &[PendingAttachment],
    ) -> Result<Memo, ApiError> {
        let mut memo = match &request.memo_name {
            Some(name) => self.update_memo(name, &request.content).await?,
            None => self.create_memo(&request.content).await?,
        };
        if pending.is_empty() {
            return Ok(memo);
        }

        let mut linked = existing.to_vec();
        for file in pending {
            let uploaded = self.upload_attachment(file).await?;
            log::info!("uploaded {} as {}", file.filename, uploaded.name);
            linked.push(uploaded);
        }
        self.set_memo_attachments(&memo.name, &linked).await?;
        memo.attachments = linked;
        memo.resources.clear();
        Ok(memo)
    }
}

fn upload_body(file: &PendingAttachment) -> Result<String, ApiError> {
    let mime_type = if file.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        &file.mime_type
    };
    Ok(serde_json::to_string(&UploadBody {
        filename: &file.filename,
        mime_type,
        content: base64::engine::general_purpose::STANDARD.encode(&file.content),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls_without_double_slashes() {
        let client = MemosClient::new("https://memos.example.org//", "t");
        assert_eq!(client.base_url(), "https://memos.example.org");
        assert_eq!(
            client.list_url(50, None),
            "https://memos.example.org/api/v1/memos?pageSize=50"
        );
        assert_eq!(
            client.list_url(50, Some("a b/c")),
            "https://memos.example.org/api/v1/memos?pageSize=50&pageToken=a%20b%2Fc"
        );
        assert_eq!(
            client.update_url("memos/7"),
            "https://memos.example.org/api/v1/memos/7?updateMask=content"
        );
        assert_eq!(
            client.attachments_url("memos/7"),
            "https://memos.example.org/api/v1/memos/7/attachments"
        );
        assert_eq!(
            client.file_url("/file/attachments/a/b.png"),
            "https://memos.example.org/file/attachments/a/b.png"
        );
    }

    #[test]
    fn empty_page_token_is_ignored() {
        let client = MemosClient::new("http://localhost:5230", "t");
        assert_eq!(
            client.list_url(1, Some("")),
            "http://localhost:5230/api/v1/memos?pageSize=1"
        );
    }

    #[test]
    fn search_filter_escapes_quotes() {
        assert_eq!(search_filter("plain"), "content.contains(\"plain\")");
        assert_eq!(
            search_filter(r#"say "hi" \o/"#),
            r#"content.contains("say \"hi\" \\o/")"#
        );
        let client = MemosClient::new("http://h", "t");
        assert_eq!(
            client.search_url("a"),
            "http://h/api/v1/memos?pageSize=50&filter=content.contains%28%22a%22%29"
        );
    }

    #[test]
    fn upload_body_is_base64() {
        let body = upload_body(&PendingAttachment {
            filename: "note.txt".to_string(),
            mime_type: String::new(),
            content: b"hello".to_vec(),
        })
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["filename"], "note.txt");
        assert_eq!(json["type"], "application/octet-stream");
        assert_eq!(json["content"], "aGVsbG8=");
    }

    #[test]
    fn empty_bodies_decode_as_empty_objects() {
        let list: AttachmentList = decode("").unwrap();
        assert!(list.attachments.is_empty());
        let user: User = decode(r#"{"name":"users/1","username":"ann","displayName":"Ann"}"#).unwrap();
        assert_eq!(user.display_name, "Ann");
        assert!(matches!(decode::<User>("[oops"), Err(ApiError::Decode(_))));
    }
}
