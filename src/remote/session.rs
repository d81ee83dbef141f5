// HTTP session adapter
//
// A cookie-bearing client that behaves like a small browser: it remembers the last page it
// loaded so forms and links on that page can be submitted/followed. The remote wizard keys
// its progress to the session cookie, so one cookie store is shared by every request of a
// session and is only written to disk when the caller asks for it.

use crate::error::{InstallError, Result};
use crate::models::page::{FormMethod, FormValues, WizardPage};
use crate::remote::extractor::{self, SelectorSet};
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Browser-like operations the wizard driver needs from a session.
#[async_trait]
pub trait Browser: Send {
    /// GET `url` and make it the current page.
    async fn open(&mut self, url: &str) -> Result<WizardPage>;

    /// Submit form `form_index` of the current page with `values` applied.
    async fn submit(&mut self, form_index: usize, values: &FormValues) -> Result<WizardPage>;

    /// Follow the first link on the current page whose text matches `pattern`.
    async fn follow_link(&mut self, pattern: &Regex) -> Result<WizardPage>;

    /// XHR-flagged GET returning a JSON document. Does not change the current page.
    async fn xhr_json(&mut self, url: &str) -> Result<serde_json::Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Development hosts commonly run with self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            user_agent: format!("ipsv-installer/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false,
        }
    }
}

/// A response body read chunk by chunk.
pub struct Download {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    url: String,
    response: reqwest::Response,
}

impl Download {
    /// Next body chunk, `None` once the body is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let chunk = self
            .response
            .chunk()
            .await
            .map_err(|e| InstallError::transport(&self.url, e))?;
        Ok(chunk.map(|c| c.to_vec()))
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    cookies: Arc<CookieStoreMutex>,
    session_file: Option<PathBuf>,
    selectors: SelectorSet,
    current: Option<WizardPage>,
}

fn load_cookie_store(path: &Path) -> CookieStore {
    debug!(
        "[PHASE: session] [STEP: load] Attempting to load session file: {:?}",
        path
    );
    if !path.exists() {
        return CookieStore::default();
    }
    let loaded = File::open(path)
        .map_err(|e| e.to_string())
        .and_then(|f| {
            cookie_store::serde::json::load(BufReader::new(f)).map_err(|e| e.to_string())
        });
    match loaded {
        Ok(store) => {
            info!("[PHASE: session] [STEP: load] Successfully loaded a saved login session");
            store
        }
        Err(e) => {
            warn!(
                "[PHASE: session] [STEP: load] Session file exists but could not be loaded: {}",
                e
            );
            CookieStore::default()
        }
    }
}

impl HttpSession {
    /// Build a session. When `session_file` exists its cookies are loaded; it is never written
    /// unless `persist` is called.
    pub fn new(
        settings: &HttpSettings,
        selectors: SelectorSet,
        session_file: Option<PathBuf>,
    ) -> Result<Self> {
        let store = session_file
            .as_deref()
            .map(load_cookie_store)
            .unwrap_or_default();
        let cookies = Arc::new(CookieStoreMutex::new(store));

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| InstallError::transport("(client)", e))?;

        Ok(Self {
            client,
            cookies,
            session_file,
            selectors,
            current: None,
        })
    }

    pub fn current_page(&self) -> Option<&WizardPage> {
        self.current.as_ref()
    }

    /// Write the cookie jar to the session file. Only called on explicit request
    /// (e.g. "remember this login").
    pub fn persist(&self) -> Result<()> {
        let Some(path) = self.session_file.as_deref() else {
            return Err(InstallError::Session(
                "no session file is configured".to_string(),
            ));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = self
            .cookies
            .lock()
            .map_err(|_| InstallError::Session("cookie store lock poisoned".to_string()))?;
        let mut writer = BufWriter::new(File::create(path)?);
        cookie_store::serde::json::save(&store, &mut writer)
            .map_err(|e| InstallError::Session(e.to_string()))?;
        info!("[PHASE: session] [STEP: persist] Saved login session to {:?}", path);
        Ok(())
    }

    /// Value of a cookie visible to `url`, if any.
    pub fn cookie(&self, url: &str, name: &str) -> Result<Option<String>> {
        let url = url::Url::parse(url)
            .map_err(|e| InstallError::Session(format!("invalid cookie URL '{}': {}", url, e)))?;
        let store = self
            .cookies
            .lock()
            .map_err(|_| InstallError::Session("cookie store lock poisoned".to_string()))?;
        Ok(store
            .matches(&url)
            .into_iter()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string()))
    }

    fn current_or_err(&self) -> Result<&WizardPage> {
        self.current
            .as_ref()
            .ok_or_else(|| InstallError::page_structure("(none)", "no page has been loaded yet"))
    }

    async fn send(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| InstallError::transport(url, e))?;
        debug!(
            "[PHASE: http] [STEP: {}] {} -> {}",
            method.to_ascii_lowercase(),
            url,
            response.status()
        );
        if !response.status().is_success() {
            return Err(InstallError::RemoteRequest {
                method,
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn load_page(&mut self, response: reqwest::Response) -> Result<WizardPage> {
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| InstallError::transport(&final_url, e))?;
        let page = extractor::extract(&html, &final_url, &self.selectors)?;
        self.current = Some(page.clone());
        Ok(page)
    }

    /// Raw HTML of `url`, for pages that are not part of the wizard. The current page is
    /// left as it was.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.send("GET", self.client.get(url), url).await?;
        response
            .text()
            .await
            .map_err(|e| InstallError::transport(url, e))
    }

    /// Streaming GET. Any non-2xx status is fatal; download URLs may be one-shot, so nothing
    /// here retries.
    pub async fn stream_get(&self, url: &str) -> Result<Download> {
        let response = self.send("GET", self.client.get(url), url).await?;
        Ok(into_download(url, response))
    }

    /// Streaming form POST.
    pub async fn stream_post(&self, url: &str, params: &[(String, String)]) -> Result<Download> {
        let response = self
            .send("POST", self.client.post(url).form(params), url)
            .await?;
        Ok(into_download(url, response))
    }
}

fn into_download(url: &str, response: reqwest::Response) -> Download {
    Download {
        status: response.status(),
        content_length: response.content_length(),
        url: url.to_string(),
        response,
    }
}

#[async_trait]
impl Browser for HttpSession {
    async fn open(&mut self, url: &str) -> Result<WizardPage> {
        let response = self.send("GET", self.client.get(url), url).await?;
        self.load_page(response).await
    }

    async fn submit(&mut self, form_index: usize, values: &FormValues) -> Result<WizardPage> {
        let page = self.current_or_err()?;
        let form = page.form(form_index)?;
        let pairs = form.encode(values, &page.title)?;
        let action = form.action.clone();

        let response = match form.method {
            FormMethod::Post => {
                self.send("POST", self.client.post(&action).form(&pairs), &action)
                    .await?
            }
            FormMethod::Get => {
                self.send("GET", self.client.get(&action).query(&pairs), &action)
                    .await?
            }
        };
        self.load_page(response).await
    }

    async fn follow_link(&mut self, pattern: &Regex) -> Result<WizardPage> {
        let href = self.current_or_err()?.find_link(pattern)?.href.clone();
        self.open(&href).await
    }

    async fn xhr_json(&mut self, url: &str) -> Result<serde_json::Value> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        let response = self
            .send("GET", self.client.get(url).headers(headers), url)
            .await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| InstallError::transport(url, e))
    }
}
