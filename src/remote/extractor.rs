// Remote form extractor
//
// Pure HTML -> WizardPage conversion. No I/O happens here so the wizard's transitions can be
// exercised against fixture markup.

use crate::error::{InstallError, Result};
use crate::models::page::{
    ControlKind, Form, FormControl, FormMethod, Link, WelcomeSummary, WizardPage,
};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// CSS selectors locating the wizard's structural elements.
///
/// Defaults match the vendor's installer markup; a driver for a different wizard revision can
/// swap individual selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    pub title: String,
    pub failing_check: String,
    pub field_container: String,
    pub field_warning: String,
    pub multiple_redirect: String,
    pub welcome_heading: String,
    pub welcome_text: String,
    pub primary_action: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            failing_check: "ul.ipsList_checks li.fail".to_string(),
            field_container: "li[id]".to_string(),
            field_warning: "span.ipsType_warning".to_string(),
            multiple_redirect: "div.ipsMultipleRedirect".to_string(),
            welcome_heading: "h1#elInstaller_welcome".to_string(),
            welcome_text: "p.ipsType_light".to_string(),
            primary_action: "a.ipsButton_primary".to_string(),
        }
    }
}

/// The release download form embedded in the client area's license page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadForm {
    pub action: String,
    pub version_label: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| {
        InstallError::page_structure("(selector)", format!("invalid selector '{}': {}", css, e))
    })
}

fn clean_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    }
}

pub fn extract(html: &str, page_url: &str, selectors: &SelectorSet) -> Result<WizardPage> {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let title = doc
        .select(&selector(&selectors.title)?)
        .next()
        .map(|t| clean_text(&t))
        .ok_or_else(|| {
            InstallError::page_structure(
                "(no title)",
                format!("{} has no element matching '{}'", page_url, selectors.title),
            )
        })?;

    let mut page = WizardPage::titled(page_url, &title);

    page.failing_checks = doc
        .select(&selector(&selectors.failing_check)?)
        .map(|li| clean_text(&li))
        .filter(|t| !t.is_empty())
        .collect();

    let form_sel = selector("form")?;
    for form in doc.select(&form_sel) {
        page.forms.push(extract_form(&form, base.as_ref(), page_url)?);
    }

    let link_sel = selector("a[href]")?;
    page.links = doc
        .select(&link_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some(Link {
                text: clean_text(&a),
                href: resolve(base.as_ref(), href),
            })
        })
        .collect();

    let warning_sel = selector(&selectors.field_warning)?;
    let mut warnings = BTreeMap::new();
    for container in doc.select(&selector(&selectors.field_container)?) {
        let Some(id) = container.value().id() else {
            continue;
        };
        if let Some(warning) = container.select(&warning_sel).next() {
            warnings.insert(id.to_string(), clean_text(&warning));
        }
    }
    page.field_warnings = warnings;

    page.multiple_redirect_url = doc
        .select(&selector(&selectors.multiple_redirect)?)
        .next()
        .and_then(|div| div.value().attr("data-url"))
        .map(|u| resolve(base.as_ref(), u));

    if let Some(heading) = doc.select(&selector(&selectors.welcome_heading)?).next() {
        page.welcome = Some(WelcomeSummary {
            heading: clean_text(&heading),
            text: doc
                .select(&selector(&selectors.welcome_text)?)
                .next()
                .map(|p| clean_text(&p)),
            action_url: doc
                .select(&selector(&selectors.primary_action)?)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|h| resolve(base.as_ref(), h)),
        });
    }

    Ok(page)
}

fn extract_form(form: &ElementRef<'_>, base: Option<&Url>, page_url: &str) -> Result<Form> {
    let action = match form.value().attr("action").map(str::trim) {
        Some(a) if !a.is_empty() => resolve(base, a),
        _ => page_url.to_string(),
    };
    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };

    let control_sel = selector("input, select, textarea, button")?;
    let option_sel = selector("option")?;
    let mut controls = Vec::new();

    for el in form.select(&control_sel) {
        let attrs = el.value();
        let name = attrs.attr("name").unwrap_or_default().to_string();
        let disabled = attrs.attr("disabled").is_some();
        let value = attrs.attr("value").unwrap_or_default().to_string();

        let (kind, value) = match attrs.name() {
            "select" => {
                let mut options = Vec::new();
                let mut selected = None;
                for opt in el.select(&option_sel) {
                    let v = opt
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| clean_text(&opt));
                    if opt.value().attr("selected").is_some() {
                        selected = Some(v.clone());
                    }
                    options.push(v);
                }
                (ControlKind::Select { options, selected }, String::new())
            }
            "textarea" => (ControlKind::Textarea, el.text().collect::<String>()),
            "button" => match attrs.attr("type").map(|t| t.to_ascii_lowercase()) {
                None => (ControlKind::Submit, value),
                Some(t) if t == "submit" => (ControlKind::Submit, value),
                Some(_) => (ControlKind::Ignored, value),
            },
            _ => {
                let input_type = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
                let checked = attrs.attr("checked").is_some();
                let kind = match input_type.as_str() {
                    "checkbox" => ControlKind::Checkbox { checked },
                    "radio" => ControlKind::Radio { checked },
                    "submit" => ControlKind::Submit,
                    "file" | "reset" | "image" | "button" => ControlKind::Ignored,
                    _ => ControlKind::Text,
                };
                (kind, value)
            }
        };

        controls.push(FormControl {
            name,
            kind,
            value,
            disabled,
        });
    }

    Ok(Form {
        action,
        method,
        controls,
    })
}

/// Read the download form the client area ships as an HTML template inside
/// `<script id="download_form">`.
pub fn extract_download_form(html: &str, page_url: &str) -> Result<DownloadForm> {
    let doc = Html::parse_document(html);
    let title = doc
        .select(&selector("title")?)
        .next()
        .map(|t| clean_text(&t))
        .unwrap_or_default();

    let template = doc
        .select(&selector("script#download_form")?)
        .next()
        .map(|s| s.text().collect::<String>())
        .ok_or_else(|| InstallError::page_structure(&title, "no download form template"))?;

    let fragment = Html::parse_fragment(&template);
    let form = fragment
        .select(&selector("form")?)
        .next()
        .ok_or_else(|| InstallError::page_structure(&title, "download template has no form"))?;
    let action = form
        .value()
        .attr("action")
        .ok_or_else(|| InstallError::page_structure(&title, "download form has no action"))?;
    let version_label = form
        .select(&selector("label[for=version_latest]")?)
        .next()
        .map(|l| clean_text(&l))
        .ok_or_else(|| InstallError::page_structure(&title, "no latest version label"))?;

    Ok(DownloadForm {
        action: resolve(Url::parse(page_url).ok().as_ref(), action),
        version_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::FormValues;

    const URL: &str = "http://forum.example.com/admin/install/index.php";

    const SYSTEM_CHECK: &str = r#"<!DOCTYPE html>
<html><head><title>System Check</title></head><body>
<ul class="ipsList_checks">
  <li class="success">PHP version 7.0.10</li>
  <li class="fail">The <strong>uploads</strong> directory is not writable</li>
  <li class="fail">  cURL extension missing </li>
</ul>
<a href="?step=license" class="ipsButton">Continue</a>
</body></html>"#;

    const LICENSE_REJECTED: &str = r#"<html><head><title>License</title></head><body>
<form action="index.php?step=license" method="post">
  <input type="hidden" name="csrfKey" value="c5f">
  <ul>
    <li id="license_lkey"><input type="text" name="lkey" value="BAD">
      <span class="ipsType_warning">That license key is not valid</span></li>
    <li id="license_eula"><input type="checkbox" name="eula_checkbox" checked></li>
  </ul>
  <button type="submit" name="submit">Continue</button>
  <input type="file" name="upload">
</form></body></html>"#;

    #[test]
    fn extracts_title_checks_and_links() {
        let page = extract(SYSTEM_CHECK, URL, &SelectorSet::default()).unwrap();
        assert_eq!(page.title, "System Check");
        assert_eq!(
            page.failing_checks,
            vec![
                "The uploads directory is not writable".to_string(),
                "cURL extension missing".to_string()
            ]
        );
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].text, "Continue");
        assert_eq!(
            page.links[0].href,
            "http://forum.example.com/admin/install/index.php?step=license"
        );
        assert!(page.forms.is_empty());
    }

    #[test]
    fn extracts_forms_and_field_warnings() {
        let page = extract(LICENSE_REJECTED, URL, &SelectorSet::default()).unwrap();
        assert_eq!(
            page.field_warnings.get("license_lkey").map(String::as_str),
            Some("That license key is not valid")
        );
        let form = page.form(0).unwrap();
        assert_eq!(form.method, FormMethod::Post);
        assert_eq!(
            form.action,
            "http://forum.example.com/admin/install/index.php?step=license"
        );
        assert_eq!(
            form.control("eula_checkbox").unwrap().kind,
            ControlKind::Checkbox { checked: true }
        );
        assert_eq!(form.control("upload").unwrap().kind, ControlKind::Ignored);

        let pairs = form.encode(&FormValues::new().text("lkey", "GOOD"), &page.title).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("csrfKey".to_string(), "c5f".to_string()),
                ("lkey".to_string(), "GOOD".to_string()),
                ("eula_checkbox".to_string(), "on".to_string()),
                ("submit".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn form_without_action_posts_back_to_the_page() {
        let html = r#"<html><head><title>Applications</title></head><body>
<form method="POST"><input type="checkbox" name="apps[core]" value="1" checked>
<select name="mode"><option value="a">A</option><option value="b" selected>B</option></select>
<textarea name="notes">hi</textarea></form></body></html>"#;
        let page = extract(html, URL, &SelectorSet::default()).unwrap();
        let form = page.form(0).unwrap();
        assert_eq!(form.action, URL);
        assert_eq!(form.method, FormMethod::Post);
        let pairs = form.encode(&FormValues::new(), &page.title).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("apps[core]".to_string(), "1".to_string()),
                ("mode".to_string(), "b".to_string()),
                ("notes".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn extracts_multiple_redirect_and_welcome() {
        let html = r#"<html><head><title>Installing</title></head><body>
<div class="ipsMultipleRedirect" data-url="index.php?step=install&amp;do=mr"></div>
</body></html>"#;
        let page = extract(html, URL, &SelectorSet::default()).unwrap();
        assert_eq!(
            page.multiple_redirect_url.as_deref(),
            Some("http://forum.example.com/admin/install/index.php?step=install&do=mr")
        );
        assert!(page.welcome.is_none());

        let html = r#"<html><head><title>Done</title></head><body>
<h1 id="elInstaller_welcome">  Installation complete! </h1>
<p class="ipsType_light">Your community is ready.</p>
<a class="ipsButton ipsButton_primary" href="/">Go to the suite</a></body></html>"#;
        let page = extract(html, URL, &SelectorSet::default()).unwrap();
        let welcome = page.welcome.unwrap();
        assert_eq!(welcome.heading, "Installation complete!");
        assert_eq!(welcome.text.as_deref(), Some("Your community is ready."));
        assert_eq!(
            welcome.action_url.as_deref(),
            Some("http://forum.example.com/")
        );
    }

    #[test]
    fn custom_selectors_override_defaults() {
        let html = r#"<html><head><title>x</title></head><body>
<ol class="checks"><li class="bad">Disk full</li></ol></body></html>"#;
        let selectors = SelectorSet {
            failing_check: "ol.checks li.bad".to_string(),
            ..SelectorSet::default()
        };
        let page = extract(html, URL, &selectors).unwrap();
        assert_eq!(page.failing_checks, vec!["Disk full".to_string()]);
    }

    #[test]
    fn invalid_selector_is_reported() {
        let selectors = SelectorSet {
            title: "[[".to_string(),
            ..SelectorSet::default()
        };
        assert!(extract("<html></html>", URL, &selectors).is_err());
    }

    #[test]
    fn page_without_title_is_a_structure_error() {
        let html = r#"<html><body><form method="post"><input name="lkey"></form></body></html>"#;
        let err = extract(html, URL, &SelectorSet::default()).unwrap_err();
        match err {
            InstallError::PageStructure { title, detail } => {
                assert_eq!(title, "(no title)");
                assert!(detail.contains(URL));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // An empty title element is still a title.
        let page = extract("<html><head><title> </title></head></html>", URL, &SelectorSet::default())
            .unwrap();
        assert_eq!(page.title, "");
    }

    #[test]
    fn reads_embedded_download_form() {
        let html = r#"<html><head><title>Client Area</title></head><body>
<script type="text/template" id="download_form">
  <form action="https://remoteservices.example.com/download/123" method="post">
    <input type="radio" name="version" id="version_latest" value="latest">
    <label for="version_latest">4.1.5.1</label>
  </form>
</script></body></html>"#;
        let form = extract_download_form(html, "https://www.example.com/clients/").unwrap();
        assert_eq!(form.action, "https://remoteservices.example.com/download/123");
        assert_eq!(form.version_label, "4.1.5.1");
    }

    #[test]
    fn missing_download_template_is_a_structure_error() {
        let err =
            extract_download_form("<html><head><title>Login</title></head></html>", URL)
                .unwrap_err();
        assert!(matches!(err, InstallError::PageStructure { ref title, .. } if title == "Login"));
    }
}
