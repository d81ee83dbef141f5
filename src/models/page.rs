// Wizard page model
//
// Rebuilt from every HTML response by `remote::extractor`; never persisted.

use crate::error::{InstallError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// text, password, hidden, email, number, url, search, tel and untyped inputs
    Text,
    Textarea,
    Checkbox { checked: bool },
    Radio { checked: bool },
    Select { options: Vec<String>, selected: Option<String> },
    Submit,
    /// file, reset, image and plain buttons; never submitted
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormControl {
    pub name: String,
    pub kind: ControlKind,
    pub value: String,
    pub disabled: bool,
}

/// A value to apply to a named control before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

/// Ordered control assignments for `Browser::submit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues(Vec<(String, FieldValue)>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.push((name.to_string(), FieldValue::Text(value.into())));
        self
    }

    pub fn check(mut self, name: &str) -> Self {
        self.0.push((name.to_string(), FieldValue::Checked(true)));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// Absolute action URL (the page URL when the form has no action).
    pub action: String,
    pub method: FormMethod,
    pub controls: Vec<FormControl>,
}

impl Form {
    pub fn control(&self, name: &str) -> Option<&FormControl> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Apply `values` and return the successful controls as ordered name/value pairs.
    ///
    /// Setting a control the form does not have is an error: it means the page is not the
    /// wizard revision the caller expects.
    pub fn encode(&self, values: &FormValues, page_title: &str) -> Result<Vec<(String, String)>> {
        let mut controls = self.controls.clone();

        for (name, value) in values.iter() {
            let control = controls
                .iter_mut()
                .find(|c| &c.name == name)
                .ok_or_else(|| {
                    InstallError::page_structure(page_title, format!("form has no control named '{}'", name))
                })?;
            match (&mut control.kind, value) {
                (ControlKind::Checkbox { checked }, FieldValue::Checked(on))
                | (ControlKind::Radio { checked }, FieldValue::Checked(on)) => *checked = *on,
                (ControlKind::Select { options, selected }, FieldValue::Text(v)) => {
                    if !options.contains(v) {
                        return Err(InstallError::page_structure(
                            page_title,
                            format!("select '{}' has no option '{}'", name, v),
                        ));
                    }
                    *selected = Some(v.clone());
                }
                (ControlKind::Text | ControlKind::Textarea, FieldValue::Text(v)) => {
                    control.value = v.clone();
                }
                (kind, value) => {
                    return Err(InstallError::page_structure(
                        page_title,
                        format!("cannot apply {:?} to control '{}' ({:?})", value, name, kind),
                    ));
                }
            }
        }

        let mut pairs = Vec::new();
        let mut submit_sent = false;
        for control in controls.iter().filter(|c| !c.disabled && !c.name.is_empty()) {
            match &control.kind {
                ControlKind::Text | ControlKind::Textarea => {
                    pairs.push((control.name.clone(), control.value.clone()));
                }
                ControlKind::Checkbox { checked: true } | ControlKind::Radio { checked: true } => {
                    let value = if control.value.is_empty() {
                        "on".to_string()
                    } else {
                        control.value.clone()
                    };
                    pairs.push((control.name.clone(), value));
                }
                ControlKind::Select { options, selected } => {
                    if let Some(v) = selected.as_ref().or_else(|| options.first()) {
                        pairs.push((control.name.clone(), v.clone()));
                    }
                }
                ControlKind::Submit if !submit_sent => {
                    submit_sent = true;
                    pairs.push((control.name.clone(), control.value.clone()));
                }
                _ => {}
            }
        }
        Ok(pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    /// Absolute target URL.
    pub href: String,
}

/// What the wizard shows once installation has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeSummary {
    pub heading: String,
    pub text: Option<String>,
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardPage {
    pub url: String,
    pub title: String,
    pub forms: Vec<Form>,
    /// Text of checklist items marked as failing (system check page).
    pub failing_checks: Vec<String>,
    pub links: Vec<Link>,
    /// Field-level warnings keyed by the id of the list item that wraps the field.
    pub field_warnings: BTreeMap<String, String>,
    /// Long-poll endpoint announced by the "start installation" page.
    pub multiple_redirect_url: Option<String>,
    pub welcome: Option<WelcomeSummary>,
}

impl WizardPage {
    /// An empty page with just a URL and a title.
    pub fn titled(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            forms: Vec::new(),
            failing_checks: Vec::new(),
            links: Vec::new(),
            field_warnings: BTreeMap::new(),
            multiple_redirect_url: None,
            welcome: None,
        }
    }

    pub fn form(&self, index: usize) -> Result<&Form> {
        self.forms.get(index).ok_or_else(|| {
            InstallError::page_structure(
                &self.title,
                format!("expected form #{} but the page has {} form(s)", index, self.forms.len()),
            )
        })
    }

    /// First link whose text matches `pattern` (case-sensitive).
    pub fn find_link(&self, pattern: &regex::Regex) -> Result<&Link> {
        self.links
            .iter()
            .find(|l| pattern.is_match(&l.text))
            .ok_or_else(|| {
                InstallError::page_structure(
                    &self.title,
                    format!("no link matching /{}/", pattern.as_str()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn control(name: &str, kind: ControlKind, value: &str) -> FormControl {
        FormControl {
            name: name.to_string(),
            kind,
            value: value.to_string(),
            disabled: false,
        }
    }

    fn license_form() -> Form {
        Form {
            action: "http://example.com/admin/install?step=license".to_string(),
            method: FormMethod::Post,
            controls: vec![
                control("csrfKey", ControlKind::Text, "abc123"),
                control("lkey", ControlKind::Text, ""),
                control("eula_checkbox", ControlKind::Checkbox { checked: false }, ""),
                control("continue", ControlKind::Submit, "Continue"),
                control("cancel", ControlKind::Submit, "Cancel"),
            ],
        }
    }

    #[test]
    fn encode_applies_values_in_control_order() {
        let values = FormValues::new().text("lkey", "KEY-TESTINSTALL").check("eula_checkbox");
        let pairs = license_form().encode(&values, "License").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("csrfKey".to_string(), "abc123".to_string()),
                ("lkey".to_string(), "KEY-TESTINSTALL".to_string()),
                ("eula_checkbox".to_string(), "on".to_string()),
                ("continue".to_string(), "Continue".to_string()),
            ]
        );
    }

    #[test]
    fn unchecked_boxes_and_disabled_controls_are_not_sent() {
        let mut form = license_form();
        form.controls[0].disabled = true;
        let pairs = form.encode(&FormValues::new(), "License").unwrap();
        let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lkey", "continue"]);
    }

    #[test]
    fn unknown_control_is_a_structure_error() {
        let err = license_form()
            .encode(&FormValues::new().text("sql_host", "localhost"), "License")
            .unwrap_err();
        match err {
            InstallError::PageStructure { title, detail } => {
                assert_eq!(title, "License");
                assert!(detail.contains("sql_host"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn select_sends_selected_or_first_option() {
        let form = Form {
            action: "http://example.com/".to_string(),
            method: FormMethod::Post,
            controls: vec![control(
                "app",
                ControlKind::Select {
                    options: vec!["core".to_string(), "forums".to_string()],
                    selected: None,
                },
                "",
            )],
        };
        let pairs = form.encode(&FormValues::new(), "Apps").unwrap();
        assert_eq!(pairs, vec![("app".to_string(), "core".to_string())]);

        let pairs = form
            .encode(&FormValues::new().text("app", "forums"), "Apps")
            .unwrap();
        assert_eq!(pairs, vec![("app".to_string(), "forums".to_string())]);

        assert!(form
            .encode(&FormValues::new().text("app", "gallery"), "Apps")
            .is_err());
    }

    #[test]
    fn missing_form_names_the_page() {
        let page = WizardPage::titled("http://example.com/", "Applications");
        let err = page.form(0).unwrap_err();
        assert!(err.to_string().contains("Applications"));
    }

    #[test]
    fn find_link_is_case_sensitive() {
        let mut page = WizardPage::titled("http://example.com/", "System Check");
        page.links.push(Link {
            text: "continue later".to_string(),
            href: "http://example.com/a".to_string(),
        });
        page.links.push(Link {
            text: "Continue".to_string(),
            href: "http://example.com/b".to_string(),
        });
        let link = page.find_link(&Regex::new("Continue").unwrap()).unwrap();
        assert_eq!(link.href, "http://example.com/b");
        assert!(page.find_link(&Regex::new("Start Installation").unwrap()).is_err());
    }
}
