//! HTML link discovery: anchors, forms with their typed fields, and inline
//! scripts run through the reduced-script interpreter.

use log::{debug, trace};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{FileField, Resource};
use crate::script::extract_script_links;

/// Everything one page contributes to the frontier.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub links: Vec<Url>,
    pub forms: Vec<Resource>,
}

pub struct LinkExtractor {
    /// Registrable domain (domain + public suffix) of the scan target.
    base_domain: String,
    /// URLs containing any of these substrings are never followed.
    banned: Vec<String>,
    async_suffix: String,
}

impl LinkExtractor {
    pub fn new(root: &Url, banned: Vec<String>, async_suffix: String) -> Self {
        let base_domain = root
            .host_str()
            .and_then(psl::domain_str)
            .unwrap_or_default()
            .to_string();
        LinkExtractor {
            base_domain,
            banned,
            async_suffix,
        }
    }

    /// True when `url` stays inside the scan: http(s), same registrable
    /// domain, no banned substring.
    pub fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let text = url.as_str();
        if self.banned.iter().any(|b| text.contains(b.as_str())) {
            trace!("banned keyword, dropping {}", text);
            return false;
        }
        url.host_str()
            .and_then(psl::domain_str)
            .map(|d| d == self.base_domain)
            .unwrap_or(false)
    }

    fn resolve(&self, page_url: &Url, href: &str) -> Option<Url> {
        let mut url = page_url.join(href.trim()).ok()?;
        url.set_fragment(None);
        self.in_scope(&url).then_some(url)
    }

    pub fn extract(&self, page_url: &Url, body: &str) -> ExtractedPage {
        let doc = Html::parse_document(body);
        let mut out = ExtractedPage::default();

        if let Ok(sel) = Selector::parse("a[href]") {
            for a in doc.select(&sel) {
                if let Some(href) = a.value().attr("href") {
                    if let Some(url) = self.resolve(page_url, href) {
                        out.links.push(url);
                    }
                }
            }
        }

        if let Ok(form_sel) = Selector::parse("form") {
            for form in doc.select(&form_sel) {
                if let Some(resource) = self.extract_form(page_url, form) {
                    out.forms.push(resource);
                }
            }
        }

        if let Ok(script_sel) = Selector::parse("script:not([src])") {
            for script in doc.select(&script_sel) {
                let source = script.inner_html();
                for link in extract_script_links(&source, &self.async_suffix) {
                    if let Some(url) = self.resolve(page_url, &link) {
                        debug!("script link {}", url);
                        out.links.push(url);
                    }
                }
            }
        }

        out
    }

    fn extract_form(&self, page_url: &Url, form: ElementRef) -> Option<Resource> {
        let action = form.value().attr("action").unwrap_or("");
        let url = if action.is_empty() {
            let mut u = page_url.clone();
            u.set_fragment(None);
            self.in_scope(&u).then_some(u)?
        } else {
            self.resolve(page_url, action)?
        };
        let method = form
            .value()
            .attr("method")
            .unwrap_or("get")
            .to_ascii_uppercase();

        let mut fields: Vec<(String, String)> = Vec::new();
        let mut files: Vec<(String, FileField)> = Vec::new();

        let input_sel = Selector::parse("input[name], textarea[name], select[name]").ok()?;
        for field in form.select(&input_sel) {
            let el = field.value();
            let name = el.attr("name")?.to_string();
            match el.name() {
                "input" => {
                    let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                    match kind.as_str() {
                        "file" => files.push((name, FileField::placeholder())),
                        "checkbox" | "radio" => {
                            fields.push((name, el.attr("value").unwrap_or("on").to_string()))
                        }
                        "submit" | "image" => {
                            fields.push((name, el.attr("value").unwrap_or("submit").to_string()))
                        }
                        _ => fields.push((name, default_value(el.attr("value")))),
                    }
                }
                "textarea" => {
                    let text = field.text().collect::<String>();
                    fields.push((name, default_value(Some(text.trim()))));
                }
                "select" => {
                    let option = Selector::parse("option").ok()?;
                    let value = field
                        .select(&option)
                        .next()
                        .map(|o| {
                            o.value()
                                .attr("value")
                                .map(str::to_string)
                                .unwrap_or_else(|| o.text().collect::<String>())
                        })
                        .unwrap_or_default();
                    fields.push((name, default_value(Some(value.trim()))));
                }
                _ => {}
            }
        }

        if method == "POST" {
            Some(Resource::form(url, fields, files, Some(page_url.to_string())))
        } else {
            // GET form: fields become the query string
            let mut url = url;
            if !fields.is_empty() {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter().map(|(k, v)| (k, v)))
                    .finish();
                url.set_query(Some(&query));
            }
            Some(Resource::get(url, Some(page_url.to_string())))
        }
    }
}

fn default_value(attr: Option<&str>) -> String {
    match attr {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "default".to_string(),
    }
}
