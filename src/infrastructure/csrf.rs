use percent_encoding::percent_decode_str;
use std::sync::RwLock;

pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

pub trait CsrfTokenSource: Send + Sync {
    fn csrf_token(&self) -> Option<String>;

    /// Session cookies forwarded with every request.
    fn cookie_header(&self) -> Option<String> {
        None
    }
}

/// Resolves the token the way rendered pages expose it: the hidden form field
/// wins, the cookie is the fallback.
#[derive(Debug)]
pub struct PageCsrfSource {
    cookie_name: String,
    form_token: RwLock<Option<String>>,
    cookie_header: RwLock<Option<String>>,
}

impl PageCsrfSource {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            form_token: RwLock::new(None),
            cookie_header: RwLock::new(None),
        }
    }

    pub fn with_form_token(self, token: impl Into<String>) -> Self {
        self.set_form_token(Some(token.into()));
        self
    }

    pub fn set_form_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.form_token.write() {
            *guard = token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
    }

    pub fn set_cookie_header(&self, header: Option<String>) {
        if let Ok(mut guard) = self.cookie_header.write() {
            *guard = header
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
    }

    /// Picks up the hidden form field from rendered page markup.
    pub fn observe_page(&self, html: &str) {
        if let Some(token) = token_from_form(html) {
            self.set_form_token(Some(token));
        }
    }
}

impl CsrfTokenSource for PageCsrfSource {
    fn csrf_token(&self) -> Option<String> {
        let form = self
            .form_token
            .read()
            .ok()
            .and_then(|guard| guard.clone());
        if form.is_some() {
            return form;
        }
        self.cookie_header()
            .and_then(|header| token_from_cookie_header(&header, &self.cookie_name))
    }

    fn cookie_header(&self) -> Option<String> {
        self.cookie_header.read().ok().and_then(|guard| guard.clone())
    }
}

pub fn token_from_cookie_header(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        if key != name {
            return None;
        }
        let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();
        (!decoded.is_empty()).then_some(decoded)
    })
}

pub fn token_from_form(html: &str) -> Option<String> {
    let marker = format!("name=\"{CSRF_FORM_FIELD}\"");
    let start = html.find(&marker)?;
    let tag_start = html[..start].rfind('<')?;
    let tag_end = start + html[start..].find('>')?;
    let tag = &html[tag_start..tag_end];

    let value_start = tag.find("value=\"")? + "value=\"".len();
    let value_len = tag[value_start..].find('"')?;
    let value = tag[value_start..value_start + value_len].trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_matches_exact_name_and_decodes() {
        let header = "sessionid=abc; csrftokenx=nope; csrftoken=tok%2Fen123";
        assert_eq!(
            token_from_cookie_header(header, "csrftoken").as_deref(),
            Some("tok/en123")
        );
        assert_eq!(token_from_cookie_header(header, "missing"), None);
        assert_eq!(token_from_cookie_header("csrftoken=", "csrftoken"), None);
        assert_eq!(
            token_from_cookie_header("csrftoken=50%25%zz", "csrftoken").as_deref(),
            Some("50%%zz")
        );
    }

    #[test]
    fn form_field_is_extracted_from_markup() {
        let html = r#"<form><input type="hidden" name="csrfmiddlewaretoken" value="form-token-1"></form>"#;
        assert_eq!(token_from_form(html).as_deref(), Some("form-token-1"));
        assert_eq!(token_from_form("<form></form>"), None);
    }

    #[test]
    fn form_token_takes_precedence_over_cookie() {
        let source = PageCsrfSource::new("csrftoken");
        assert_eq!(source.csrf_token(), None);

        source.set_cookie_header(Some("csrftoken=cookie-token".to_string()));
        assert_eq!(source.csrf_token().as_deref(), Some("cookie-token"));
        assert_eq!(source.cookie_header().as_deref(), Some("csrftoken=cookie-token"));

        source.observe_page(r#"<input name="csrfmiddlewaretoken" value="form-token" type="hidden">"#);
        assert_eq!(source.csrf_token().as_deref(), Some("form-token"));
    }
}
