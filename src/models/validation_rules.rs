use std::borrow::Cow;
use std::collections::HashMap;

use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref LINK_RE: Regex = Regex::new(r"(?i)(https?://|www\.)").unwrap();
    static ref HTML_RE: Regex = Regex::new(r"(?i)<\s*(script|iframe|object|embed|form|img|a)\b").unwrap();
}

/// Returns true when text carries a link or an html marker
pub fn contains_forbidden_content(text: &str) -> bool {
    LINK_RE.is_match(text) || HTML_RE.is_match(text)
}

/// Rejects links and html markers in user supplied text
pub fn validate_content(text: &str) -> Result<(), ValidationError> {
    if contains_forbidden_content(text) {
        Err(ValidationError {
            code: Cow::from("content"),
            message: Some(Cow::from("Links and HTML are not allowed.")),
            params: HashMap::new(),
        })
    } else {
        Ok(())
    }
}

pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        Err(ValidationError {
            code: Cow::from("blank"),
            message: Some(Cow::from("Value must not be blank.")),
            params: HashMap::new(),
        })
    } else {
        Ok(())
    }
}

pub fn validate_non_negative(val: f64) -> Result<(), ValidationError> {
    if val >= 0f64 {
        Ok(())
    } else {
        Err(ValidationError {
            code: Cow::from("value"),
            message: Some(Cow::from("Value must be non negative.")),
            params: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_are_rejected() {
        assert!(contains_forbidden_content("Visit http://x.com"));
        assert!(contains_forbidden_content("HTTPS://example.org"));
        assert!(contains_forbidden_content("go to WWW.shop.jo"));
    }

    #[test]
    fn test_html_markers_are_rejected() {
        assert!(contains_forbidden_content("<script>alert(1)</script>"));
        assert!(contains_forbidden_content("< IMG src=x>"));
        assert!(contains_forbidden_content("click <a href=#>"));
    }

    #[test]
    fn test_plain_text_passes() {
        assert!(validate_content("iPhone 12, barely used, 64GB").is_ok());
        assert!(validate_content("price < 100 JOD").is_ok());
        assert!(validate_content("<abbr>").is_ok());
    }
}
