//! Request classification by URL shape.

use url::Url;

use crate::config::Config;
use crate::http::{Request, RequestMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Versioned assets: cache-first
    Static,
    /// Data endpoints: network-first, stored copy on failure
    Dynamic,
    /// Document loads: network-first, shell document on failure
    Navigation,
    /// Everything else: network, cache only as a last resort
    Other,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Option<Url>,
    static_prefixes: Vec<String>,
    static_extensions: Vec<String>,
    dynamic_prefixes: Vec<String>,
}

impl Classifier {
    pub fn new(origin: Option<Url>, config: &Config) -> Self {
        Self {
            origin,
            static_prefixes: config.static_prefixes.clone(),
            static_extensions: config
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            dynamic_prefixes: config.dynamic_prefixes.clone(),
        }
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        if !request.is_get() {
            return RequestClass::Other;
        }
        if let Some(ref origin) = self.origin {
            if request.url.origin() != origin.origin() {
                return RequestClass::Other;
            }
        }
        if request.mode == RequestMode::Navigate {
            return RequestClass::Navigation;
        }

        let path = request.url.path();
        if self.dynamic_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return RequestClass::Dynamic;
        }
        if self.static_prefixes.iter().any(|p| path.starts_with(p.as_str())) || self.has_static_extension(path) {
            return RequestClass::Static;
        }
        RequestClass::Other
    }

    fn has_static_extension(&self, path: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or_default();
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.static_extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        let origin = Url::parse("https://records.example.com").unwrap();
        Classifier::new(Some(origin), &Config::default())
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse("https://records.example.com").unwrap().join(path).unwrap())
    }

    #[test]
    fn test_static_by_prefix_and_extension() {
        let c = classifier();
        assert_eq!(c.classify(&get("/_next/static/chunks/main-abc.js")), RequestClass::Static);
        assert_eq!(c.classify(&get("/icons/icon-192.png")), RequestClass::Static);
        assert_eq!(c.classify(&get("/app.css")), RequestClass::Static);
        assert_eq!(c.classify(&get("/fonts/Inter.WOFF2")), RequestClass::Static);
    }

    #[test]
    fn test_dynamic_prefixes_win_over_extensions() {
        let c = classifier();
        assert_eq!(c.classify(&get("/api/records")), RequestClass::Dynamic);
        assert_eq!(c.classify(&get("/api/export/report.png")), RequestClass::Dynamic);
        assert_eq!(c.classify(&get("/rest/v1/medications?select=*")), RequestClass::Dynamic);
    }

    #[test]
    fn test_navigation_mode() {
        let c = classifier();
        let url = Url::parse("https://records.example.com/records/42").unwrap();
        assert_eq!(c.classify(&Request::navigate(url)), RequestClass::Navigation);
    }

    #[test]
    fn test_other_cases() {
        let c = classifier();
        assert_eq!(c.classify(&get("/health")), RequestClass::Other);
        assert_eq!(c.classify(&get("/.css")), RequestClass::Other);
        assert_eq!(c.classify(&get("/api/records").with_method("POST")), RequestClass::Other);

        let foreign = Request::get(Url::parse("https://cdn.example.net/lib.js").unwrap());
        assert_eq!(c.classify(&foreign), RequestClass::Other);
    }
}
