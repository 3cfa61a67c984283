//! The fixed list of assets cached at install time.

use url::Url;

use crate::Error;

/// Assets that must be present in the cache after install, in fetch order.
/// Relative entries resolve against the configured origin.
pub const ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/styles.css",
    "/script.js",
    "/translations.js",
    "/manifest.json",
    "/offline.html",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
    "/icons/icon-144.png",
    "/icons/icon-72.png",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/5.15.4/css/all.min.css",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://cdn.jsdelivr.net/npm/chart.js",
    "https://cdnjs.cloudflare.com/ajax/libs/xlsx/0.18.5/xlsx.full.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/jspdf/2.5.1/jspdf.umd.min.js",
];

/// An ordered install manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(ASSETS.iter().copied())
    }
}

impl Manifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { entries: entries.into_iter().map(Into::into).collect() }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry to an absolute URL, keeping manifest order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` naming the first entry that does not parse.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, Error> {
        self.entries
            .iter()
            .map(|entry| origin.join(entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_has_offline_page() {
        let manifest = Manifest::default();
        assert_eq!(manifest.len(), 16);
        assert!(manifest.entries().iter().any(|e| e == "/offline.html"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let urls = Manifest::default().resolve(&origin).unwrap();

        assert_eq!(urls[0].as_str(), "http://localhost:8080/");
        assert_eq!(urls[2].as_str(), "http://localhost:8080/styles.css");
        assert_eq!(urls[13].as_str(), "https://cdn.jsdelivr.net/npm/chart.js");
        assert_eq!(urls[12].query(), Some("family=Inter:wght@400;500;600;700&display=swap"));
    }

    #[test]
    fn test_resolve_keeps_order() {
        let origin = Url::parse("https://app.example").unwrap();
        let manifest = Manifest::new(["/b", "/a", "/c"]);
        let paths: Vec<_> = manifest.resolve(&origin).unwrap().iter().map(|u| u.path().to_string()).collect();
        assert_eq!(paths, vec!["/b", "/a", "/c"]);
    }
}
