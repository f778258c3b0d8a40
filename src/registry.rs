//! Tracked file registry: maps URL suffixes to friendly names and criticality.

use crate::config::TrackedFileSpec;

/// Result of classifying a URL against the registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedMatch<'a> {
    /// The spec the URL matched
    pub spec: &'a TrackedFileSpec,
}

impl TrackedMatch<'_> {
    /// Friendly name of the matched resource
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Whether the matched resource holds the completion gate
    pub fn critical(&self) -> bool {
        self.spec.critical
    }
}

/// Immutable table of tracked file specs
///
/// The first spec whose suffix matches wins, so more specific suffixes should be
/// listed before more general ones.
#[derive(Clone, Debug, Default)]
pub struct TrackedFileRegistry {
    specs: Vec<TrackedFileSpec>,
}

impl TrackedFileRegistry {
    /// Create a registry from a list of specs
    pub fn new(specs: Vec<TrackedFileSpec>) -> Self {
        Self { specs }
    }

    /// All registered specs, in match order
    pub fn specs(&self) -> &[TrackedFileSpec] {
        &self.specs
    }

    /// Classify a URL, returning the matching spec if the URL is tracked
    ///
    /// # Examples
    ///
    /// ```
    /// use fetch_tracker::config::TrackedFileSpec;
    /// use fetch_tracker::registry::TrackedFileRegistry;
    ///
    /// let registry = TrackedFileRegistry::new(vec![TrackedFileSpec::new(".wasm.br", "WasmFile")]);
    ///
    /// let hit = registry.classify("https://cdn.example.com/Build/game.wasm.br?v=7").unwrap();
    /// assert_eq!(hit.name(), "WasmFile");
    /// assert!(registry.classify("https://cdn.example.com/index.html").is_none());
    /// ```
    pub fn classify(&self, url: &str) -> Option<TrackedMatch<'_>> {
        let path = strip_query(url);
        self.specs
            .iter()
            .find(|spec| path.ends_with(spec.suffix.as_str()))
            .map(|spec| TrackedMatch { spec })
    }

    /// Whether `url` matches the given spec
    pub fn matches(spec: &TrackedFileSpec, url: &str) -> bool {
        strip_query(url).ends_with(spec.suffix.as_str())
    }

    /// Critical specs that have no matching URL among `urls` yet
    ///
    /// An empty result means every critical resource has been observed at least once.
    pub fn missing_critical<'a, I>(&self, urls: I) -> Vec<&TrackedFileSpec>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.specs
            .iter()
            .filter(|spec| spec.critical)
            .filter(|spec| !urls.clone().into_iter().any(|url| Self::matches(spec, url)))
            .collect()
    }
}

/// Strip the query string and fragment from a URL
pub(crate) fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
