use provenance_core::error::ConfigError;

pub const DEFAULT_MIN_CHARS: usize = 80;
pub const DEFAULT_MAX_CHARS: usize = 120;
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;
pub const DEFAULT_SEARCH_KEYWORDS: [&str; 3] = ["web__search", "web_search", "search_web"];
pub const DEFAULT_FETCH_KEYWORDS: [&str; 6] = [
    "url__fetch",
    "url_fetch",
    "fetch_webpage",
    "fetch_url",
    "web_fetch_page",
    "web_fetch",
];
pub const SEARCH_STEP_NAME: &str = "web_search";
pub const FETCH_STEP_NAME: &str = "url_fetch";

/// Inclusive character-count bounds for the trimmed narrative text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    min: usize,
    max: usize,
}

impl LengthBounds {
    pub fn new(min: usize, max: usize) -> Result<Self, ConfigError> {
        if max == 0 || min > max {
            return Err(ConfigError::InvalidLengthBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn contains(&self, chars: usize) -> bool {
        (self.min..=self.max).contains(&chars)
    }
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_CHARS,
            max: DEFAULT_MAX_CHARS,
        }
    }
}

/// Which prior tool calls must show up in the window before a text is
/// accepted. With `enforce` off the check always passes, but the counts
/// are still reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPolicy {
    pub search_keywords: Vec<String>,
    pub fetch_keywords: Vec<String>,
    pub enforce: bool,
}

impl StepPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_keyword(&self.search_keywords) {
            return Err(ConfigError::EmptyKeywordGroup { group: "search" });
        }
        if !has_keyword(&self.fetch_keywords) {
            return Err(ConfigError::EmptyKeywordGroup { group: "fetch" });
        }
        Ok(())
    }

    pub fn is_search_call(&self, tool_name: &str) -> bool {
        matches_tool(tool_name, &self.search_keywords)
    }

    pub fn is_fetch_call(&self, tool_name: &str) -> bool {
        matches_tool(tool_name, &self.fetch_keywords)
    }
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            search_keywords: DEFAULT_SEARCH_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            fetch_keywords: DEFAULT_FETCH_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            enforce: false,
        }
    }
}

fn has_keyword(keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.trim().is_empty())
}

fn matches_tool(tool_name: &str, keywords: &[String]) -> bool {
    let normalized = tool_name.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && normalized.contains(&k))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Only log files newer than `now - window_minutes` are consulted
    pub window_minutes: u32,
    /// Bounds used when a verification does not pass its own
    pub length: LengthBounds,
    pub steps: StepPolicy,
}

impl VerifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_minutes == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        LengthBounds::new(self.length.min, self.length.max)?;
        self.steps.validate()
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            length: LengthBounds::default(),
            steps: StepPolicy::default(),
        }
    }
}
