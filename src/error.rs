use thiserror::Error;

/// Failures surfaced by a browser capability implementation
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to start browser session: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("script execution failed: {0}")]
    Script(String),
    #[error("no element matches `{selector}`")]
    NotFound { selector: String },
    #[error("lookup of `{selector}` failed: {reason}")]
    Lookup { selector: String, reason: String },
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
}

/// Query-fatal conditions: the query is skipped and no file is written for it
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("browser session unavailable: {0}")]
    Session(#[source] BrowserError),
    #[error("could not load page: {0}")]
    Navigation(#[source] BrowserError),
    #[error("result count element missing: {0}")]
    ResultCountMissing(#[source] BrowserError),
    #[error("result count text `{0}` holds no number")]
    ResultCountUnparsable(String),
}

/// Listing-fatal conditions: one listing is dropped, the page continues
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing fragment for id {id:?} unavailable: {source}")]
    ListingFragment {
        id: Option<String>,
        #[source]
        source: BrowserError,
    },
    #[error("attribute fragment for id_string {id_string:?} unavailable: {source}")]
    AttributeFragment {
        id_string: Option<String>,
        #[source]
        source: BrowserError,
    },
}

/// Why a single field resolved to the missing marker
#[derive(Debug, Error)]
pub enum MissingField {
    #[error("lookup key `{0}` is missing")]
    NoKey(&'static str),
    #[error("attribute `{0}` absent")]
    AttributeAbsent(String),
    #[error("element has no text")]
    NoText,
    #[error("summary label is `{0}`")]
    LabelMismatch(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Rejected query-grid inputs
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("bedroom range {min}..={max} is empty")]
    EmptyBedroomRange { min: u8, max: u8 },
    #[error("budget range {min}..{max} is empty")]
    EmptyBudgetRange { min: u64, max: u64 },
    #[error("exponent step {0} must be positive and no finer than one unit of the budget range")]
    InvalidStep(f64),
    #[error("city name is empty")]
    EmptyCity,
    #[error("no property types selected")]
    NoPropertyTypes,
}
