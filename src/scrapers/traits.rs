use crate::error::BrowserError;
use serde_json::Value;

/// Starts isolated browser sessions, one per query.
/// This is the seam between the scraper core and any rendering engine.
pub trait Driver {
    type Session: Page;

    /// Open a fresh session with no state shared with earlier ones
    fn open_session(&self) -> Result<Self::Session, BrowserError>;
}

/// A rendered document inside one browser session
pub trait Page {
    type Element<'a>: Node
    where
        Self: 'a;

    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Run a script in page context and return its JSON result
    fn execute_script(&self, script: &str) -> Result<Value, BrowserError>;

    fn find_element(&self, selector: &str) -> Result<Self::Element<'_>, BrowserError>;

    fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element<'_>>, BrowserError>;

    /// Serialized markup of the current document
    fn html(&self) -> Result<String, BrowserError>;

    /// Tear the session down. Dropping a session must release it as well.
    fn close(self) -> Result<(), BrowserError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// An element handle inside a [`Page`]
pub trait Node: Sized {
    /// First descendant matching `selector`
    fn find_element(&self, selector: &str) -> Result<Self, BrowserError>;

    fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError>;

    fn text(&self) -> Result<Option<String>, BrowserError>;
}
