use crate::error::BrowserError;
use crate::scrapers::traits::{Driver, Node, Page};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Chrome switch that stops image downloads; listing data never needs them
const DISABLE_IMAGES: &str = "--blink-settings=imagesEnabled=false";

/// Launches one headless Chrome process per session
#[derive(Debug, Clone)]
pub struct ChromeDriver {
    headless: bool,
    idle_timeout: Duration,
}

impl ChromeDriver {
    pub fn new(headless: bool, idle_timeout: Duration) -> Self {
        Self {
            headless,
            idle_timeout,
        }
    }
}

impl Driver for ChromeDriver {
    type Session = ChromeSession;

    fn open_session(&self) -> Result<ChromeSession, BrowserError> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .idle_browser_timeout(self.idle_timeout)
            .args(vec![OsStr::new(DISABLE_IMAGES)])
            .build()
            .map_err(|e| BrowserError::Launch(format!("invalid launch options: {}", e)))?;

        let browser = Browser::new(options).map_err(|e| BrowserError::Launch(format!("{:#}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(format!("could not open tab: {:#}", e)))?;

        Ok(ChromeSession {
            tab,
            _browser: browser,
        })
    }
}

/// A live Chrome process with a single tab.
///
/// Dropping the session kills the process, so an early return anywhere in
/// the pipeline still releases it.
pub struct ChromeSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

fn lookup_error(selector: &str, e: anyhow::Error) -> BrowserError {
    BrowserError::Lookup {
        selector: selector.to_string(),
        reason: format!("{:#}", e),
    }
}

impl Page for ChromeSession {
    type Element<'a> = Element<'a>;

    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "navigating");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("{:#}", e),
            })
    }

    fn execute_script(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::Script(format!("{:#}", e)))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn find_element(&self, selector: &str) -> Result<Element<'_>, BrowserError> {
        self.tab
            .find_element(selector)
            .map_err(|e| lookup_error(selector, e))
    }

    fn find_elements(&self, selector: &str) -> Result<Vec<Element<'_>>, BrowserError> {
        self.tab
            .find_elements(selector)
            .map_err(|e| lookup_error(selector, e))
    }

    fn html(&self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::Script(format!("could not capture page HTML: {:#}", e)))
    }

    fn close(self) -> Result<(), BrowserError> {
        self.tab
            .close(false)
            .map(|_| ())
            .map_err(|e| BrowserError::Script(format!("could not close tab: {:#}", e)))
    }
}

impl<'a> Node for Element<'a> {
    fn find_element(&self, selector: &str) -> Result<Self, BrowserError> {
        Element::find_element(self, selector).map_err(|e| lookup_error(selector, e))
    }

    fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.get_attribute_value(name)
            .map_err(|e| BrowserError::Lookup {
                selector: format!("@{}", name),
                reason: format!("{:#}", e),
            })
    }

    fn text(&self) -> Result<Option<String>, BrowserError> {
        let text = self.get_inner_text().map_err(|e| BrowserError::Lookup {
            selector: "innerText".to_string(),
            reason: format!("{:#}", e),
        })?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
