use crate::error::BrowserError;
use crate::scrapers::traits::{Node, Page};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;

/// A static document parsed with `scraper`, exposed through the same
/// capability surface as a live browser tab.
///
/// Used to re-extract listings from saved page snapshots. Scripts are not
/// executed; every script call yields the next scripted document height, and
/// the last height repeats once the sequence runs out.
pub struct HtmlPage {
    document: Html,
    source: String,
    heights: RefCell<VecDeque<i64>>,
    last_height: RefCell<i64>,
}

impl HtmlPage {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            source: html.to_string(),
            heights: RefCell::new(VecDeque::new()),
            last_height: RefCell::new(0),
        }
    }

    /// Script results to return, in order
    #[cfg(test)]
    pub fn with_heights(self, heights: impl IntoIterator<Item = i64>) -> Self {
        *self.heights.borrow_mut() = heights.into_iter().collect();
        self
    }
}

fn parse_selector(selector: &str) -> Result<Selector, BrowserError> {
    Selector::parse(selector).map_err(|e| BrowserError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl Page for HtmlPage {
    type Element<'a> = ElementRef<'a>;

    fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    fn execute_script(&self, _script: &str) -> Result<Value, BrowserError> {
        let next = self.heights.borrow_mut().pop_front();
        let mut last = self.last_height.borrow_mut();
        if let Some(height) = next {
            *last = height;
        }
        Ok(json!(*last))
    }

    fn find_element(&self, selector: &str) -> Result<ElementRef<'_>, BrowserError> {
        let parsed = parse_selector(selector)?;
        self.document
            .select(&parsed)
            .next()
            .ok_or_else(|| BrowserError::NotFound {
                selector: selector.to_string(),
            })
    }

    fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef<'_>>, BrowserError> {
        let parsed = parse_selector(selector)?;
        Ok(self.document.select(&parsed).collect())
    }

    fn html(&self) -> Result<String, BrowserError> {
        Ok(self.source.clone())
    }
}

impl<'a> Node for ElementRef<'a> {
    fn find_element(&self, selector: &str) -> Result<Self, BrowserError> {
        let parsed = parse_selector(selector)?;
        self.select(&parsed)
            .next()
            .ok_or_else(|| BrowserError::NotFound {
                selector: selector.to_string(),
            })
    }

    fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.value().attr(name).map(str::to_string))
    }

    fn text(&self) -> Result<Option<String>, BrowserError> {
        let text = ElementRef::text(self).collect::<String>();
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
