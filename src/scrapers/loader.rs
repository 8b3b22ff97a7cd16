use crate::error::{BrowserError, LoadError};
use crate::scrapers::schema::ExtractionSchema;
use crate::scrapers::traits::{Driver, Node, Page};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scrolls to the bottom and reports the resulting document height
pub const SCROLL_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); document.body.scrollHeight";

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadState {
    Init,
    Navigating,
    Scrolling,
    Stable,
    Failed,
}

fn log_state(url: &str, state: LoadState) {
    debug!(url, state = ?state, "page_load_state");
}

/// Why the scroll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Height stopped changing
    Stabilized,
    /// A scroll or measurement failed; whatever loaded so far is kept
    ScriptError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollReport {
    pub scroll_num: u32,
    pub final_height: i64,
    pub stop: ScrollStop,
}

/// A fully scrolled page. Owns its browser session.
pub struct LoadedPage<S: Page> {
    pub session: S,
    pub result_count: u64,
    pub scroll: ScrollReport,
}

/// Drives a query URL from a fresh session to a stable, fully scrolled page
#[derive(Debug, Clone)]
pub struct PageLoader {
    result_count_selector: String,
    scroll_pause: Duration,
    stable_confirmations: u32,
}

impl PageLoader {
    pub fn new(schema: &ExtractionSchema, scroll_pause: Duration, stable_confirmations: u32) -> Self {
        Self {
            result_count_selector: schema.result_count.clone(),
            scroll_pause,
            stable_confirmations: stable_confirmations.max(1),
        }
    }

    /// Open a session, navigate, read the result count and scroll until stable.
    ///
    /// Any error before scrolling starts is query-fatal. The session is
    /// dropped on those paths, which tears it down.
    pub fn load<D: Driver>(&self, driver: &D, url: &str) -> Result<LoadedPage<D::Session>, LoadError> {
        log_state(url, LoadState::Init);
        let started = Instant::now();

        let mut session = driver.open_session().map_err(|e| {
            log_state(url, LoadState::Failed);
            LoadError::Session(e)
        })?;

        log_state(url, LoadState::Navigating);
        if let Err(e) = session.navigate(url) {
            log_state(url, LoadState::Failed);
            return Err(LoadError::Navigation(e));
        }
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Page loaded");

        let result_count = match self.read_result_count(&session) {
            Ok(count) => count,
            Err(e) => {
                log_state(url, LoadState::Failed);
                return Err(e);
            }
        };
        info!(result_count, "results advertised for current url");

        log_state(url, LoadState::Scrolling);
        let scroll = self.scroll_until_stable(&session);
        log_state(url, LoadState::Stable);

        Ok(LoadedPage {
            session,
            result_count,
            scroll,
        })
    }

    fn read_result_count<P: Page>(&self, page: &P) -> Result<u64, LoadError> {
        let element = page
            .find_element(&self.result_count_selector)
            .map_err(LoadError::ResultCountMissing)?;
        let text = element
            .text()
            .map_err(LoadError::ResultCountMissing)?
            .unwrap_or_default();

        parse_result_count(&text).ok_or(LoadError::ResultCountUnparsable(text))
    }

    /// Scroll to the bottom until the document height holds steady.
    ///
    /// There is no iteration cap: only a steady height or a failing script
    /// ends the loop.
    pub fn scroll_until_stable<P: Page>(&self, page: &P) -> ScrollReport {
        let started = Instant::now();
        let mut scroll_num = 0u32;

        let mut height = match measure(page) {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "initial scroll failed, keeping page as loaded");
                return ScrollReport {
                    scroll_num,
                    final_height: 0,
                    stop: ScrollStop::ScriptError,
                };
            }
        };

        let mut unchanged = 0u32;
        loop {
            let last = height;
            if !self.scroll_pause.is_zero() {
                thread::sleep(self.scroll_pause);
            }

            height = match measure(page) {
                Ok(height) => height,
                Err(e) => {
                    info!(
                        scroll_num,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "Page scrolling ended on script error"
                    );
                    return ScrollReport {
                        scroll_num,
                        final_height: last,
                        stop: ScrollStop::ScriptError,
                    };
                }
            };
            scroll_num += 1;

            if scroll_num % 10 == 0 {
                info!(
                    scroll_num,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scrolls completed"
                );
            }

            if height == last {
                unchanged += 1;
                if unchanged >= self.stable_confirmations {
                    info!(
                        scroll_num,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Page scrolling completed"
                    );
                    return ScrollReport {
                        scroll_num,
                        final_height: height,
                        stop: ScrollStop::Stabilized,
                    };
                }
            } else {
                unchanged = 0;
            }
        }
    }
}

fn measure<P: Page>(page: &P) -> Result<i64, BrowserError> {
    match page.execute_script(SCROLL_SCRIPT)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| BrowserError::Script(format!("height `{}` out of range", n))),
        other => Err(BrowserError::Script(format!(
            "scroll script returned {} instead of a height",
            other
        ))),
    }
}

/// First number in the results summary, e.g. `"1,204 Flats"` -> 1204
pub fn parse_result_count(text: &str) -> Option<u64> {
    let text = text.replace(',', "");
    DIGITS.find(&text)?.as_str().parse().ok()
}
