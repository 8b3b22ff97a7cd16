use crate::config::ScrapeConfig;
use crate::models::{Field, ListingRecord};
use crate::output::aggregate::{dedup_by, discover_indexed_files, discover_query_files, load_all};
use crate::output::clean::normalize;
use crate::output::persist::write_query_results;
use crate::scrapers::extract::ListingExtractor;
use crate::scrapers::loader::{LoadedPage, PageLoader};
use crate::scrapers::snapshot::HtmlPage;
use crate::scrapers::traits::{Driver, Page};
use crate::scrapers::types::build_query_grid;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

static SNAPSHOT_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^query_([0-9]+)\.html$").unwrap());

/// Counters reported at the end of a scrape or replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub queries: usize,
    pub skipped: usize,
    pub written: usize,
    pub records: usize,
    pub dropped_listings: usize,
}

pub fn snapshot_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("query_{}.html", index))
}

fn save_snapshot<P: Page>(page: &P, dir: &Path, index: usize) -> Result<PathBuf> {
    let html = page.html()?;
    let path = snapshot_path(dir, index);
    fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn persist(config: &ScrapeConfig, index: usize, records: &[ListingRecord], summary: &mut RunSummary) {
    match write_query_results(&config.working_dir, index, records) {
        Ok(_) => {
            summary.written += 1;
            summary.records += records.len();
        }
        Err(e) => warn!(query = index, error = %format!("{:#}", e), "could not save query results"),
    }
}

/// Remove per-query files left by an earlier run
fn clear_query_files(dir: &Path) -> Result<usize> {
    let stale = discover_query_files(dir)?;
    for (_, path) in &stale {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(stale.len())
}

/// Run every query of the grid, one browser session at a time.
///
/// Query-level failures are logged and skipped; only an invalid grid or an
/// unusable working directory stops the run.
pub fn run_scrape<D: Driver>(config: &ScrapeConfig, driver: &D) -> Result<RunSummary> {
    let started = Instant::now();
    let queries = build_query_grid(&config.search).context("Invalid search parameters")?;
    info!(
        queries = queries.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "URL setup completed"
    );

    fs::create_dir_all(&config.working_dir)
        .with_context(|| format!("Failed to create {}", config.working_dir.display()))?;
    if let Some(dir) = &config.snapshot_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let removed = clear_query_files(&config.working_dir)?;
    if removed > 0 {
        info!(removed, "Cleared query files from a previous run");
    }

    let loader = PageLoader::new(&config.schema, config.scroll_pause(), config.stable_confirmations);
    let extractor = ListingExtractor::new(&config.schema);
    let mut summary = RunSummary {
        queries: queries.len(),
        ..RunSummary::default()
    };

    for (idx, query) in queries.iter().enumerate() {
        let index = idx + 1;
        let url = query.url(&config.base_url);
        let query_started = Instant::now();
        info!(
            query = index,
            total = queries.len(),
            bedrooms = query.bedrooms,
            price_min = query.price_min,
            price_max = query.price_max,
            "Loading web page"
        );

        let LoadedPage {
            session,
            result_count,
            scroll,
        } = match loader.load(driver, &url) {
            Ok(page) => page,
            Err(e) => {
                warn!(query = index, url = %url, error = %e, "skipping query");
                summary.skipped += 1;
                continue;
            }
        };
        debug!(
            query = index,
            scroll_num = scroll.scroll_num,
            final_height = scroll.final_height,
            stop = ?scroll.stop,
            "page stable"
        );

        if let Some(dir) = &config.snapshot_dir {
            match save_snapshot(&session, dir, index) {
                Ok(path) => debug!(query = index, path = %path.display(), "saved page snapshot"),
                Err(e) => warn!(query = index, error = %format!("{:#}", e), "could not save page snapshot"),
            }
        }

        let extraction = extractor.extract(&session);
        if (extraction.markers as u64) < result_count {
            info!(
                query = index,
                advertised = result_count,
                located = extraction.markers,
                "fewer cards rendered than advertised"
            );
        }
        if let Err(e) = session.close() {
            warn!(query = index, error = %e, "browser session did not close cleanly");
        }

        summary.dropped_listings += extraction.dropped;
        persist(config, index, &extraction.records, &mut summary);

        info!(
            query = index,
            records = extraction.records.len(),
            elapsed_ms = query_started.elapsed().as_millis() as u64,
            "results scraped for url"
        );
    }

    info!(
        queries = summary.queries,
        skipped = summary.skipped,
        written = summary.written,
        records = summary.records,
        dropped_listings = summary.dropped_listings,
        elapsed_s = started.elapsed().as_secs(),
        "Scrape finished"
    );
    Ok(summary)
}

/// Rebuild per-query files from page snapshots saved by an earlier scrape
pub fn replay_snapshots(config: &ScrapeConfig) -> Result<RunSummary> {
    let dir = config
        .snapshot_dir
        .as_deref()
        .context("Replay needs `snapshot_dir` to be set")?;
    let snapshots = discover_indexed_files(dir, &SNAPSHOT_FILE)?;
    fs::create_dir_all(&config.working_dir)
        .with_context(|| format!("Failed to create {}", config.working_dir.display()))?;

    let extractor = ListingExtractor::new(&config.schema);
    let mut summary = RunSummary {
        queries: snapshots.len(),
        ..RunSummary::default()
    };

    for (index, path) in &snapshots {
        let html = match fs::read_to_string(path) {
            Ok(html) => html,
            Err(e) => {
                warn!(query = index, path = %path.display(), error = %e, "skipping unreadable snapshot");
                summary.skipped += 1;
                continue;
            }
        };

        let extraction = extractor.extract(&HtmlPage::parse(&html));
        summary.dropped_listings += extraction.dropped;
        persist(config, *index, &extraction.records, &mut summary);
    }

    info!(
        snapshots = summary.queries,
        written = summary.written,
        records = summary.records,
        "Replay finished"
    );
    Ok(summary)
}

/// Consolidate every per-query file into the clean dataset.
///
/// Any failure here is fatal for the run and leaves no consolidated file.
pub fn run_aggregate(config: &ScrapeConfig) -> Result<usize> {
    let started = Instant::now();
    let mut table = load_all(&config.working_dir)?;

    for (column, count) in table.non_null_counts() {
        debug!(column, non_null = count, "column coverage");
    }

    let duplicates = dedup_by(&mut table, Field::Id.column()).context("Data could not be processed")?;
    info!(duplicates, "Dropping duplicates leaves {} rows", table.rows.len());

    let dataset = normalize(table)?;
    dataset.write_atomic(&config.clean_output_path())?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Data processed and written"
    );
    Ok(dataset.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use crate::scrapers::types::{PropertyCategory, SearchParams};
    use std::cell::Cell;

    fn listing(id: &str, dev_name: &str) -> String {
        format!(
            r#"
            <span class="domcache js-domcache-srpgtm" data-objid="{id}" id="srp_{id}" data-cityname="Pune"></span>
            <div data-id="{id}">
                <meta itemprop="floorSize" content="900 sqft">
                <span id="srp_{id}" data-floorno="Ground" data-createdate="20210615" data-devname="{dev_name}"></span>
                <div class="m-srp-card__summary js-collapse__content">
                    <div class="m-srp-card__summary__item">
                        <div class="m-srp-card__summary__title">FLOOR</div>
                        <div class="m-srp-card__summary__info">Ground out of 4 Floors</div>
                    </div>
                </div>
            </div>
            "#
        )
    }

    fn results_page(listings: &[String]) -> String {
        format!(
            r#"<html><body><a class="active"><span>{} Flats</span></a>{}</body></html>"#,
            listings.len(),
            listings.concat()
        )
    }

    /// Serves prepared pages in order; `None` makes the session fail to start
    struct QueueDriver {
        pages: Vec<Option<String>>,
        opened: Cell<usize>,
    }

    impl Driver for QueueDriver {
        type Session = HtmlPage;

        fn open_session(&self) -> Result<HtmlPage, BrowserError> {
            let n = self.opened.get();
            self.opened.set(n + 1);
            match self.pages.get(n).cloned().flatten() {
                Some(html) => Ok(HtmlPage::parse(&html).with_heights([500, 900, 900])),
                None => Err(BrowserError::Launch("chrome crashed".to_string())),
            }
        }
    }

    fn test_config(dir: &Path) -> ScrapeConfig {
        ScrapeConfig {
            working_dir: dir.join("work"),
            base_url: "https://example.test/srp".to_string(),
            search: SearchParams {
                city: "Pune".to_string(),
                min_bedrooms: 1,
                max_bedrooms: 1,
                budget_min: 1_000,
                budget_max: 100_000,
                exponent_step: 1.0,
                property_types: vec![PropertyCategory::Penthouse],
            },
            scroll_pause_ms: 0,
            snapshot_dir: Some(dir.join("snapshots")),
            ..ScrapeConfig::default()
        }
    }

    #[test]
    fn test_scrape_skips_failed_queries_and_writes_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let driver = QueueDriver {
            pages: vec![
                None,
                Some(results_page(&[listing("1", "Kolte Patil"), listing("2", "")])),
            ],
            opened: Cell::new(0),
        };

        let summary = run_scrape(&config, &driver).unwrap();

        assert_eq!(driver.opened.get(), 2);
        assert_eq!(
            summary,
            RunSummary {
                queries: 2,
                skipped: 1,
                written: 1,
                records: 2,
                dropped_listings: 0,
            }
        );
        assert!(!config.working_dir.join("property_data_1.csv").exists());
        assert!(config.working_dir.join("property_data_2.csv").exists());
        assert!(snapshot_path(dir.path().join("snapshots").as_path(), 2).exists());
    }

    #[test]
    fn test_scrape_clears_previous_query_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.working_dir).unwrap();
        write_query_results(&config.working_dir, 1, &[record("old", "1")]).unwrap();
        write_query_results(&config.working_dir, 9, &[record("older", "2")]).unwrap();
        fs::write(config.working_dir.join("notes.csv"), "keep").unwrap();

        let driver = QueueDriver {
            pages: vec![None, Some(results_page(&[listing("5", "Godrej")]))],
            opened: Cell::new(0),
        };
        run_scrape(&config, &driver).unwrap();

        assert!(!config.working_dir.join("property_data_1.csv").exists());
        assert!(!config.working_dir.join("property_data_9.csv").exists());
        assert!(config.working_dir.join("notes.csv").exists());
        assert_eq!(run_aggregate(&config).unwrap(), 1);
    }

    #[test]
    fn test_replay_rebuilds_query_files_from_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let snapshots = dir.path().join("snapshots");
        fs::create_dir_all(&snapshots).unwrap();
        fs::write(snapshot_path(&snapshots, 4), results_page(&[listing("7", "DLF")])).unwrap();
        fs::write(snapshots.join("notes.txt"), "ignored").unwrap();

        let summary = replay_snapshots(&config).unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.records, 1);
        assert!(config.working_dir.join("property_data_4.csv").exists());
    }

    fn record(id: &str, price: &str) -> ListingRecord {
        let mut record = ListingRecord::default();
        record.set(Field::Id, id);
        record.set(Field::Price, price);
        record.set(Field::FloorNum, "Upper Basement");
        record
    }

    #[test]
    fn test_aggregate_dedups_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.working_dir).unwrap();

        write_query_results(
            &config.working_dir,
            1,
            &[record("a", "100"), record("b", "200"), record("c", "300")],
        )
        .unwrap();
        write_query_results(&config.working_dir, 2, &[record("c", "999"), record("d", "400")]).unwrap();

        let rows = run_aggregate(&config).unwrap();
        assert_eq!(rows, 4);

        let mut rdr = csv::Reader::from_path(config.clean_output_path()).unwrap();
        let headers = rdr.headers().unwrap().clone();
        let id = headers.iter().position(|h| h == "id").unwrap();
        let price = headers.iter().position(|h| h == "price").unwrap();
        let floor = headers.iter().position(|h| h == "floor_num").unwrap();
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();

        let ids: Vec<_> = rows.iter().map(|r| r[id].to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(&rows[2][price], "300");
        assert_eq!(&rows[0][floor], "-1.0");
    }

    #[test]
    fn test_aggregate_without_files_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.working_dir).unwrap();

        assert!(run_aggregate(&config).is_err());
        assert!(!config.clean_output_path().exists());
    }

    #[test]
    fn test_scrape_then_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let driver = QueueDriver {
            pages: vec![
                Some(results_page(&[listing("1", "A"), listing("2", "B"), listing("3", "C")])),
                Some(results_page(&[listing("3", "C"), listing("4", "D")])),
            ],
            opened: Cell::new(0),
        };

        run_scrape(&config, &driver).unwrap();
        assert_eq!(run_aggregate(&config).unwrap(), 4);

        let written = fs::read_to_string(config.clean_output_path()).unwrap();
        let first = written.lines().nth(1).unwrap();
        assert!(first.starts_with("1,srp_1,Pune,"));
        assert!(first.contains(",900.0,"));
        assert!(first.contains(",0.0,"));
        assert!(first.contains(",2021-06-15,"));
        assert!(first.ends_with(",4.0"));
    }
}
