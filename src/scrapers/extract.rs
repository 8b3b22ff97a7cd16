use crate::error::{BrowserError, ListingError, MissingField};
use crate::models::{Field, ListingRecord};
use crate::scrapers::schema::{fill, ExtractionSchema, ID_KEY, ID_STRING_KEY, ITEMPROP_KEY};
use crate::scrapers::traits::{Node, Page};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Records pulled from one page, plus bookkeeping for the run log
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<ListingRecord>,
    pub markers: usize,
    pub dropped: usize,
}

/// Resolves listing fields from a loaded page using an [`ExtractionSchema`]
pub struct ListingExtractor<'s> {
    schema: &'s ExtractionSchema,
}

fn attribute<N: Node>(node: &N, name: &str) -> Result<String, MissingField> {
    node.attribute(name)?
        .ok_or_else(|| MissingField::AttributeAbsent(name.to_string()))
}

impl<'s> ListingExtractor<'s> {
    pub fn new(schema: &'s ExtractionSchema) -> Self {
        Self { schema }
    }

    /// Extract every listing card on the page.
    ///
    /// A listing whose anchor fragments cannot be found is dropped with a
    /// warning; the remaining cards are unaffected.
    pub fn extract<P: Page>(&self, page: &P) -> Extraction {
        let started = Instant::now();

        let markers = match page.find_elements(&self.schema.card_marker) {
            Ok(markers) => markers,
            Err(e) => {
                warn!(error = %e, "could not locate listing cards");
                Vec::new()
            }
        };
        info!(
            markers = markers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "results located"
        );

        let mut extraction = Extraction {
            records: Vec::with_capacity(markers.len()),
            markers: markers.len(),
            dropped: 0,
        };

        for (idx, marker) in markers.iter().enumerate() {
            if idx % 20 == 0 {
                debug!(
                    idx,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "results scraped"
                );
            }

            match self.extract_listing(page, marker) {
                Ok(record) => extraction.records.push(record),
                Err(e) => {
                    warn!(idx, error = %e, "dropping listing");
                    extraction.dropped += 1;
                }
            }
        }

        extraction
    }

    fn extract_listing<P: Page>(
        &self,
        page: &P,
        marker: &P::Element<'_>,
    ) -> Result<ListingRecord, ListingError> {
        let schema = self.schema;
        let mut record = ListingRecord::default();

        for attr in &schema.marker_fields {
            resolve(&mut record, attr.field, attribute(marker, &attr.attribute));
        }
        let id = record.get(Field::Id).map(str::to_string);
        let id_string = record.get(Field::IdString).map(str::to_string);

        resolve(
            &mut record,
            Field::Longitude,
            self.keyed_value(page, &schema.longitude_input, id.as_deref()),
        );
        resolve(
            &mut record,
            Field::Latitude,
            self.keyed_value(page, &schema.latitude_input, id.as_deref()),
        );

        let listing = match &id {
            Some(id) => page
                .find_element(&fill(&schema.listing_fragment, ID_KEY, id))
                .map_err(|source| ListingError::ListingFragment {
                    id: Some(id.clone()),
                    source,
                })?,
            None => {
                return Err(ListingError::ListingFragment {
                    id: None,
                    source: BrowserError::NotFound {
                        selector: schema.listing_fragment.clone(),
                    },
                })
            }
        };

        for attr in &schema.meta_fields {
            let selector = fill(&schema.meta_selector, ITEMPROP_KEY, &attr.attribute);
            let value = listing
                .find_element(&selector)
                .map_err(MissingField::from)
                .and_then(|meta| attribute(&meta, &schema.meta_attribute));
            resolve(&mut record, attr.field, value);
        }

        let fragment = match &id_string {
            Some(id_string) => listing
                .find_element(&fill(&schema.attribute_fragment, ID_STRING_KEY, id_string))
                .map_err(|source| ListingError::AttributeFragment {
                    id_string: Some(id_string.clone()),
                    source,
                })?,
            None => {
                return Err(ListingError::AttributeFragment {
                    id_string: None,
                    source: BrowserError::NotFound {
                        selector: schema.attribute_fragment.clone(),
                    },
                })
            }
        };

        for attr in &schema.fragment_fields {
            resolve(&mut record, attr.field, attribute(&fragment, &attr.attribute));
        }

        resolve(&mut record, Field::FloorCount, self.floor_count(&listing));

        Ok(record)
    }

    /// Value of an input element located by the listing identifier
    fn keyed_value<P: Page>(
        &self,
        page: &P,
        template: &str,
        id: Option<&str>,
    ) -> Result<String, MissingField> {
        let id = id.ok_or(MissingField::NoKey("id"))?;
        let input = page.find_element(&fill(template, ID_KEY, id))?;
        attribute(&input, &self.schema.coordinate_attribute)
    }

    /// Floor description, only when the summary item is labelled as the floor entry
    fn floor_count<N: Node>(&self, listing: &N) -> Result<String, MissingField> {
        let item = listing.find_element(&self.schema.summary_item)?;
        let title = item
            .find_element(&self.schema.summary_title)?
            .text()?
            .unwrap_or_default();

        if title != self.schema.floor_label {
            return Err(MissingField::LabelMismatch(title));
        }

        item.find_element(&self.schema.summary_info)?
            .text()?
            .ok_or(MissingField::NoText)
    }
}

/// Merge one field outcome into the record; failures leave the field missing
fn resolve(record: &mut ListingRecord, field: Field, value: Result<String, MissingField>) {
    match value {
        Ok(value) => record.set(field, value),
        Err(reason) => debug!(field = %field, reason = %reason, "field missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::snapshot::HtmlPage;

    fn card(id: &str, fragment_attrs: &str, summary: &str) -> String {
        format!(
            r#"
            <span class="domcache js-domcache-srpgtm" data-objid="{id}" id="domcache_srp_{id}"
                  data-cityname="Mumbai" data-objlmtdname="Andheri West" data-soname="Ravi Estates"></span>
            <input type="hidden" id="pmtLat{id}" value="19.1364">
            <input type="hidden" id="pmtLong{id}" value="72.8296">
            <div class="m-srp-card" data-id="{id}">
                <meta itemprop="name" content="2 BHK Flat for rent in Andheri West">
                <meta itemprop="description" content="Semi furnished flat near metro">
                <meta itemprop="url" content="https://www.magicbricks.com/propertyDetails/{id}">
                <meta itemprop="floorSize" content="650 sqft">
                <span id="domcache_srp_{id}" {fragment_attrs}></span>
                <div class="m-srp-card__summary js-collapse__content">
                    <div class="m-srp-card__summary__item">{summary}</div>
                </div>
            </div>
            "#
        )
    }

    const FULL_ATTRS: &str = r#"data-transactiontype="Rent" data-furnshingstatus="Semi-Furnished"
        data-floorno="3" data-usertype="Agent" data-bathroom="2" data-bedroom="2"
        data-devname="Lodha Group" data-projectname="Lodha Bellissimo" data-createdate="20210615"
        data-propertyval="Multistorey Apartment" data-price="45000""#;

    const FLOOR_SUMMARY: &str = r#"
        <div class="m-srp-card__summary__title">FLOOR</div>
        <div class="m-srp-card__summary__info">3 out of 12 Floors</div>"#;

    fn extract(body: &str) -> Extraction {
        let schema = ExtractionSchema::default();
        let page = HtmlPage::parse(&format!("<html><body>{}</body></html>", body));
        ListingExtractor::new(&schema).extract(&page)
    }

    #[test]
    fn test_full_listing_populates_every_field() {
        let extraction = extract(&card("101", FULL_ATTRS, FLOOR_SUMMARY));

        assert_eq!(extraction.markers, 1);
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        for field in Field::ALL {
            assert!(!record.is_missing(field), "{} should be present", field);
        }
        assert_eq!(record.get(Field::Id), Some("101"));
        assert_eq!(record.get(Field::IdString), Some("domcache_srp_101"));
        assert_eq!(record.get(Field::Latitude), Some("19.1364"));
        assert_eq!(record.get(Field::Longitude), Some("72.8296"));
        assert_eq!(record.get(Field::Area), Some("650 sqft"));
        assert_eq!(record.get(Field::Price), Some("45000"));
        assert_eq!(record.get(Field::FloorCount), Some("3 out of 12 Floors"));
    }

    #[test]
    fn test_missing_attribute_only_affects_its_field() {
        let attrs = FULL_ATTRS.replace(r#"data-devname="Lodha Group""#, "");
        let extraction = extract(&card("102", &attrs, FLOOR_SUMMARY));

        let record = &extraction.records[0];
        assert!(record.is_missing(Field::DevName));
        for field in Field::ALL.into_iter().filter(|f| *f != Field::DevName) {
            assert!(!record.is_missing(field), "{} should be present", field);
        }
    }

    #[test]
    fn test_listing_without_fragment_is_isolated() {
        let orphan = r#"<span class="domcache js-domcache-srpgtm" data-objid="900" id="domcache_srp_900"></span>"#;
        let body = format!(
            "{}{}{}",
            card("201", FULL_ATTRS, FLOOR_SUMMARY),
            orphan,
            card("202", FULL_ATTRS, FLOOR_SUMMARY)
        );
        let extraction = extract(&body);

        assert_eq!(extraction.markers, 3);
        assert_eq!(extraction.dropped, 1);
        let ids: Vec<_> = extraction.records.iter().map(|r| r.get(Field::Id)).collect();
        assert_eq!(ids, vec![Some("201"), Some("202")]);
    }

    #[test]
    fn test_missing_attribute_fragment_drops_listing() {
        let html = card("301", FULL_ATTRS, FLOOR_SUMMARY)
            .replace(r#"<span id="domcache_srp_301""#, r#"<span id="other""#);
        let extraction = extract(&html);

        assert_eq!(extraction.records.len(), 0);
        assert_eq!(extraction.dropped, 1);
    }

    #[test]
    fn test_geolocation_failure_keeps_record() {
        let html = card("401", FULL_ATTRS, FLOOR_SUMMARY)
            .replace("pmtLat401", "pmtLatX")
            .replace("pmtLong401", "pmtLongX");
        let extraction = extract(&html);

        let record = &extraction.records[0];
        assert!(record.is_missing(Field::Latitude));
        assert!(record.is_missing(Field::Longitude));
        assert_eq!(record.get(Field::Title), Some("2 BHK Flat for rent in Andheri West"));
    }

    #[test]
    fn test_floor_count_requires_floor_label() {
        let other_summary = r#"
            <div class="m-srp-card__summary__title">CARPET AREA</div>
            <div class="m-srp-card__summary__info">600 sqft</div>"#;
        let extraction = extract(&card("501", FULL_ATTRS, other_summary));
        assert!(extraction.records[0].is_missing(Field::FloorCount));

        let extraction = extract(&card("502", FULL_ATTRS, ""));
        assert_eq!(extraction.records.len(), 1);
        assert!(extraction.records[0].is_missing(Field::FloorCount));
    }

    #[test]
    fn test_page_without_cards_yields_nothing() {
        let extraction = extract("<div>No properties found</div>");
        assert_eq!(extraction.markers, 0);
        assert!(extraction.records.is_empty());
    }
}
