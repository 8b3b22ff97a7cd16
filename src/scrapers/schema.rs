use crate::models::Field;
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the listing identifier in templates
pub const ID_KEY: &str = "{id}";
/// Placeholder substituted with the listing id-string in templates
pub const ID_STRING_KEY: &str = "{id_string}";
/// Placeholder substituted with the `itemprop` name in the meta template
pub const ITEMPROP_KEY: &str = "{itemprop}";

/// Maps one output field to the attribute it is read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrField {
    pub field: Field,
    pub attribute: String,
}

impl AttrField {
    fn new(field: Field, attribute: &str) -> Self {
        Self {
            field,
            attribute: attribute.to_string(),
        }
    }
}

/// Every selector and attribute name the scraper depends on.
///
/// Portal markup drifts between releases. Keeping the whole mapping here
/// means a layout change is a table edit, and it can be overridden from the
/// config file without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSchema {
    pub version: String,
    /// Element whose text holds the advertised number of results
    pub result_count: String,
    /// One element per listing card
    pub card_marker: String,
    pub marker_fields: Vec<AttrField>,
    pub latitude_input: String,
    pub longitude_input: String,
    /// Attribute carrying the coordinate on the geolocation inputs
    pub coordinate_attribute: String,
    /// Second fragment of a listing, looked up document-wide by `{id}`
    pub listing_fragment: String,
    /// Template for `meta[itemprop=...]` lookups inside the listing fragment
    pub meta_selector: String,
    pub meta_attribute: String,
    pub meta_fields: Vec<AttrField>,
    /// Third fragment, looked up inside the listing fragment by `{id_string}`
    pub attribute_fragment: String,
    pub fragment_fields: Vec<AttrField>,
    pub summary_item: String,
    pub summary_title: String,
    pub summary_info: String,
    /// Summary label that marks the floor-count entry
    pub floor_label: String,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self {
            version: "magicbricks-srp-2020".to_string(),
            result_count: "a.active > span".to_string(),
            card_marker: r#"span[class="domcache js-domcache-srpgtm"]"#.to_string(),
            marker_fields: vec![
                AttrField::new(Field::Id, "data-objid"),
                AttrField::new(Field::IdString, "id"),
                AttrField::new(Field::City, "data-cityname"),
                AttrField::new(Field::Locality, "data-objlmtdname"),
                AttrField::new(Field::PosterName, "data-soname"),
            ],
            latitude_input: r#"input[id="pmtLat{id}"]"#.to_string(),
            longitude_input: r#"input[id="pmtLong{id}"]"#.to_string(),
            coordinate_attribute: "value".to_string(),
            listing_fragment: r#"div[data-id="{id}"]"#.to_string(),
            meta_selector: r#"meta[itemprop="{itemprop}"]"#.to_string(),
            meta_attribute: "content".to_string(),
            meta_fields: vec![
                AttrField::new(Field::Title, "name"),
                AttrField::new(Field::Desc, "description"),
                AttrField::new(Field::Url, "url"),
                AttrField::new(Field::Area, "floorSize"),
            ],
            attribute_fragment: r#"span[id="{id_string}"]"#.to_string(),
            fragment_fields: vec![
                AttrField::new(Field::Trans, "data-transactiontype"),
                AttrField::new(Field::Furnishing, "data-furnshingstatus"),
                AttrField::new(Field::FloorNum, "data-floorno"),
                AttrField::new(Field::UserType, "data-usertype"),
                AttrField::new(Field::BathroomNum, "data-bathroom"),
                AttrField::new(Field::BedroomNum, "data-bedroom"),
                AttrField::new(Field::DevName, "data-devname"),
                AttrField::new(Field::Project, "data-projectname"),
                AttrField::new(Field::PostDate, "data-createdate"),
                AttrField::new(Field::PropertyType, "data-propertyval"),
                AttrField::new(Field::Price, "data-price"),
            ],
            summary_item: concat!(
                r#"div[class="m-srp-card__summary js-collapse__content"]"#,
                r#" > div[class="m-srp-card__summary__item"]"#
            )
            .to_string(),
            summary_title: r#"div[class="m-srp-card__summary__title"]"#.to_string(),
            summary_info: r#"div[class="m-srp-card__summary__info"]"#.to_string(),
            floor_label: "FLOOR".to_string(),
        }
    }
}

/// Substitute `key` in a selector template, quoting-safe for attribute values
pub fn fill(template: &str, key: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    template.replace(key, &escaped)
}
