use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named columns of a scraped listing, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    IdString,
    City,
    Locality,
    PosterName,
    Longitude,
    Latitude,
    Title,
    Desc,
    Url,
    Area,
    Trans,
    Furnishing,
    FloorNum,
    UserType,
    BathroomNum,
    BedroomNum,
    DevName,
    Project,
    PostDate,
    #[serde(rename = "type")]
    PropertyType,
    Price,
    FloorCount,
}

impl Field {
    pub const ALL: [Field; 23] = [
        Field::Id,
        Field::IdString,
        Field::City,
        Field::Locality,
        Field::PosterName,
        Field::Longitude,
        Field::Latitude,
        Field::Title,
        Field::Desc,
        Field::Url,
        Field::Area,
        Field::Trans,
        Field::Furnishing,
        Field::FloorNum,
        Field::UserType,
        Field::BathroomNum,
        Field::BedroomNum,
        Field::DevName,
        Field::Project,
        Field::PostDate,
        Field::PropertyType,
        Field::Price,
        Field::FloorCount,
    ];

    /// Column name used in the delimited output files
    pub fn column(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::IdString => "id_string",
            Field::City => "city",
            Field::Locality => "locality",
            Field::PosterName => "poster_name",
            Field::Longitude => "longitude",
            Field::Latitude => "latitude",
            Field::Title => "title",
            Field::Desc => "desc",
            Field::Url => "url",
            Field::Area => "area",
            Field::Trans => "trans",
            Field::Furnishing => "furnishing",
            Field::FloorNum => "floor_num",
            Field::UserType => "user_type",
            Field::BathroomNum => "bathroom_num",
            Field::BedroomNum => "bedroom_num",
            Field::DevName => "dev_name",
            Field::Project => "project",
            Field::PostDate => "post_date",
            Field::PropertyType => "type",
            Field::Price => "price",
            Field::FloorCount => "floor_count",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One scraped listing. A field without an entry is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingRecord {
    values: BTreeMap<Field, String>,
}

impl ListingRecord {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    #[cfg(test)]
    pub fn is_missing(&self, field: Field) -> bool {
        !self.values.contains_key(&field)
    }

    /// Cells in column order, missing fields rendered empty
    pub fn to_row(&self) -> Vec<&str> {
        Field::ALL
            .iter()
            .map(|field| self.get(*field).unwrap_or(""))
            .collect()
    }
}
