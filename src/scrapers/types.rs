use crate::error::GridError;
use serde::{Deserialize, Serialize};

/// Property categories accepted by the portal's `proptype` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCategory {
    #[serde(rename = "Multistorey-Apartment")]
    MultistoreyApartment,
    #[serde(rename = "Builder-Floor-Apartment")]
    BuilderFloorApartment,
    #[serde(rename = "Penthouse")]
    Penthouse,
    #[serde(rename = "Studio-Apartment")]
    StudioApartment,
    #[serde(rename = "Service-Apartment")]
    ServiceApartment,
}

impl PropertyCategory {
    pub const ALL: [PropertyCategory; 5] = [
        PropertyCategory::MultistoreyApartment,
        PropertyCategory::BuilderFloorApartment,
        PropertyCategory::Penthouse,
        PropertyCategory::StudioApartment,
        PropertyCategory::ServiceApartment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyCategory::MultistoreyApartment => "Multistorey-Apartment",
            PropertyCategory::BuilderFloorApartment => "Builder-Floor-Apartment",
            PropertyCategory::Penthouse => "Penthouse",
            PropertyCategory::StudioApartment => "Studio-Apartment",
            PropertyCategory::ServiceApartment => "Service-Apartment",
        }
    }
}

/// Bounds of the search space swept by the query grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// City to search in
    pub city: String,
    /// Smallest bedroom count (inclusive)
    pub min_bedrooms: u8,
    /// Largest bedroom count (inclusive)
    pub max_bedrooms: u8,
    /// Lower end of the monthly budget
    pub budget_min: u64,
    /// Upper end of the monthly budget
    pub budget_max: u64,
    /// Spacing of price points in powers of ten
    pub exponent_step: f64,
    pub property_types: Vec<PropertyCategory>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            city: "Mumbai".to_string(),
            min_bedrooms: 1,
            max_bedrooms: 5,
            budget_min: 1_000,
            budget_max: 1_000_000,
            exponent_step: 0.1,
            property_types: PropertyCategory::ALL.to_vec(),
        }
    }
}

/// One (bedroom count, price band) search
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub bedrooms: u8,
    pub price_min: u64,
    pub price_max: u64,
    pub city: String,
    pub property_types: Vec<PropertyCategory>,
}

impl Query {
    /// Render the search URL against the portal's listing endpoint
    pub fn url(&self, base_url: &str) -> String {
        let proptype = self
            .property_types
            .iter()
            .map(|category| category.as_str())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}?bedroom={}&proptype={}&cityName={}&BudgetMin={}&BudgetMax={}",
            base_url,
            self.bedrooms,
            proptype,
            urlencoding::encode(&self.city),
            self.price_min,
            self.price_max,
        )
    }
}

/// Log-spaced price points covering `[budget_min, budget_max]`.
///
/// Exponents step from log10(min) to log10(max), are rounded to two
/// decimals and turned back into whole amounts. The ends are pinned to the
/// exact bounds so no listing at either edge falls outside the grid.
pub fn price_points(params: &SearchParams) -> Result<Vec<u64>, GridError> {
    if params.budget_min == 0 || params.budget_min >= params.budget_max {
        return Err(GridError::EmptyBudgetRange {
            min: params.budget_min,
            max: params.budget_max,
        });
    }
    if params.exponent_step.is_nan() || params.exponent_step <= 0.0 {
        return Err(GridError::InvalidStep(params.exponent_step));
    }

    let start = (params.budget_min as f64).log10();
    let end = (params.budget_max as f64).log10();
    let steps = ((end - start) / params.exponent_step).round().max(1.0);
    // More steps than whole amounts in the range can only yield duplicates
    if !steps.is_finite() || steps > (params.budget_max - params.budget_min) as f64 {
        return Err(GridError::InvalidStep(params.exponent_step));
    }
    let steps = steps as u64;

    let mut points = Vec::new();
    points.push(params.budget_min);
    for k in 1..steps {
        let exponent = start + k as f64 * params.exponent_step;
        let exponent = (exponent * 100.0).round() / 100.0;
        let point = 10f64.powf(exponent).round() as u64;
        if point > *points.last().unwrap_or(&0) && point < params.budget_max {
            points.push(point);
        }
    }
    points.push(params.budget_max);

    Ok(points)
}

/// Build every query of the grid: bedrooms outer, price bands inner.
///
/// Band `n` spans `points[n] ..= points[n + 1] + 1`, so adjacent bands share
/// their boundary price.
pub fn build_query_grid(params: &SearchParams) -> Result<Vec<Query>, GridError> {
    if params.min_bedrooms == 0 || params.min_bedrooms > params.max_bedrooms {
        return Err(GridError::EmptyBedroomRange {
            min: params.min_bedrooms,
            max: params.max_bedrooms,
        });
    }
    if params.city.trim().is_empty() {
        return Err(GridError::EmptyCity);
    }
    if params.property_types.is_empty() {
        return Err(GridError::NoPropertyTypes);
    }

    let points = price_points(params)?;
    let mut queries = Vec::new();

    for bedrooms in params.min_bedrooms..=params.max_bedrooms {
        for band in points.windows(2) {
            queries.push(Query {
                bedrooms,
                price_min: band[0],
                price_max: band[1] + 1,
                city: params.city.clone(),
                property_types: params.property_types.clone(),
            });
        }
    }

    Ok(queries)
}
