use serde::{Deserialize, Serialize};

/// One scraped apartment. The source URL is the unique key; every other
/// scalar stays `None` when the page lacks the element or parsing fails,
/// and `images` stays an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Apartment {
    pub apurl: String,

    pub raw_address: Option<String>,
    pub street: Option<String>,
    pub subdistrict: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub parish: Option<String>,

    pub price: Option<i32>,
    pub price_per_m2: Option<i32>,

    pub images: Vec<String>,

    pub rooms: Option<String>,
    pub bedrooms: Option<String>,
    pub total_area: Option<String>,
    pub floor: Option<String>,
    pub built_year: Option<String>,
    pub cadastre_no: Option<String>,
    pub energy_mark: Option<String>,
    pub utilities_summer: Option<String>,
    pub utilities_winter: Option<String>,
    pub ownership_form: Option<String>,
    pub condition: Option<String>,
}

impl Apartment {
    pub fn new(url: &str) -> Self {
        Self {
            apurl: url.to_string(),
            ..Self::default()
        }
    }
}
