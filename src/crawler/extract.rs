//! Location rules for the kv.ee pages and the field extraction built on
//! top of them. Extraction never fails a listing: a field that cannot be
//! parsed is logged and left unset.

use scraper::Html;
use tracing::{debug, error};

use crate::crawler::models::Apartment;
use crate::crawler::parser::{select_attrs, select_texts};

// Listing page rules
pub const APARTMENT_LINKS: &str = "div.object-list h2.object-title a";
pub const NEXT_PAGE: &str = "ul.pagination a.next";

// Detail page rules
const ADDRESS: &str = "h1.object-address";
const PRICE: &str = "div.object-price strong.price";
const PRICE_PER_M2: &str = "div.object-price span.price-per-m2";
const IMAGES: &str = "div.object-gallery img";
const ROOMS: &str = "table.object-data tr.rooms td";
const BEDROOMS: &str = "table.object-data tr.bedrooms td";
const TOTAL_AREA: &str = "table.object-data tr.total-area td";
const FLOOR: &str = "table.object-data tr.floor td";
const BUILT_YEAR: &str = "table.object-data tr.built-year td";
const CADASTRE_NO: &str = "table.object-data tr.cadastre-number td";
const ENERGY_MARK: &str = "table.object-data tr.energy-mark td";
const UTILITIES_SUMMER: &str = "table.object-data tr.utilities-summer td";
const UTILITIES_WINTER: &str = "table.object-data tr.utilities-winter td";
const OWNERSHIP_FORM: &str = "table.object-data tr.ownership-form td";
const CONDITION: &str = "table.object-data tr.condition td";

/// What the orchestrator needs from one search-results page: the apartment
/// links in document order and the pointer to the following page, if any.
pub struct ListingPage {
    pub apartment_urls: Vec<String>,
    pub next_page: Option<String>,
}

pub fn extract_listing(doc: &Html) -> ListingPage {
    let apartment_urls = select_attrs(doc, APARTMENT_LINKS, "href").unwrap_or_default();
    let next_page = select_attrs(doc, NEXT_PAGE, "href").map(|mut links| links.remove(0));
    ListingPage {
        apartment_urls,
        next_page,
    }
}

pub fn extract_apartment(doc: &Html, url: &str) -> Apartment {
    let mut apartment = Apartment::new(url);

    parse_address(doc, &mut apartment);
    apartment.price = parse_price(doc, PRICE, "€", "price");
    apartment.price_per_m2 = parse_price(doc, PRICE_PER_M2, "€/m²", "price_per_m2");
    apartment.images = select_attrs(doc, IMAGES, "src").unwrap_or_default();
    parse_table_fields(doc, &mut apartment);

    apartment
}

// Titles read "Apartment for sale - street, district, city, parish", with an
// occasional subdistrict between street and district. Anything else keeps
// only the raw address.
fn parse_address(doc: &Html, apartment: &mut Apartment) {
    let Some(matches) = select_texts(doc, ADDRESS) else {
        debug!("Address not found, all address fields stay unset");
        return;
    };

    let title = &matches[0];
    let title_parts: Vec<&str> = title.split(" - ").collect();
    if title_parts.len() < 2 {
        error!(%title, "Unexpected address format, expected a two-part title");
        return;
    }

    let full_address = title_parts[1];
    apartment.raw_address = Some(full_address.to_string());

    let pieces: Vec<String> = full_address
        .split(',')
        .map(|piece| piece.trim().to_string())
        .collect();

    match pieces.len() {
        4 => {
            let mut it = pieces.into_iter();
            apartment.street = it.next();
            apartment.district = it.next();
            apartment.city = it.next();
            apartment.parish = it.next();
        }
        5 => {
            let mut it = pieces.into_iter();
            apartment.street = it.next();
            apartment.subdistrict = it.next();
            apartment.district = it.next();
            apartment.city = it.next();
            apartment.parish = it.next();
        }
        parts => {
            debug!(parts, "Address has an unexpected part count, keeping raw address only");
        }
    }
}

fn parse_price(doc: &Html, rule: &str, suffix: &str, field: &str) -> Option<i32> {
    let matches = select_texts(doc, rule)?;
    let cleaned = matches[0].replace('\u{a0}', "").replace(suffix, "");
    match cleaned.trim().parse::<i32>() {
        Ok(value) => Some(value),
        Err(e) => {
            error!(field, value = %matches[0], error = %e, "Price field did not parse");
            None
        }
    }
}

fn parse_table_fields(doc: &Html, apartment: &mut Apartment) {
    apartment.rooms = joined(doc, ROOMS, "rooms");
    apartment.bedrooms = joined(doc, BEDROOMS, "bedrooms");
    apartment.total_area = stripped(doc, TOTAL_AREA, "m²", "total_area");
    apartment.floor = joined(doc, FLOOR, "floor");
    apartment.built_year = joined(doc, BUILT_YEAR, "built_year");
    apartment.cadastre_no = joined(doc, CADASTRE_NO, "cadastre_no");
    apartment.energy_mark = joined(doc, ENERGY_MARK, "energy_mark");
    apartment.utilities_summer = stripped(doc, UTILITIES_SUMMER, "€", "utilities_summer");
    apartment.utilities_winter = stripped(doc, UTILITIES_WINTER, "€", "utilities_winter");
    apartment.ownership_form = joined(doc, OWNERSHIP_FORM, "ownership_form");
    apartment.condition = joined(doc, CONDITION, "condition");
}

fn joined(doc: &Html, rule: &str, field: &str) -> Option<String> {
    match select_texts(doc, rule) {
        Some(values) => Some(values.join(", ")),
        None => {
            debug!(field, "Field not found");
            None
        }
    }
}

fn stripped(doc: &Html, rule: &str, suffix: &str, field: &str) -> Option<String> {
    match select_texts(doc, rule) {
        Some(values) => Some(values[0].replace(suffix, "").trim().to_string()),
        None => {
            debug!(field, "Field not found");
            None
        }
    }
}
