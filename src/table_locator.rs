//! Ways of finding the observation table on a history page.
//!
//! Each locator returns candidate tables in the order they should be tried.
//! [`default_locators`] lists them from most to least specific; the day
//! fetcher walks that list and stops at the first table that yields rows.

use crate::errors::ScraperError;
use scraper::{ElementRef, Html, Selector};

const OBSERVATIONS_HEADING: &str = "Daily Observations";
const TEMPERATURE_LABEL: &str = "Temperature";
const TIME_LABEL: &str = "Time";

pub trait TableLocator: Send + Sync {
    fn name(&self) -> &'static str;

    fn candidates<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>, ScraperError>;
}

fn selector(css: &str) -> Result<Selector, ScraperError> {
    Selector::parse(css).map_err(|err| ScraperError::SelectorError(err.to_string()))
}

fn own_text_contains(element: ElementRef<'_>, needle: &str) -> bool {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .any(|text| text.contains(needle))
}

/// First table after the "Daily Observations" heading, in document order.
pub struct ObservationsHeadingLocator;

impl TableLocator for ObservationsHeadingLocator {
    fn name(&self) -> &'static str {
        "daily observations heading"
    }

    fn candidates<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>, ScraperError> {
        let everything = selector("*")?;
        let elements: Vec<ElementRef<'a>> = document.select(&everything).collect();

        let Some(position) = elements
            .iter()
            .position(|element| own_text_contains(*element, OBSERVATIONS_HEADING))
        else {
            return Ok(vec![]);
        };
        let heading = *elements[position];

        // Tables nested inside the heading itself don't follow it.
        let table = elements[position + 1..].iter().copied().find(|element| {
            element.value().name() == "table"
                && !element.ancestors().any(|ancestor| ancestor == heading)
        });

        Ok(table.into_iter().collect())
    }
}

/// Table owning a `<th>` that mentions temperature.
pub struct TemperatureHeaderLocator;

impl TableLocator for TemperatureHeaderLocator {
    fn name(&self) -> &'static str {
        "temperature column header"
    }

    fn candidates<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>, ScraperError> {
        let header_selector = selector("th")?;

        let table = document
            .select(&header_selector)
            .find(|header| header.text().any(|text| text.contains(TEMPERATURE_LABEL)))
            .and_then(|header| {
                header
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|ancestor| ancestor.value().name() == "table")
            });

        Ok(table.into_iter().collect())
    }
}

/// Every table whose markup mentions temperature or time.
pub struct AnyTableLocator;

impl TableLocator for AnyTableLocator {
    fn name(&self) -> &'static str {
        "any weather table"
    }

    fn candidates<'a>(&self, document: &'a Html) -> Result<Vec<ElementRef<'a>>, ScraperError> {
        let table_selector = selector("table")?;

        let tables = document
            .select(&table_selector)
            .filter(|table| {
                let markup = table.html();
                markup.contains(TEMPERATURE_LABEL) || markup.contains(TIME_LABEL)
            })
            .collect();

        Ok(tables)
    }
}

pub fn default_locators() -> Vec<Box<dyn TableLocator>> {
    vec![
        Box::new(ObservationsHeadingLocator),
        Box::new(TemperatureHeaderLocator),
        Box::new(AnyTableLocator),
    ]
}
