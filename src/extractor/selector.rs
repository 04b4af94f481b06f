use scraper::{ElementRef, Html, Selector};

use crate::app::{PriceScanError, Result as AppResult};
use crate::domain::{RawListing, SelectorSet};
use crate::extractor::{ExtractError, Extractor};

/// Generic CSS-selector-driven extractor.
///
/// One instance per source, configured with that source's
/// [`SelectorSet`]. Selectors are compiled once at construction so a
/// typo in the config surfaces at startup, not mid-run.
pub struct SelectorExtractor {
    item: Selector,
    name: Selector,
    price: Selector,
    image: Option<Selector>,
}

impl SelectorExtractor {
    pub fn from_config(selectors: &SelectorSet) -> AppResult<Self> {
        Ok(Self {
            item: compile(&selectors.item)?,
            name: compile(&selectors.name)?,
            price: compile(&selectors.price)?,
            image: selectors.image.as_deref().map(compile).transpose()?,
        })
    }

    fn listing_from(&self, element: ElementRef<'_>) -> Option<RawListing> {
        let name = element.select(&self.name).next().map(element_text)?;
        let price_text = element.select(&self.price).next().map(element_text)?;

        let image_url = self
            .image
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .and_then(|img| img.value().attr("src"))
            .map(String::from);

        Some(RawListing {
            name,
            price_text,
            image_url,
        })
    }
}

fn compile(selector: &str) -> AppResult<Selector> {
    Selector::parse(selector).map_err(|_| PriceScanError::InvalidSelector(selector.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

impl Extractor for SelectorExtractor {
    fn extract(&self, content: &[u8]) -> Result<Vec<RawListing>, ExtractError> {
        let html = String::from_utf8_lossy(content);
        let document = Html::parse_document(&html);

        let blocks: Vec<_> = document.select(&self.item).collect();
        if blocks.is_empty() {
            return Err(ExtractError::EmptyResult);
        }

        let listings: Vec<RawListing> = blocks
            .into_iter()
            .filter_map(|block| self.listing_from(block))
            .collect();

        if listings.is_empty() {
            return Err(ExtractError::MalformedDocument(
                "listing blocks matched but none contained a name and a price".to_string(),
            ));
        }

        Ok(listings)
    }
}
