//! Index-page crawl: page loop, card parsing, record composition.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use scraper::{ElementRef, Html};
use std::time::Duration;

use crate::detail::DetailFetcher;
use crate::extract::{self, element_text};
use crate::record::Listing;

const CARD_SELECTOR: &str = "ul.AdResults > li";

/// Summary fields lifted from one listing card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardSummary {
    pub ville: String,
    pub description: String,
    pub texte: String,
    pub mise_a_prix: String,
    pub detail_href: Option<String>,
}

pub fn card_summary(card: ElementRef) -> CardSummary {
    let field = |css: &str| {
        card.select(&extract::selector(css))
            .next()
            .map(element_text)
            .unwrap_or_default()
    };
    let detail_href = card
        .select(&extract::selector("a.Ad"))
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);
    CardSummary {
        ville: field(".City"),
        description: field(".Name"),
        texte: field(".Text"),
        mise_a_prix: field(".PriceNumber"),
        detail_href,
    }
}

pub struct Crawler {
    client: Client,
    fetcher: DetailFetcher,
    base_url: String,
    site_root: String,
    page_delay: Duration,
    quiet: bool,
}

impl Crawler {
    pub fn new(
        client: Client,
        fetcher: DetailFetcher,
        base_url: String,
        site_root: String,
        page_delay: Duration,
        quiet: bool,
    ) -> Self {
        Self {
            client,
            fetcher,
            base_url,
            site_root,
            page_delay,
            quiet,
        }
    }

    /// Crawl pages 1..=max_page sequentially. Page failures are logged and
    /// skipped; `cancelled` is polled once per page and stops further pages
    /// without discarding what was already collected.
    pub fn crawl(&self, max_page: usize, cancelled: &dyn Fn() -> bool) -> Vec<Listing> {
        let mut items = Vec::new();
        for page in 1..=max_page {
            if cancelled() {
                println!("Crawl interrupted; keeping {} listings collected so far.", items.len());
                break;
            }
            let url = self.base_url.replace("{page}", &page.to_string());
            if !self.quiet {
                println!("Scraping page {}: {}", page, url);
            }
            let body = match self.fetch_page(&url) {
                Ok(body) => body,
                Err(e) => {
                    eprintln!("Error fetching page {}: {}", page, e);
                    continue;
                }
            };
            let doc = Html::parse_document(&body);
            let mut card_count = 0usize;
            for card in doc.select(&extract::selector(CARD_SELECTOR)) {
                items.push(self.compose(card_summary(card)));
                card_count += 1;
            }
            if !self.quiet {
                println!("Page {} done, {} listings found.", page, card_count);
            }
            // Fixed pacing against the origin server
            std::thread::sleep(self.page_delay);
        }
        items
    }

    fn fetch_page(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch: {}", url))?
            .error_for_status()?
            .text()
            .with_context(|| format!("Failed to read response: {}", url))
    }

    /// One record per card. Cards without a detail link are kept with empty
    /// detail-derived fields; the merge fallback key still dedupes them.
    fn compose(&self, summary: CardSummary) -> Listing {
        let (detail, lien) = match &summary.detail_href {
            Some(href) => {
                let detail_url = if href.starts_with("http") {
                    href.clone()
                } else {
                    format!("{}{}", self.site_root, href)
                };
                (self.fetcher.fetch(&detail_url), detail_url)
            }
            None => (Default::default(), String::new()),
        };
        let texte = if detail.texte.is_empty() {
            summary.texte
        } else {
            detail.texte
        };
        Listing {
            ville: summary.ville,
            description: summary.description,
            texte,
            mise_a_prix: summary.mise_a_prix,
            adresse: detail.adresse,
            photo: detail.photo,
            date_visite: detail.date_visite,
            date_vente: detail.date_vente,
            latitude: detail.latitude,
            longitude: detail.longitude,
            additional_text: detail.extras.additional_text,
            court: detail.extras.court,
            sous_lot: detail.extras.sous_lot,
            first_sous_lot: detail.extras.first_sous_lot,
            trusts: detail.extras.trusts,
            number: detail.extras.number,
            lien,
        }
    }
}
