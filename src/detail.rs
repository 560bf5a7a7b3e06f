//! Detail-page fetching and the write-once photo cache.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use scraper::Html;
use std::fs;
use std::path::PathBuf;
use url::Url;

use crate::extract::{self, Extras};

/// Fields sourced from one detail page. All-empty when the fetch fails.
#[derive(Debug, Clone, Default)]
pub struct DetailFields {
    pub adresse: String,
    pub photo: String,
    pub date_visite: String,
    pub date_vente: String,
    pub latitude: String,
    pub longitude: String,
    pub texte: String,
    pub extras: Extras,
}

pub struct DetailFetcher {
    client: Client,
    pictures_dir: PathBuf,
}

impl DetailFetcher {
    pub fn new(client: Client, pictures_dir: PathBuf) -> Self {
        Self {
            client,
            pictures_dir,
        }
    }

    /// Fetch and extract one detail page. Failures are logged and produce an
    /// all-empty result; a bad detail page never aborts the crawl.
    pub fn fetch(&self, detail_url: &str) -> DetailFields {
        match self.try_fetch(detail_url) {
            Ok(fields) => fields,
            Err(e) => {
                eprintln!("Error on detail page {}: {}", detail_url, e);
                DetailFields::default()
            }
        }
    }

    fn try_fetch(&self, detail_url: &str) -> Result<DetailFields> {
        let body = self
            .client
            .get(detail_url)
            .send()
            .with_context(|| format!("Failed to fetch: {}", detail_url))?
            .error_for_status()?
            .text()
            .with_context(|| format!("Failed to read response: {}", detail_url))?;
        let doc = Html::parse_document(&body);

        let adresse = extract::first_text(&doc, ".Street");

        let photo = match extract::first_attr(&doc, ".MainPhoto img", "src") {
            Some(src) => self.cache_photo(detail_url, &src),
            None => String::new(),
        };

        let date_visite = extract::find_text_containing(&doc, "Visite").unwrap_or_default();
        let date_vente = extract::first_text(&doc, ".Date");
        let (latitude, longitude) = extract::extract_coords(&doc, &body);
        let texte = extract::extract_full_text(&doc);
        let extras = extract::extract_extras(&doc, &body, detail_url);

        Ok(DetailFields {
            adresse,
            photo,
            date_visite,
            date_vente,
            latitude,
            longitude,
            texte,
            extras,
        })
    }

    /// Cache the listing photo locally, downloading only when the file is
    /// not already present. On failure the raw remote URL stands in.
    fn cache_photo(&self, detail_url: &str, photo_src: &str) -> String {
        match self.try_cache_photo(detail_url, photo_src) {
            Ok(local) => local,
            Err(e) => {
                eprintln!("Error downloading photo {}: {}", photo_src, e);
                photo_src.to_string()
            }
        }
    }

    fn try_cache_photo(&self, detail_url: &str, photo_src: &str) -> Result<String> {
        let photo_url = resolve_photo_url(detail_url, photo_src)?;
        let filename = photo_filename(&photo_url)?;
        fs::create_dir_all(&self.pictures_dir)?;
        let local_path = self.pictures_dir.join(&filename);
        if !local_path.exists() {
            let bytes = self
                .client
                .get(photo_url.as_str())
                .send()
                .with_context(|| format!("Failed to fetch photo: {}", photo_url))?
                .error_for_status()?
                .bytes()
                .with_context(|| format!("Failed to read photo: {}", photo_url))?;
            fs::write(&local_path, &bytes)?;
        }
        Ok(local_path.to_string_lossy().to_string())
    }
}

/// Photo srcs are often relative; resolve against the detail page URL.
fn resolve_photo_url(detail_url: &str, photo_src: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(photo_src) {
        return Ok(absolute);
    }
    let base = Url::parse(detail_url)
        .with_context(|| format!("Invalid detail URL: {}", detail_url))?;
    base.join(photo_src)
        .with_context(|| format!("Invalid photo src: {}", photo_src))
}

/// Cache filename: the basename of the remote URL path.
fn photo_filename(photo_url: &Url) -> Result<String> {
    let name = photo_url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    if name.is_empty() {
        bail!("Photo URL has no file name: {}", photo_url);
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("licitor_detail_{}_{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_photo_filename_from_path() {
        let url = Url::parse("https://cdn.example.com/photos/2024/abc123.jpg?w=800").unwrap();
        assert_eq!(photo_filename(&url).unwrap(), "abc123.jpg");
    }

    #[test]
    fn test_photo_filename_rejects_bare_host() {
        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert!(photo_filename(&url).is_err());
    }

    #[test]
    fn test_resolve_relative_photo_src() {
        let resolved = resolve_photo_url(
            "https://www.licitor.com/annonce/123456.html",
            "/photos/abc.jpg",
        )
        .unwrap();
        assert_eq!(resolved.as_str(), "https://www.licitor.com/photos/abc.jpg");
    }

    #[test]
    fn test_cached_photo_skips_download() {
        let dir = scratch_dir("cache_skip");
        let existing = dir.join("abc.jpg");
        fs::write(&existing, b"cached bytes").unwrap();

        // The host is unreachable; a hit on the network would fail the test.
        let fetcher = DetailFetcher::new(Client::new(), dir.clone());
        let local = fetcher
            .try_cache_photo("https://invalid.invalid/1.html", "https://invalid.invalid/photos/abc.jpg")
            .unwrap();
        assert_eq!(local, existing.to_string_lossy());
        assert_eq!(fs::read(&existing).unwrap(), b"cached bytes");

        fs::remove_dir_all(&dir).unwrap();
    }
}
