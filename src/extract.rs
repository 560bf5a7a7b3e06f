//! Detail-page field extraction.
//!
//! Every field is extracted through an ordered cascade of strategies; the
//! first one that yields a non-empty value wins and a full miss resolves to
//! an empty string, never an error.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static GEO_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)"geo"\s*:\s*\{[^}]*?"latitude"\s*:\s*(-?[\d.]+)[^}]*?"longitude"\s*:\s*(-?[\d.]+)"#,
    )
    .expect("valid regex")
});

static AT_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\s*(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").expect("valid regex")
});

static COORD_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").expect("valid regex")
});

static SET_VIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"setView\(\s*\[\s*(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)\s*\]")
        .expect("valid regex")
});

static LATLNG_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LatLng\(\s*(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)\s*\)").expect("valid regex")
});

static SOUS_LOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Sous\s*-?lot\s*:?\s*([^\n\r<]+)").expect("valid regex"));

static LISTING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)\.html(?:$|\?)").expect("valid regex"));

static TRAILING_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));

static MULTI_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Hosts whose link/iframe URLs are worth mining for coordinates.
const MAP_HOSTS: &[&str] = &[
    "google.com/maps",
    "maps.google.",
    "openstreetmap.org",
    "osm.org",
];

/// Content-block selectors tried for the full description, in priority order.
const TEXT_SELECTORS: &[&str] = &[
    ".Text",
    ".Description",
    ".Resume",
    ".AdText",
    ".MainText",
    ".ContentText",
    ".texte",
    ".description",
    ".Designation",
    ".Consistance",
];

const ADDITIONAL_SELECTORS: &[&str] = &[
    ".AdditionalText",
    ".Additional",
    ".Complement",
    ".Compl",
    ".ComplementText",
    ".TextAdd",
];

const SOUS_LOT_SELECTOR: &str = ".SousLot, .SubLot, .Lot, .Lots .Lot";

const TRUSTS_SELECTOR: &str =
    ".Trusts, .Trust, .Avocat, .Avocats, .Lawyer, .Lawyers, .Cabinet, .Regisseur, .Regisseurs";

/// Keywords whose surrounding line names a trustee when no selector hits.
/// "Ferrari" is a recurring trustee firm on the site.
const TRUSTEE_KEYWORDS: &[&str] = &["Maître", "Ferrari"];

/// Minimum length for a `<p>` block to count in the description fallback.
const PARAGRAPH_MIN_LEN: usize = 50;

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Text of the first element matching `css`, or empty.
pub fn first_text(doc: &Html, css: &str) -> String {
    doc.select(&selector(css))
        .next()
        .map(element_text)
        .unwrap_or_default()
}

/// Attribute of the first element matching `css`, if present.
pub fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    doc.select(&selector(css))
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// All text under an element, whitespace-collapsed and joined with spaces.
pub fn element_text(el: ElementRef) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    let mut cleaned = String::new();
    let mut prev_was_space = false;
    for c in joined.chars() {
        if c.is_whitespace() {
            if !prev_was_space && !cleaned.is_empty() {
                cleaned.push(' ');
                prev_was_space = true;
            }
        } else {
            cleaned.push(c);
            prev_was_space = false;
        }
    }
    cleaned.trim().to_string()
}

/// Text under an element with each text node on its own line.
fn block_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First selector in `selectors` whose first match has non-empty text.
fn select_first_text(doc: &Html, selectors: &[&str]) -> String {
    for css in selectors {
        if let Some(el) = doc.select(&selector(css)).next() {
            let text = element_text(el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// First text node containing `needle`, trimmed.
pub fn find_text_containing(doc: &Html, needle: &str) -> Option<String> {
    for node in doc.tree.nodes() {
        if let Node::Text(text) = node.value() {
            if text.contains(needle) {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

/// Parent elements of every text node containing one of `needles`, in
/// document order.
fn parents_of_text_containing<'a>(doc: &'a Html, needles: &[&str]) -> Vec<ElementRef<'a>> {
    let mut parents = Vec::new();
    for node in doc.tree.nodes() {
        if let Node::Text(text) = node.value() {
            if needles.iter().any(|needle| text.contains(needle)) {
                if let Some(parent) = node.parent().and_then(ElementRef::wrap) {
                    parents.push(parent);
                }
            }
        }
    }
    parents
}

/// Format a raw coordinate to six decimal places; reject unparseable values.
fn format_coord(raw: &str) -> Option<String> {
    raw.trim().parse::<f64>().ok().map(|v| format!("{:.6}", v))
}

fn coord_pair(lat: &str, lng: &str) -> Option<(String, String)> {
    Some((format_coord(lat)?, format_coord(lng)?))
}

type CoordStrategy = fn(&Html, &str) -> Option<(String, String)>;

/// Ordered coordinate sources; the first hit wins.
const COORD_STRATEGIES: &[CoordStrategy] = &[
    geo_metadata_coords,
    map_link_coords,
    leaflet_coords,
    gmaps_call_coords,
    data_attribute_coords,
];

/// Embedded JSON-LD `"geo"` block.
fn geo_metadata_coords(_doc: &Html, html: &str) -> Option<(String, String)> {
    let caps = GEO_BLOCK_RE.captures(html)?;
    coord_pair(&caps[1], &caps[2])
}

/// Google Maps / OpenStreetMap links and iframes: `@lat,lng` path segments,
/// then `q`/`ll`/`center` query values, then OSM-style query pairs.
fn map_link_coords(doc: &Html, _html: &str) -> Option<(String, String)> {
    for el in doc.select(&selector("iframe, a")) {
        let src = match el.value().attr("src").or_else(|| el.value().attr("href")) {
            Some(s) => s,
            None => continue,
        };
        let lower = src.to_lowercase();
        if !MAP_HOSTS.iter().any(|host| lower.contains(host)) {
            continue;
        }
        if let Some(caps) = AT_PAIR_RE.captures(src) {
            if let Some(pair) = coord_pair(&caps[1], &caps[2]) {
                return Some(pair);
            }
        }
        // Protocol-relative iframe srcs won't parse bare
        let parsed = Url::parse(src)
            .or_else(|_| Url::parse(&format!("https:{}", src)))
            .ok();
        let Some(parsed) = parsed else { continue };
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for key in ["q", "ll", "center"] {
            if let Some((_, value)) = pairs.iter().find(|(k, _)| k == key) {
                if let Some(caps) = COORD_PAIR_RE.captures(value) {
                    if let Some(pair) = coord_pair(&caps[1], &caps[2]) {
                        return Some(pair);
                    }
                }
            }
        }
        for (lat_key, lng_key) in [("mlat", "mlon"), ("lat", "lon"), ("lat", "lng")] {
            let lat = pairs.iter().find(|(k, _)| k == lat_key);
            let lng = pairs.iter().find(|(k, _)| k == lng_key);
            if let (Some((_, lat)), Some((_, lng))) = (lat, lng) {
                if let Some(pair) = coord_pair(lat, lng) {
                    return Some(pair);
                }
            }
        }
    }
    None
}

/// Leaflet `setView([lat, lng])` init call.
fn leaflet_coords(_doc: &Html, html: &str) -> Option<(String, String)> {
    let caps = SET_VIEW_RE.captures(html)?;
    coord_pair(&caps[1], &caps[2])
}

/// `google.maps.LatLng(lat, lng)` init call.
fn gmaps_call_coords(_doc: &Html, html: &str) -> Option<(String, String)> {
    let caps = LATLNG_CALL_RE.captures(html)?;
    coord_pair(&caps[1], &caps[2])
}

/// `data-lat`/`data-lng`-style attributes on any element.
fn data_attribute_coords(doc: &Html, _html: &str) -> Option<(String, String)> {
    for el in doc.select(&selector("*")) {
        let attrs = el.value();
        let lat = attrs.attr("data-lat").or_else(|| attrs.attr("data-latitude"));
        let lng = attrs
            .attr("data-lng")
            .or_else(|| attrs.attr("data-longitude"))
            .or_else(|| attrs.attr("data-lon"));
        if let (Some(lat), Some(lng)) = (lat, lng) {
            if let Some(pair) = coord_pair(lat, lng) {
                return Some(pair);
            }
        }
    }
    None
}

/// Extract (latitude, longitude) from a detail page, or empty strings.
pub fn extract_coords(doc: &Html, html: &str) -> (String, String) {
    for strategy in COORD_STRATEGIES {
        if let Some(pair) = strategy(doc, html) {
            return pair;
        }
    }
    (String::new(), String::new())
}

/// Full descriptive text: gather every content-block candidate, fall back to
/// long `<p>` blocks, then keep the longest candidate (most complete copy).
pub fn extract_full_text(doc: &Html) -> String {
    let mut candidates: Vec<String> = Vec::new();
    for css in TEXT_SELECTORS {
        for el in doc.select(&selector(css)) {
            let text = block_text(el);
            if !text.is_empty() {
                candidates.push(text);
            }
        }
    }
    if candidates.is_empty() {
        let paragraphs: Vec<String> = doc
            .select(&selector("p"))
            .map(block_text)
            .filter(|t| t.len() > PARAGRAPH_MIN_LEN)
            .collect();
        if !paragraphs.is_empty() {
            candidates.push(paragraphs.join("\n\n"));
        }
    }
    let mut best = String::new();
    for candidate in candidates {
        if candidate.len() > best.len() {
            best = candidate;
        }
    }
    if best.is_empty() {
        return best;
    }
    let cleaned = TRAILING_SPACE_RE.replace_all(&best, "\n");
    let cleaned = MULTI_NEWLINE_RE.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

/// Order-preserving dedup, joined with the fixed separator.
fn dedupe_join(items: &[String]) -> String {
    let mut seen = HashSet::new();
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !item.is_empty() && seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out.join(" | ")
}

/// Auxiliary detail-page fields.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    pub additional_text: String,
    pub court: String,
    pub sous_lot: String,
    pub first_sous_lot: String,
    pub trusts: String,
    pub number: String,
}

/// Listing number: the numeric segment just before `.html` in the URL.
pub fn listing_number(detail_url: &str) -> String {
    LISTING_NUMBER_RE
        .captures(detail_url)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// Court, sub-lots, trustees, additional text and listing number, each with
/// a selector-first then keyword/regex fallback.
pub fn extract_extras(doc: &Html, html: &str, detail_url: &str) -> Extras {
    let additional_text = select_first_text(doc, ADDITIONAL_SELECTORS);

    let mut court = select_first_text(doc, &[".Court"]);
    if court.is_empty() {
        if let Some(parent) = parents_of_text_containing(doc, &["Tribunal"])
            .into_iter()
            .next()
        {
            court = element_text(parent);
        }
    }

    let mut sous_lots: Vec<String> = doc
        .select(&selector(SOUS_LOT_SELECTOR))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if sous_lots.is_empty() {
        for caps in SOUS_LOT_RE.captures_iter(html) {
            sous_lots.push(caps[1].trim().to_string());
        }
    }
    let first_sous_lot = sous_lots.first().cloned().unwrap_or_default();
    let sous_lot = dedupe_join(&sous_lots);

    let mut trusts: Vec<String> = doc
        .select(&selector(TRUSTS_SELECTOR))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if trusts.is_empty() {
        for parent in parents_of_text_containing(doc, TRUSTEE_KEYWORDS) {
            let text = element_text(parent);
            if !text.is_empty() {
                trusts.push(text);
            }
        }
    }
    let trusts = dedupe_join(&trusts);

    Extras {
        additional_text,
        court,
        sous_lot,
        first_sous_lot,
        trusts,
        number: listing_number(detail_url),
    }
}
