use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod crawl;
mod detail;
mod extract;
mod record;
mod store;

/// Listing-index URL template; `{page}` is substituted per iteration.
const BASE_URL: &str =
    "https://www.licitor.com/ventes-aux-encheres-immobilieres/paris-et-ile-de-france/prochaines-ventes.html?p={page}";
const SITE_ROOT: &str = "https://www.licitor.com";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; Scraper/1.0)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PAGE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_PAGE: usize = 50;

const PICTURES_DIR: &str = "Pictures";
const CSV_PATH: &str = "licitor_samples.csv";
/// Consumed directly by the front-end.
const PUBLIC_JSON_PATH: &str = "public/licitor_samples.json";
const LOCAL_JSON_PATH: &str = "licitor_samples.json";

#[derive(Parser)]
#[command(name = "licitor-scrape")]
#[command(about = "Sequential scraper for licitor.com auction listings")]
struct Cli {
    /// Maximum number of index pages to crawl
    /// (falls back to the MAX_PAGE environment variable, then 50)
    #[arg(long, value_name = "N")]
    pages: Option<usize>,
    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Page limit: CLI flag, then MAX_PAGE env var, then the default. Clamped to
/// at least one page.
fn max_page(cli_pages: Option<usize>, env_value: Option<&str>) -> usize {
    if let Some(n) = cli_pages {
        return n.max(1);
    }
    if let Some(value) = env_value {
        if let Ok(n) = value.parse::<usize>() {
            return n.max(1);
        }
    }
    DEFAULT_MAX_PAGE
}

/// Trip the stop flag on the first line of real input. `Ok(0)` is EOF —
/// stdin closed or redirected (cron, headless runs) — and must leave the
/// watcher inert or every non-interactive crawl would cancel itself.
fn watch_for_stop(mut input: impl std::io::BufRead, flag: &AtomicBool) {
    let mut line = String::new();
    if matches!(input.read_line(&mut line), Ok(n) if n > 0) {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Cooperative stop signal: any line on stdin (press Enter) halts the crawl
/// after the current page. The crawler only sees a boolean check.
fn spawn_stop_watcher() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let watcher = Arc::clone(&flag);
    std::thread::spawn(move || watch_for_stop(std::io::stdin().lock(), &watcher));
    flag
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_pages = std::env::var("MAX_PAGE").ok();
    let max_page = max_page(cli.pages, env_pages.as_deref());

    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let fetcher = detail::DetailFetcher::new(client.clone(), PathBuf::from(PICTURES_DIR));
    let crawler = crawl::Crawler::new(
        client,
        fetcher,
        BASE_URL.to_string(),
        SITE_ROOT.to_string(),
        PAGE_DELAY,
        cli.quiet,
    );

    if !cli.quiet {
        println!(
            "Starting sequential crawl (up to {} pages, press Enter to stop)...",
            max_page
        );
    }
    let stop = spawn_stop_watcher();
    let items = crawler.crawl(max_page, &|| stop.load(Ordering::SeqCst));

    store::persist_run(
        items,
        Path::new(CSV_PATH),
        Path::new(PUBLIC_JSON_PATH),
        Path::new(LOCAL_JSON_PATH),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_page_prefers_cli_flag() {
        assert_eq!(max_page(Some(3), Some("9")), 3);
        assert_eq!(max_page(Some(0), None), 1);
    }

    #[test]
    fn test_max_page_env_fallback() {
        assert_eq!(max_page(None, Some("12")), 12);
        assert_eq!(max_page(None, Some("0")), 1);
        assert_eq!(max_page(None, Some("junk")), DEFAULT_MAX_PAGE);
    }

    #[test]
    fn test_max_page_default() {
        assert_eq!(max_page(None, None), DEFAULT_MAX_PAGE);
    }

    #[test]
    fn test_stop_watcher_inert_on_eof() {
        let flag = AtomicBool::new(false);
        watch_for_stop(std::io::Cursor::new(""), &flag);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_watcher_trips_on_input() {
        let flag = AtomicBool::new(false);
        watch_for_stop(std::io::Cursor::new("\n"), &flag);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_page_url_substitution() {
        let url = BASE_URL.replace("{page}", "7");
        assert!(url.ends_with("?p=7"));
    }
}
