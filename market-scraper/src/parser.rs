//! Extraction of coin quotes from the market-listing page.
//!
//! Parsing is lenient by construction: a row without a code or name is
//! dropped, a cell that does not parse becomes `None`, and a page whose
//! layout no longer matches yields an empty list.

use market_core::CoinQuote;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

macro_rules! selector {
    ($css:expr) => {
        LazyLock::new(|| Selector::parse($css).unwrap())
    };
}

static ROW: LazyLock<Selector> = selector!("tr.tradeitem.coinrow");
static IMG: LazyLock<Selector> = selector!("img");
static DIV: LazyLock<Selector> = selector!("div");
static CODE_DIV: LazyLock<Selector> = selector!("div[class*='grey-500']");

static NON_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9.]").unwrap());

const MIN_CELLS: usize = 6;

/// Parse every tradeable coin row of the listing document.
pub fn parse_coin_list(html: &str, origin: &str) -> Vec<CoinQuote> {
    let document = Html::parse_document(html);

    document
        .select(&ROW)
        .filter_map(|row| parse_row(row, origin))
        .collect()
}

fn parse_row(row: ElementRef<'_>, origin: &str) -> Option<CoinQuote> {
    let cells: Vec<ElementRef<'_>> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect();

    if cells.len() < MIN_CELLS {
        debug!("Skipping row with {} cells", cells.len());
        return None;
    }

    let icon = cells[0]
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim);
    let name = cells[1].select(&DIV).next().map(inner_text);
    let code = cells[1].select(&CODE_DIV).next().map(inner_text);

    let (name, code) = match (name, code) {
        (Some(name), Some(code)) if !name.is_empty() && !code.is_empty() => (name, code),
        _ => {
            debug!("Skipping row without code or name");
            return None;
        }
    };

    let price_and_change = inner_text(cells[2]);
    let mut lines = price_and_change.lines().filter(|line| !line.trim().is_empty());
    let price = lines.next().and_then(parse_currency);
    let change = lines.next().and_then(parse_percentage);

    Some(CoinQuote {
        code,
        name,
        price,
        price_aud: parse_currency(&inner_text(cells[3])),
        market_cap: parse_abbreviated(&inner_text(cells[4])),
        volume: parse_abbreviated(&inner_text(cells[5])),
        change,
        icon: icon.map(|icon| absolute_icon_url(icon, origin)),
    })
}

fn inner_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Strip everything but digits and `.` and parse what is left.
pub fn parse_currency(input: &str) -> Option<Decimal> {
    if input.trim().is_empty() {
        return None;
    }
    let digits = NON_NUMERIC.replace_all(input, "");
    Decimal::from_str(&digits).ok()
}

/// Signed percentage such as `-3.5%` or `1,234.5%`. Thousands separators are
/// dropped.
pub fn parse_percentage(input: &str) -> Option<Decimal> {
    if input.trim().is_empty() {
        return None;
    }
    let cleaned: String = input.chars().filter(|c| *c != '%' && *c != ',').collect();
    Decimal::from_str(cleaned.trim()).ok()
}

/// Parse values such as `1.5M` or `$2.04B`. The suffix is case-sensitive.
pub fn parse_abbreviated(input: &str) -> Option<Decimal> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let multiplier = if input.ends_with('B') {
        Decimal::from(1_000_000_000u64)
    } else if input.ends_with('M') {
        Decimal::from(1_000_000u64)
    } else if input.ends_with('K') {
        Decimal::from(1_000u64)
    } else {
        Decimal::ONE
    };

    let digits = NON_NUMERIC.replace_all(input, "");
    Decimal::from_str(&digits).ok()?.checked_mul(multiplier)
}

/// Icons are served as `./images/...` relative to the site root.
pub fn absolute_icon_url(icon: &str, origin: &str) -> String {
    if icon.starts_with("http://") || icon.starts_with("https://") {
        return icon.to_string();
    }

    let path = icon.strip_prefix('.').filter(|p| p.starts_with('/')).unwrap_or(icon);
    let origin = origin.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{origin}{path}")
    } else {
        format!("{origin}/{path}")
    }
}
