use once_cell::sync::Lazy;
use regex::Regex;

static TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("table regex is valid"));
static ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row regex is valid"));
static CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<t([hd])\b[^>]*>(.*?)</t[hd]>").expect("cell regex is valid")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("entity regex is valid"));

/// A table's text content: the first row is the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Every `<table>` in document order, with cell text stripped of markup.
///
/// Nested tables are not supported; grey-market pages render flat tables.
pub fn extract_tables(html: &str) -> Vec<HtmlTable> {
    TABLE
        .captures_iter(html)
        .filter_map(|table| {
            let inner = table.get(1)?.as_str();
            let mut rows = ROW.captures_iter(inner).filter_map(|row| {
                let cells: Vec<String> = CELL
                    .captures_iter(row.get(1)?.as_str())
                    .filter_map(|cell| cell.get(2).map(|m| cell_text(m.as_str())))
                    .collect();
                (!cells.is_empty()).then_some(cells)
            });
            let header = rows.next()?;
            Some(HtmlTable {
                header,
                rows: rows.collect(),
            })
        })
        .collect()
}

fn cell_text(fragment: &str) -> String {
    let without_tags = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&rsquo;", "'")
        .replace("&ndash;", "-")
        .replace("&rupee;", "₹");

    NUMERIC_ENTITY
        .replace_all(&named, |caps: &regex::Captures<'_>| {
            let code = &caps[1];
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse::<u32>().ok(),
            };
            value
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}
