use tracing::debug;

use super::html::{extract_tables, HtmlTable};
use super::{finish, AdapterError, IntermediateRecord, RawGmp};
use crate::fetch::RawPayload;
use crate::SourceId;

const PREMIUM_MARKERS: [&str; 2] = ["gmp", "premium"];
const UPDATED_MARKERS: [&str; 2] = ["updated", "as on"];

/// Column positions of one provider's premium table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GmpLayout {
    pub adapter: &'static str,
    pub source: SourceId,
    pub company: usize,
    pub premium: usize,
    pub price: Option<usize>,
    pub gain: Option<usize>,
}

impl GmpLayout {
    pub const IPOWATCH: Self = Self {
        adapter: "ipowatch",
        source: SourceId::IpoWatch,
        company: 0,
        premium: 1,
        price: Some(2),
        gain: Some(3),
    };

    pub const INVESTORGAIN: Self = Self {
        adapter: "investorgain",
        source: SourceId::InvestorGain,
        company: 0,
        premium: 2,
        price: Some(1),
        gain: Some(4),
    };

    pub const CHITTORGARH: Self = Self {
        adapter: "chittorgarh",
        source: SourceId::Chittorgarh,
        company: 0,
        premium: 2,
        price: Some(1),
        gain: Some(4),
    };

    fn min_cells(self) -> usize {
        [Some(self.company), Some(self.premium), self.price, self.gain]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Whether `header` has this layout's premium column in the expected slot.
    fn matches(self, header: &[String]) -> bool {
        if header.len() < self.min_cells() {
            return false;
        }
        let premium = header[self.premium].to_lowercase();
        let company = header[self.company].trim();
        !company.is_empty() && PREMIUM_MARKERS.iter().any(|marker| premium.contains(marker))
    }

    fn updated_column(self, header: &[String]) -> Option<usize> {
        header.iter().position(|cell| {
            let lowered = cell.to_lowercase();
            UPDATED_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
    }
}

pub(super) fn parse(
    layout: GmpLayout,
    payload: &RawPayload,
) -> Result<Vec<IntermediateRecord>, AdapterError> {
    let tables = extract_tables(&payload.body);
    let Some(table) = tables.iter().find(|table| layout.matches(&table.header)) else {
        return Err(AdapterError::schema_changed(
            layout.adapter,
            format!(
                "none of {} tables has a premium column at position {}",
                tables.len(),
                layout.premium
            ),
        ));
    };

    let records = rows(layout, table);
    debug!(
        adapter = layout.adapter,
        parsed = records.len(),
        total = table.rows.len(),
        "grey-market table parsed"
    );
    finish(layout.adapter, records, table.rows.len())
}

fn rows(layout: GmpLayout, table: &HtmlTable) -> Vec<IntermediateRecord> {
    let updated = layout.updated_column(&table.header);
    let cell = |row: &[String], index: Option<usize>| {
        index
            .and_then(|index| row.get(index))
            .map(|text| text.trim())
            .filter(|text| !text.is_empty() && *text != "-")
            .map(str::to_owned)
    };

    table
        .rows
        .iter()
        .filter(|row| row.len() >= layout.min_cells())
        .filter_map(|row| {
            let row = row.as_slice();
            let company_name = cell(row, Some(layout.company))?;
            let premium = cell(row, Some(layout.premium))?;
            Some(IntermediateRecord::Gmp(RawGmp {
                source: layout.source,
                company_name,
                premium,
                price: cell(row, layout.price),
                gain: cell(row, layout.gain),
                updated_on: cell(row, updated),
            }))
        })
        .collect()
}
