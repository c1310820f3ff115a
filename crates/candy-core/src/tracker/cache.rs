use fnv::FnvHashMap;
use smallvec::SmallVec;

use super::decoder::TrackerDecoder;

/// Per-channel cell text of one pattern row.
pub type RowCells = SmallVec<[String; 8]>;

/// Formatted pattern text for every order of a loaded module.
///
/// Built once on load so that the audio callback only does lookups. Lookups
/// outside the cached range return empty values rather than failing.
#[derive(Clone, Debug, Default)]
pub struct PatternCache {
    orders: Vec<Option<usize>>,
    patterns: FnvHashMap<usize, Vec<RowCells>>,
    channels: usize,
}

impl PatternCache {
    pub fn build(decoder: &dyn TrackerDecoder) -> Self {
        let channels = decoder.num_channels();
        let orders: Vec<Option<usize>> = (0..decoder.num_orders())
            .map(|o| decoder.order_pattern(o))
            .collect();
        let mut patterns = FnvHashMap::default();
        for pattern in orders.iter().flatten().copied() {
            patterns.entry(pattern).or_insert_with(|| {
                (0..decoder.pattern_rows(pattern))
                    .map(|row| {
                        (0..channels)
                            .map(|ch| decoder.format_cell(pattern, row, ch))
                            .collect::<RowCells>()
                    })
                    .collect::<Vec<_>>()
            });
        }
        log::debug!(
            "[tracker] cached {} orders, {} unique patterns, {} channels",
            orders.len(),
            patterns.len(),
            channels
        );
        Self {
            orders,
            patterns,
            channels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn num_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Cells of `row` in the pattern played at `order`; empty when out of range.
    pub fn row(&self, order: usize, row: usize) -> &[String] {
        self.orders
            .get(order)
            .copied()
            .flatten()
            .and_then(|p| self.patterns.get(&p))
            .and_then(|rows| rows.get(row))
            .map(|cells| cells.as_slice())
            .unwrap_or(&[])
    }

    /// Text of one cell; `""` when out of range.
    pub fn cell(&self, order: usize, row: usize, channel: usize) -> &str {
        self.row(order, row)
            .get(channel)
            .map(String::as_str)
            .unwrap_or("")
    }
}
