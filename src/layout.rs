// src/layout.rs
//
// Sizes invoices into three allocation tiers and packs them onto pages,
// largest group first, with a cap on invoices per page.

use crate::config::{Config, DesignConfig};
use crate::invoice::Invoice;
use serde::Serialize;
use tracing::{debug, info};

/// Slack allowed when comparing summed heights against the page.
const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationTier {
    Third,
    Half,
    Full,
}

/// One invoice on a page: its slot height and the height it needs.
#[derive(Debug, Clone, Serialize)]
pub struct Placement<'a> {
    pub invoice: &'a Invoice,
    pub tier: AllocationTier,
    pub allocated: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageModel<'a> {
    pub placements: Vec<Placement<'a>>,
    /// Allocated heights plus the spacing between them.
    pub height: f64,
}

impl<'a> PageModel<'a> {
    pub fn count(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LayoutEngine {
    available_height: f64,
    spacing: f64,
    max_per_page: usize,
    design: DesignConfig,
}

impl LayoutEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            available_height: config.page.available_height(),
            spacing: config.page.spacing(),
            max_per_page: config.page.max_documents_per_page,
            design: config.design.clone(),
        }
    }

    pub fn available_height(&self) -> f64 {
        self.available_height
    }

    /// Height an invoice needs when drawn: header, table header, one row
    /// per line plus the totals row, footer and internal spacing.
    pub fn compute_required_height(&self, invoice: &Invoice) -> f64 {
        let d = &self.design;
        d.header_height
            + d.table_header_height
            + invoice.items.len() as f64 * d.table_row_height
            + d.table_row_height
            + d.footer_height
            + d.spacing_internal
    }

    /// Smallest of the three zones that holds `height`. Anything taller than
    /// the full zone still gets the full zone.
    pub fn quantize(&self, height: f64) -> (AllocationTier, f64) {
        let reserved = self.max_per_page.saturating_sub(1) as f64 * self.spacing;
        let adjusted = self.available_height - reserved;

        let third = adjusted / 3.0;
        let half = adjusted / 2.0;
        if height <= third {
            (AllocationTier::Third, third)
        } else if height <= half {
            (AllocationTier::Half, half)
        } else {
            (AllocationTier::Full, adjusted)
        }
    }

    fn place<'a>(&self, invoice: &'a Invoice) -> Placement<'a> {
        let actual = self.compute_required_height(invoice);
        let (tier, allocated) = self.quantize(actual);
        Placement {
            invoice,
            tier,
            allocated,
            actual,
        }
    }

    /// Pack groups onto pages. Groups go largest first; inside a group the
    /// invoices keep their order and may spill onto the next page.
    pub fn pack<'a>(&self, groups: Vec<Vec<&'a Invoice>>) -> Vec<PageModel<'a>> {
        let mut sized: Vec<(Vec<Placement<'a>>, f64)> = groups
            .into_iter()
            .map(|group| {
                let placements: Vec<_> = group.into_iter().map(|i| self.place(i)).collect();
                let gaps = placements.len().saturating_sub(1) as f64 * self.spacing;
                let height = placements.iter().map(|p| p.allocated).sum::<f64>() + gaps;
                (placements, height)
            })
            .collect();

        // sort_by is stable, equal groups keep first-seen order
        sized.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut pages: Vec<PageModel<'a>> = Vec::new();
        for (placements, group_height) in sized {
            let Some(first) = placements.first() else {
                continue;
            };
            debug!(
                key = %first.invoice.grouping_key,
                documents = placements.len(),
                height = group_height,
                "Placing group"
            );
            for placement in placements {
                if let Some(page) = pages.last_mut().filter(|page| self.fits(page, &placement)) {
                    if !page.is_empty() {
                        page.height += self.spacing;
                    }
                    page.height += placement.allocated;
                    page.placements.push(placement);
                    continue;
                }
                pages.push(PageModel {
                    height: placement.allocated,
                    placements: vec![placement],
                });
            }
        }

        for (n, page) in pages.iter().enumerate() {
            debug!(page = n + 1, documents = page.count(), height = page.height, "Page packed");
        }
        pages
    }

    fn fits(&self, page: &PageModel<'_>, placement: &Placement<'_>) -> bool {
        let mut height = page.height + placement.allocated;
        if !page.is_empty() {
            height += self.spacing;
        }
        height <= self.available_height + EPSILON && page.count() < self.max_per_page
    }

    pub fn layout<'a>(&self, invoices: &'a [Invoice]) -> Vec<PageModel<'a>> {
        if invoices.is_empty() {
            return Vec::new();
        }
        let groups = group_by_key(invoices);
        let pages = self.pack(groups);
        info!(invoices = invoices.len(), pages = pages.len(), "Layout done");
        pages
    }
}

/// Groups by grouping key in first-seen order; all invoices without a key
/// form one group.
pub fn group_by_key(invoices: &[Invoice]) -> Vec<Vec<&Invoice>> {
    let mut keys: Vec<&str> = Vec::new();
    let mut groups: Vec<Vec<&Invoice>> = Vec::new();
    for invoice in invoices {
        match keys.iter().position(|k| *k == invoice.grouping_key) {
            Some(n) => groups[n].push(invoice),
            None => {
                keys.push(&invoice.grouping_key);
                groups.push(vec![invoice]);
            }
        }
    }
    debug!(groups = groups.len(), "Invoices grouped by order number");
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::LineItem;
    use time::macros::date;

    fn invoice(number: &str, key: &str, lines: usize) -> Invoice {
        Invoice {
            number: number.into(),
            date: date!(2024 - 01 - 15),
            grouping_key: key.into(),
            kind: "S3".into(),
            items: (0..lines)
                .map(|n| LineItem {
                    item_name: format!("Товар {n}"),
                    unit: "шт".into(),
                    quantity: 1.0,
                    price: 1.0,
                    amount: 1.0,
                })
                .collect(),
        }
    }

    fn engine() -> LayoutEngine {
        LayoutEngine::new(&Config::default())
    }

    fn numbers<'a>(page: &PageModel<'a>) -> Vec<&'a str> {
        page.placements
            .iter()
            .map(|p| p.invoice.number.as_str())
            .collect()
    }

    #[test]
    fn test_required_height_grows_with_items() {
        let engine = engine();
        let mut last = 0.0;
        for lines in 0..30 {
            let height = engine.compute_required_height(&invoice("1", "", lines));
            assert!(height > last);
            last = height;
        }
        // 50 + 20 + 15 + 60 + 10 with no lines
        assert_eq!(engine.compute_required_height(&invoice("1", "", 0)), 155.0);
    }

    #[test]
    fn test_quantize_is_a_step_function() {
        let engine = engine();
        let (tier_a, alloc_a) = engine.quantize(100.0);
        let (tier_b, alloc_b) = engine.quantize(250.0);
        assert_eq!(tier_a, AllocationTier::Third);
        assert_eq!((tier_a, alloc_a), (tier_b, alloc_b));

        let (tier, half) = engine.quantize(300.0);
        assert_eq!(tier, AllocationTier::Half);
        assert!((half - alloc_a * 1.5).abs() < 1e-9);

        let (tier, full) = engine.quantize(5000.0);
        assert_eq!(tier, AllocationTier::Full);
        assert!((full - alloc_a * 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_thirds_fill_one_page() {
        let engine = engine();
        let (_, third) = engine.quantize(1.0);
        let spacing = Config::default().page.spacing();
        assert!(third * 3.0 + spacing * 2.0 <= engine.available_height() + EPSILON);
    }

    #[test]
    fn test_small_and_large_invoices_use_two_pages() {
        let invoices = vec![
            invoice("1", "100", 1),
            invoice("2", "200", 1),
            invoice("3", "300", 1),
            invoice("4", "400", 20),
        ];
        let engine = engine();
        let pages = engine.layout(&invoices);

        assert_eq!(pages.len(), 2);
        // largest first: the full-page invoice opens the first page
        assert_eq!(numbers(&pages[0]), ["4"]);
        assert_eq!(pages[0].placements[0].tier, AllocationTier::Full);
        assert_eq!(numbers(&pages[1]), ["1", "2", "3"]);
        assert!(pages[1]
            .placements
            .iter()
            .all(|p| p.tier == AllocationTier::Third));
    }

    #[test]
    fn test_cap_limits_documents_per_page() {
        let mut config = Config::default();
        config.page.max_documents_per_page = 2;
        let engine = LayoutEngine::new(&config);
        let invoices: Vec<_> = (0..5).map(|n| invoice(&n.to_string(), "", 0)).collect();

        let pages = engine.layout(&invoices);
        assert_eq!(pages.len(), 3);
        for page in &pages {
            assert!(page.count() <= 2);
            assert!(page.height <= engine.available_height() + EPSILON);
        }
    }

    #[test]
    fn test_every_invoice_placed_once() {
        let engine = engine();
        let invoices: Vec<_> = (0..17)
            .map(|n| invoice(&n.to_string(), &(n % 4).to_string(), n * 3 % 40))
            .collect();

        let pages = engine.layout(&invoices);
        let mut placed: Vec<&str> = pages.iter().flat_map(|p| numbers(p)).collect();
        placed.sort_unstable();
        let mut expected: Vec<&str> = invoices.iter().map(|i| i.number.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(placed, expected);

        for page in &pages {
            assert!(page.count() <= 3);
            if page.count() > 1 {
                assert!(page.height <= engine.available_height() + EPSILON);
            }
        }
    }

    #[test]
    fn test_empty_group_is_skipped_with_debug_logging() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let invoices = vec![invoice("1", "", 1)];
        let pages = tracing::subscriber::with_default(subscriber, || {
            engine().pack(vec![vec![], vec![&invoices[0]], vec![]])
        });
        assert_eq!(pages.len(), 1);
        assert_eq!(numbers(&pages[0]), ["1"]);
    }

    #[test]
    fn test_no_invoices_no_pages() {
        assert!(engine().layout(&[]).is_empty());
    }

    #[test]
    fn test_oversized_invoice_is_still_placed() {
        let engine = engine();
        let invoices = vec![invoice("big", "", 200)];
        let pages = engine.layout(&invoices);
        assert_eq!(pages.len(), 1);
        let placement = &pages[0].placements[0];
        assert_eq!(placement.tier, AllocationTier::Full);
        assert!(placement.actual > placement.allocated);
    }

    #[test]
    fn test_groups_keep_first_seen_and_member_order() {
        let invoices = vec![
            invoice("a1", "A", 0),
            invoice("e1", "", 0),
            invoice("b1", "B", 0),
            invoice("a2", "A", 0),
            invoice("e2", "", 0),
        ];
        let groups = group_by_key(&invoices);
        let keys: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|i| i.number.as_str()).collect())
            .collect();
        assert_eq!(keys, [vec!["a1", "a2"], vec!["e1", "e2"], vec!["b1"]]);
    }

    #[test]
    fn test_group_spills_in_order() {
        let engine = engine();
        let invoices: Vec<_> = (1..=4).map(|n| invoice(&format!("k{n}"), "K", 0)).collect();
        let pages = engine.layout(&invoices);
        assert_eq!(pages.len(), 2);
        assert_eq!(numbers(&pages[0]), ["k1", "k2", "k3"]);
        assert_eq!(numbers(&pages[1]), ["k4"]);
    }

    #[test]
    fn test_plan_serializes_tier_names() {
        let invoices = vec![invoice("1", "", 1)];
        let pages = engine().layout(&invoices);
        let json = serde_json::to_value(&pages).unwrap();
        assert_eq!(json[0]["placements"][0]["tier"], "third");
        assert_eq!(json[0]["placements"][0]["invoice"]["number"], "1");
    }
}
