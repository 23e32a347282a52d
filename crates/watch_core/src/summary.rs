use crate::message::{self, Message};
use crate::record::ProductRecord;

/// Number of ranked records considered for the best-value listing.
pub const BEST_VALUE_TOP: usize = 5;

/// Ranks by member saving, keeps the top five, then drops disabled and
/// never-priced records. `None` when nothing survives.
pub fn best_value_summary(records: &[ProductRecord]) -> Option<Message> {
    let mut ranked: Vec<&ProductRecord> = records.iter().collect();
    // Stable sort: ties keep file order.
    ranked.sort_by(|a, b| b.saving_gold.cmp(&a.saving_gold));

    let entries: Vec<&ProductRecord> = ranked
        .into_iter()
        .take(BEST_VALUE_TOP)
        .filter(|record| !record.is_disabled() && record.is_priced())
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(message::best_value(&entries))
    }
}
