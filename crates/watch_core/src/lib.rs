//! Voucher watch core: product records, change detection and message
//! building. Pure; no IO.
mod detect;
pub mod message;
mod record;
mod summary;

pub use detect::{
    detect, Classification, Detection, DetectionRules, ObservedPrices, OpposingMoves,
    SavingOutOfRange,
};
pub use message::{Embed, Message, DISABLED_DESTINATION};
pub use record::{
    saving_percent, unobserved, upgrade_legacy_records, PersistedRecord, ProductId,
    ProductRecord, UpgradeOutcome, DISABLED, ERROR_LIMIT, LEGACY_LOYALTY_DISCOUNT_PCT,
};
pub use summary::{best_value_summary, BEST_VALUE_TOP};
