use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::message::{self, Message};
use crate::record::{saving_percent, ProductRecord};

/// Prices read from a product page in one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedPrices {
    pub standard: Decimal,
    pub member: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Unchanged,
    New,
    PriceDrop,
    PriceIncrease,
}

/// Which classification wins when one price falls and the other rises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpposingMoves {
    #[default]
    DropWins,
    IncreaseWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionRules {
    pub opposing_moves: OpposingMoves,
}

/// Outcome of comparing an observation with the stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Replacement for the stored record.
    pub record: ProductRecord,
    pub classification: Classification,
    pub message: Option<Message>,
}

/// An observed price too large to compute a saving against the rrp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("saving of {price} against rrp {rrp} is out of range")]
pub struct SavingOutOfRange {
    pub rrp: Decimal,
    pub price: Decimal,
}

/// Compares `observed` with `previous` and returns the record that should
/// replace it.
///
/// The returned record always has `error` reset to 0 and both savings
/// recomputed from the record's rrp.
pub fn detect(
    previous: &ProductRecord,
    observed: ObservedPrices,
    rules: &DetectionRules,
) -> Result<Detection, SavingOutOfRange> {
    let saving_against = |price: Decimal| {
        saving_percent(previous.rrp, price).ok_or(SavingOutOfRange {
            rrp: previous.rrp,
            price,
        })
    };
    let saving = saving_against(observed.standard)?;
    let saving_gold = saving_against(observed.member)?;

    let record = ProductRecord {
        price: observed.standard,
        price_gold: observed.member,
        saving,
        saving_gold,
        error: 0,
        ..previous.clone()
    };

    let classification = classify(previous, &record, rules);
    let message = match classification {
        Classification::Unchanged => None,
        Classification::New => Some(message::new_product(&record)),
        Classification::PriceDrop => Some(message::price_drop(previous, &record)),
        Classification::PriceIncrease => Some(message::price_increase(previous, &record)),
    };

    Ok(Detection {
        record,
        classification,
        message,
    })
}

fn classify(previous: &ProductRecord, current: &ProductRecord, rules: &DetectionRules) -> Classification {
    let prices_equal =
        previous.price == current.price && previous.price_gold == current.price_gold;
    if prices_equal {
        // Equal prices with drifted savings only happen after a manual rrp
        // edit; the refreshed savings are kept without a notification.
        return Classification::Unchanged;
    }

    if !previous.is_priced() {
        return Classification::New;
    }

    let dropped = current.price < previous.price || current.price_gold < previous.price_gold;
    let increased = current.price > previous.price || current.price_gold > previous.price_gold;

    match (dropped, increased) {
        (true, true) => match rules.opposing_moves {
            OpposingMoves::DropWins => Classification::PriceDrop,
            OpposingMoves::IncreaseWins => Classification::PriceIncrease,
        },
        (true, false) => Classification::PriceDrop,
        (false, true) => Classification::PriceIncrease,
        (false, false) => Classification::Unchanged,
    }
}
