use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `error` value of a record that is permanently disabled.
pub const DISABLED: i32 = -1;

/// Number of consecutive failures after which a record is disabled.
pub const ERROR_LIMIT: i32 = 12;

/// Loyalty discount (%) the single-price model applied to derive the member
/// price. Only the legacy upgrade uses it; observed member prices already
/// include the discount.
pub const LEGACY_LOYALTY_DISCOUNT_PCT: u32 = 2;

/// Sentinel for a price that has never been observed.
pub fn unobserved() -> Decimal {
    Decimal::NEGATIVE_ONE
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductId::Number(id) => write!(f, "{id}"),
            ProductId::Text(id) => f.write_str(id),
        }
    }
}

/// One tracked product, as stored in the product data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub url: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rrp: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_gold: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub saving: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub saving_gold: Decimal,
    pub error: i32,
}

impl ProductRecord {
    /// A record that has never been priced.
    pub fn new(id: ProductId, name: impl Into<String>, url: impl Into<String>, rrp: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            rrp,
            price: unobserved(),
            price_gold: unobserved(),
            saving: Decimal::ZERO,
            saving_gold: Decimal::ZERO,
            error: 0,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.error == DISABLED
    }

    pub fn is_priced(&self) -> bool {
        self.price >= Decimal::ZERO
    }

    /// True once the failure streak has reached the limit.
    pub fn error_limit_reached(&self) -> bool {
        self.error >= ERROR_LIMIT
    }
}

/// Percentage saved against `rrp`, rounded to 4 decimal places.
///
/// The rounding keeps the value stable through a JSON number round trip.
/// A non-positive `rrp` yields zero; `None` when the arithmetic overflows.
pub fn saving_percent(rrp: Decimal, price: Decimal) -> Option<Decimal> {
    if rrp <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    rrp.checked_sub(price)?
        .checked_div(rrp)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|saving| saving.round_dp(4))
}

/// On-disk shape accepted on load; the member fields are optional so that
/// files written by the single-price model still parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub id: ProductId,
    pub name: String,
    pub url: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rrp: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price_gold: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub saving: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub saving_gold: Option<Decimal>,
    #[serde(default)]
    pub error: i32,
}

/// Result of the load-time upgrade pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeOutcome {
    pub records: Vec<ProductRecord>,
    pub upgraded: usize,
}

/// Brings single-price records up to the dual-price model.
///
/// Idempotent: records that already carry member fields pass through as-is.
pub fn upgrade_legacy_records(records: Vec<PersistedRecord>) -> UpgradeOutcome {
    let mut upgraded = 0;
    let records = records
        .into_iter()
        .map(|record| {
            let (record, changed) = upgrade_record(record);
            if changed {
                upgraded += 1;
            }
            record
        })
        .collect();
    UpgradeOutcome { records, upgraded }
}

fn upgrade_record(persisted: PersistedRecord) -> (ProductRecord, bool) {
    let mut changed = false;

    let price_gold = persisted.price_gold.unwrap_or_else(|| {
        changed = true;
        legacy_member_price(persisted.price)
    });
    let saving = persisted.saving.unwrap_or_else(|| {
        changed = true;
        derived_saving(persisted.rrp, persisted.price)
    });
    let saving_gold = persisted.saving_gold.unwrap_or_else(|| {
        changed = true;
        derived_saving(persisted.rrp, price_gold)
    });

    let record = ProductRecord {
        id: persisted.id,
        name: persisted.name,
        url: persisted.url,
        rrp: persisted.rrp,
        price: persisted.price,
        price_gold,
        saving,
        saving_gold,
        error: persisted.error,
    };
    (record, changed)
}

fn legacy_member_price(price: Decimal) -> Decimal {
    if price < Decimal::ZERO {
        return unobserved();
    }
    let keep = Decimal::from(100 - LEGACY_LOYALTY_DISCOUNT_PCT);
    price
        .checked_mul(keep)
        .map(|scaled| (scaled / Decimal::ONE_HUNDRED).round_dp(2))
        .unwrap_or_else(unobserved)
}

// Out-of-range legacy values count as no saving.
fn derived_saving(rrp: Decimal, price: Decimal) -> Decimal {
    if price < Decimal::ZERO {
        return Decimal::ZERO;
    }
    saving_percent(rrp, price).unwrap_or(Decimal::ZERO)
}
