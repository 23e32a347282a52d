//! Webhook message model and the builders for every notification the
//! watcher sends.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::ProductRecord;

/// Destination value that turns notifications off entirely.
pub const DISABLED_DESTINATION: &str = "disabled";

pub const COLOR_NEW: u32 = 15_844_367;
pub const COLOR_DROP: u32 = 3_066_993;
pub const COLOR_INCREASE: u32 = 10_038_562;
pub const COLOR_ERROR: u32 = 10_038_562;
pub const COLOR_SUMMARY: u32 = 10_181_046;

/// Body posted to the webhook: `{ "embeds": [ ... ] }`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn single(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
        }
    }

    /// Stamps every embed with the given generation time.
    pub fn stamp(&mut self, timestamp: &str) {
        for embed in &mut self.embeds {
            embed.timestamp = Some(timestamp.to_string());
        }
    }
}

/// `£12.30`
pub fn format_price(price: Decimal) -> String {
    format!("£{:.2}", price)
}

/// `12.3%`
pub fn format_saving(saving: Decimal) -> String {
    format!("{:.1}%", saving)
}

fn product_embed(record: &ProductRecord, description: String, color: u32) -> Embed {
    Embed {
        title: Some(record.name.clone()),
        description: Some(description),
        url: Some(record.url.clone()),
        color: Some(color),
        timestamp: None,
    }
}

fn savings_line(lead: &str, record: &ProductRecord) -> String {
    format!(
        "{lead} {} saving on RRP ({} with 🥇)",
        format_saving(record.saving),
        format_saving(record.saving_gold)
    )
}

/// Introduction of a product priced for the first time. `record` carries the
/// freshly observed values.
pub fn new_product(record: &ProductRecord) -> Message {
    let description = format!(
        "🎉 A new challenger has appeared!\n\nIt's been listed at {} ({} with 🥇)\n\n{}",
        format_price(record.price),
        format_price(record.price_gold),
        savings_line("That's a", record),
    );
    Message::single(product_embed(record, description, COLOR_NEW))
}

pub fn price_drop(previous: &ProductRecord, current: &ProductRecord) -> Message {
    let description = format!(
        "✅ Yaaay, price drop!\n\n{}\n\n{}",
        before_after(previous, current),
        savings_line("That's a", current),
    );
    Message::single(product_embed(current, description, COLOR_DROP))
}

pub fn price_increase(previous: &ProductRecord, current: &ProductRecord) -> Message {
    let description = format!(
        "❌ Boooo, price increase!\n\n{}\n\n{}",
        before_after(previous, current),
        savings_line("That's still a", current),
    );
    Message::single(product_embed(current, description, COLOR_INCREASE))
}

fn before_after(previous: &ProductRecord, current: &ProductRecord) -> String {
    format!(
        "Was {} now {}\n🥇 was {} now {}\nSaving was {} now {} ({} now {} with 🥇)",
        format_price(previous.price),
        format_price(current.price),
        format_price(previous.price_gold),
        format_price(current.price_gold),
        format_saving(previous.saving),
        format_saving(current.saving),
        format_saving(previous.saving_gold),
        format_saving(current.saving_gold),
    )
}

/// Sent to the error destination when a record is disabled.
pub fn error_limit(record: &ProductRecord) -> Message {
    Message::single(Embed {
        title: Some(format!("{} Error Limit 😨", record.name)),
        description: Some(format!(
            "\"{}\" (id: {}) has reached the error limit. Check URLs etc.",
            record.name, record.id
        )),
        color: Some(COLOR_ERROR),
        ..Embed::default()
    })
}

/// Best-value listing. `entries` must be non-empty and already ranked.
pub fn best_value(entries: &[&ProductRecord]) -> Message {
    let mut description = if entries.len() == 1 {
        String::from("**Current Best Value Voucher**")
    } else {
        String::from("**Current Best Value Vouchers**")
    };
    for record in entries {
        description.push('\n');
        description.push_str(&format!(
            "[{}]({})\t{} (or {} with 🥇)\t{} / {} 🥇",
            record.name,
            record.url,
            format_saving(record.saving),
            format_saving(record.saving_gold),
            format_price(record.price),
            format_price(record.price_gold),
        ));
    }
    Message::single(Embed {
        description: Some(description),
        color: Some(COLOR_SUMMARY),
        ..Embed::default()
    })
}
