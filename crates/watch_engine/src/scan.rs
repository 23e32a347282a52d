//! One scan pass over every tracked product.
//!
//! Records are handled strictly in file order. Each record's failure counter
//! is raised before any work and only reset by a successful observation, so
//! a failure anywhere leaves the raised counter in place.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use watch_core::{
    best_value_summary, detect, message, Classification, Detection, DetectionRules,
    ObservedPrices, ProductRecord, SavingOutOfRange, DISABLED,
};
use watch_logging::{watch_debug, watch_error, watch_info, watch_warn};

use crate::charset::{decode_page, PageDecodeError};
use crate::extract::{ExtractError, FieldExtractor};
use crate::fetch::Fetcher;
use crate::notify::WebhookNotifier;
use crate::price_image::{DecodeMode, PriceDecodeError, PriceReader};
use crate::store::{ProductStore, StoreError};
use crate::{FetchError, ScanEvent};

/// Receives progress of a scan pass.
pub trait ScanSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Forwards scan events to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ScanSink for LogSink {
    fn emit(&self, event: ScanEvent) {
        match event {
            ScanEvent::Skipped { id } => watch_debug!("Skipping disabled product {}", id),
            ScanEvent::Disabled { id, name } => watch_warn!(
                "Error limit reached for {} (id {}): disabled until the error count is reset by hand",
                name,
                id
            ),
            ScanEvent::RecordFailed {
                id,
                attempts,
                reason,
            } => watch_warn!("Product {} failed (streak {}): {}", id, attempts, reason),
            ScanEvent::Observed {
                id,
                name,
                classification,
                standard,
                member,
            } => watch_info!(
                "{} (id {}): {:?} at {} / {} member",
                name,
                id,
                classification,
                standard,
                member
            ),
            ScanEvent::NotificationFailed { id: Some(id) } => {
                watch_warn!("Notification for product {} queued for retry", id)
            }
            ScanEvent::NotificationFailed { id: None } => {
                watch_warn!("Best value notification queued for retry")
            }
            ScanEvent::SummarySent { delivered } => {
                watch_info!("Best value summary sent (delivered: {})", delivered)
            }
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub primary: String,
    pub error: String,
}

/// How each price image on a page is prepared for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageModes {
    pub standard: DecodeMode,
    pub member: DecodeMode,
}

impl Default for ImageModes {
    fn default() -> Self {
        Self {
            standard: DecodeMode::Opaque,
            member: DecodeMode::Transparent,
        }
    }
}

/// Why one record could not be observed this pass.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Charset(#[from] PageDecodeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("{field} price: {source}")]
    Decode {
        field: &'static str,
        source: PriceDecodeError,
    },
    #[error(transparent)]
    OutOfRange(#[from] SavingOutOfRange),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub skipped: usize,
    pub disabled: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub notifications_failed: usize,
    pub summary_sent: bool,
}

pub struct Scanner<'a> {
    fetcher: &'a dyn Fetcher,
    extractor: &'a FieldExtractor,
    reader: &'a dyn PriceReader,
    notifier: &'a WebhookNotifier,
    sink: &'a dyn ScanSink,
    destinations: Destinations,
    rules: DetectionRules,
    modes: ImageModes,
}

impl<'a> Scanner<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        extractor: &'a FieldExtractor,
        reader: &'a dyn PriceReader,
        notifier: &'a WebhookNotifier,
        sink: &'a dyn ScanSink,
        destinations: Destinations,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            reader,
            notifier,
            sink,
            destinations,
            rules: DetectionRules::default(),
            modes: ImageModes::default(),
        }
    }

    pub fn with_rules(mut self, rules: DetectionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_image_modes(mut self, modes: ImageModes) -> Self {
        self.modes = modes;
        self
    }

    /// Loads the store, scans it and writes it back once.
    ///
    /// Nothing is fetched when the load fails. A failed save is returned
    /// after notifications have already gone out.
    pub async fn run_pass(&self, store_path: &Path) -> Result<ScanReport, ScanError> {
        let store = ProductStore::open(store_path)?;
        let records = store.load()?;
        watch_info!("Loaded {} product(s) from {:?}", records.len(), store.path());

        let (records, report) = self.scan(records).await;

        if let Err(err) = store.save(&records) {
            watch_error!("Failed to save product data: {}", err);
            return Err(err.into());
        }
        Ok(report)
    }

    /// Scans `records` in order and returns their replacements.
    pub async fn scan(&self, mut records: Vec<ProductRecord>) -> (Vec<ProductRecord>, ScanReport) {
        let mut report = ScanReport::default();

        for slot in records.iter_mut() {
            if slot.is_disabled() {
                report.skipped += 1;
                self.sink.emit(ScanEvent::Skipped { id: slot.id.clone() });
                continue;
            }

            if slot.error_limit_reached() {
                slot.error = DISABLED;
                report.disabled += 1;
                self.sink.emit(ScanEvent::Disabled {
                    id: slot.id.clone(),
                    name: slot.name.clone(),
                });
                let notice = message::error_limit(slot);
                if !self.notifier.notify(&notice, &self.destinations.error).await {
                    report.notifications_failed += 1;
                    self.sink.emit(ScanEvent::NotificationFailed {
                        id: Some(slot.id.clone()),
                    });
                }
                continue;
            }

            slot.error += 1;

            let detection = match self.observe(slot).await {
                Ok(detection) => detection,
                Err(err) => {
                    report.failed += 1;
                    self.sink.emit(ScanEvent::RecordFailed {
                        id: slot.id.clone(),
                        attempts: slot.error,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            *slot = detection.record;
            self.sink.emit(ScanEvent::Observed {
                id: slot.id.clone(),
                name: slot.name.clone(),
                classification: detection.classification,
                standard: message::format_price(slot.price),
                member: message::format_price(slot.price_gold),
            });

            if detection.classification == Classification::Unchanged {
                report.unchanged += 1;
            } else {
                report.changed += 1;
            }

            if let Some(notice) = detection.message {
                if !self.notifier.notify(&notice, &self.destinations.primary).await {
                    report.notifications_failed += 1;
                    self.sink.emit(ScanEvent::NotificationFailed {
                        id: Some(slot.id.clone()),
                    });
                }
            }
        }

        if report.changed > 0 {
            if let Some(summary) = best_value_summary(&records) {
                let delivered = self.notifier.notify(&summary, &self.destinations.primary).await;
                if !delivered {
                    report.notifications_failed += 1;
                    self.sink.emit(ScanEvent::NotificationFailed { id: None });
                }
                report.summary_sent = true;
                self.sink.emit(ScanEvent::SummarySent { delivered });
            }
        }

        (records, report)
    }

    /// Reads the record's page and runs the detector against it.
    async fn observe(&self, record: &ProductRecord) -> Result<Detection, RecordError> {
        let url = record.url.as_str();
        let output = self.fetcher.fetch(url).await?;
        let page = decode_page(&output)?;
        let fields = self.extractor.extract(&page.html)?;
        if let Some(name) = &fields.name {
            watch_debug!("Page {} names the product {:?}", url, name);
        }

        let standard = self
            .reader
            .read_price(&fields.standard_price_image, self.modes.standard)
            .map_err(|source| RecordError::Decode {
                field: "standard",
                source,
            })?;
        let member = self
            .reader
            .read_price(&fields.member_price_image, self.modes.member)
            .map_err(|source| RecordError::Decode {
                field: "member",
                source,
            })?;

        let observed = ObservedPrices { standard, member };
        Ok(detect(record, observed, &self.rules)?)
    }
}
