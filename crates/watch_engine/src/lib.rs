//! Voucher watch engine: page fetch, price OCR, storage, notification
//! delivery and the scan pass that ties them together.
mod charset;
mod extract;
mod fetch;
mod notify;
mod persist;
mod price_image;
mod queue;
mod scan;
mod store;
mod types;

pub use charset::{decode_page, PageDecodeError, PageText};
pub use extract::{ExtractError, FieldExtractor, PageFields, PageSelectors};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use notify::{Attempt, Clock, DrainReport, NotifyError, WebhookNotifier};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use price_image::{
    binarize, otsu_level, parse_price_text, prepare, DecodeMode, PriceDecodeError,
    PriceImageDecoder, PriceReader, Recognizer, TesseractRecognizer, PADDING, PRICE_ALPHABET,
};
pub use queue::{unit_name, QueueError, QueuedNotification, RetryQueue, UNIT_SUFFIX};
pub use scan::{
    Destinations, ImageModes, LogSink, RecordError, ScanError, ScanReport, ScanSink, Scanner,
};
pub use store::{ProductStore, StoreError};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, ScanEvent};
