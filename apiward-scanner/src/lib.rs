pub mod crawler;
pub mod error;
pub mod normalize;
pub mod observer;
pub mod resolver;
pub mod result;

pub use crawler::{CrawlConfig, Crawler, ProgressCallback};
pub use error::{FetchError, ScanError};
pub use normalize::{has_no_extension, normalize_url};
pub use observer::{
    BrowserObserver, NetworkEvent, ObserverConfig, PageObserver, Settle, observe_pages,
    observe_with_browser, wait_for_network_idle,
};
pub use resolver::{ResolveOptions, resolve, resolve_with};
pub use result::{CrawlSummary, Direction, ObservedCall, PageCalls, ResourceKind};
