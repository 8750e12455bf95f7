pub mod asset;
pub mod cache;
pub mod codec;
pub mod config;
pub mod exception;
pub mod middleware;
pub mod mime;
pub mod negotiator;
pub mod param;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod sender;
pub mod source;
pub mod util;

pub use asset::{Asset, AssetBuilder};
pub use cache::{store_from_capacity, CacheStore, LruStore, MemoryStore};
pub use config::{Config, GzipOptions};
pub use exception::Exception;
pub use middleware::{Flow, StaticGzip};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use sender::{FsSender, SendOptions, StaticSender};
pub use source::{FileSource, FileStat, LocalFs};
pub use util::HtmlBuilder;
