//! seqgate Processor - Request processing
//!
//! This crate turns parsed requests into replies:
//! - One processor per request kind (resolve, get-blob, named annotations, get)
//! - Seq-id resolution through caches, the persistent cache and the database
//! - Fetch groups that run database queries as tasks and route their events
//! - The reply sink seam, gateway context and counters

pub mod annot;
pub mod blob;
pub mod context;
pub mod factory;
pub mod fetch_group;
pub mod get;
pub mod get_blob;
pub mod metrics;
pub mod processor;
pub mod reply;
pub mod request;
pub mod resolve;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use annot::AnnotProcessor;
pub use context::{spawn_exclude_purge, GatewayContext};
pub use factory::{Dispatcher, ProcessorFactory};
pub use fetch_group::{FetchGroup, FetchPurpose};
pub use get::GetProcessor;
pub use get_blob::GetBlobProcessor;
pub use metrics::{DataSource, GatewayCounters, LookupKind, RequestKind};
pub use processor::{drive, Processor, ProcessorCore, ProcessorHandle, ProcessorStatus};
pub use reply::{
    BufferedReply, ExcludeReason, ReplyFrame, ReplyItem, ReplyMessage, ReplySink, ReplyWriter,
    Severity,
};
pub use request::{
    AnnotRequest, CacheMode, GetBlobRequest, GetRequest, Request, ResolveRequest,
};
pub use resolve::ResolveProcessor;
pub use resolver::{Resolution, Resolver};
