pub mod cache;
pub mod dedup;
pub mod lookup;
pub mod resolver;
pub mod wikipedia;

pub use cache::IdentityCache;
pub use dedup::{DedupConfig, DedupPaths, DedupReport, deduplicate, deduplicate_file};
pub use lookup::{IdentityLookup, NoLookup};
pub use resolver::{IdentityResolver, Resolution, ResolverConfig, ResolverStats};
pub use wikipedia::{WikipediaConfig, WikipediaLookup};
