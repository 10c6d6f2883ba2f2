mod published_version;
mod tag;

pub use published_version::PublishedVersion;
pub use tag::{UNTAGGED, sanitize_tag};
