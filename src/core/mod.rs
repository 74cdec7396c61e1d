//! Building blocks shared by the host and the client: hashing, parsing and layers.

mod hash;
mod layer;
mod parser;

pub use hash::{ConfigurationResource, HashProvider, Sha256HashProvider, default_hash_provider};
pub use layer::{Layer, Snapshot, merge_layers};
pub(crate) use layer::lookup;
pub use parser::{FormatParser, JsonParser, Parser};
