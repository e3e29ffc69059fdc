pub mod codec;
pub mod discovery;
pub mod driver;
pub mod memory;
pub mod transport;

#[cfg(feature = "pcsc")]
pub mod reader;

pub use discovery::DiscoveryConfig;
pub use driver::{TagDriver, TagId};
pub use memory::MemoryTag;

#[cfg(feature = "pcsc")]
pub use reader::NfcReader;
