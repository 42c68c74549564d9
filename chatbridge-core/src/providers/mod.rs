//! Provider descriptors, resolution and request-body construction
//!
//! A provider is any upstream chat backend, however non-standard its wire
//! format, that an operator has described with a descriptor directory.

pub mod descriptor;
pub mod error;
pub mod payload;
pub mod registry;

pub use descriptor::{HeaderBlock, ProviderDescriptor, ProviderMetadata, TemplateSchema};
pub use error::{RegistryError, RegistryResult};
pub use payload::{build_payload, instantiate_message, MessageSubstitutions, TIMESTAMP_GAP_SECS};
pub use registry::{resolve, ProviderRegistry, MODEL_PROVIDER_RULES};
