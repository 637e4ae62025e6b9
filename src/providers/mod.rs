//! Remote service integrations
//!
//! ```text
//!              ┌──────────────────────┐
//!              │  GenerationPipeline  │
//!              └──────────┬───────────┘
//!                         │
//!         ┌───────────────┴───────────────┐
//!         │                               │
//! ┌───────┴──────────┐          ┌─────────┴─────────┐
//! │ IdentityProvider │          │  ImageGenerator   │
//! │ (Supabase auth)  │          │ (inference API)   │
//! └──────────────────┘          └───────────────────┘
//! ```

pub mod traits;
pub mod http_client;
pub mod identity;
pub mod inference;

// Re-export commonly used types
pub use traits::{
    GeneratedImage,
    IdentityProvider,
    ImageContentType,
    ImageGenerator,
    ProviderError,
    ProviderResult,
};
pub use http_client::build_http_client;
pub use identity::SupabaseIdentity;
pub use inference::InferenceClient;
