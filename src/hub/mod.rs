//! Pretrained asset management
//!
//! # Directory Structure
//!
//! ```text
//! <models>/
//! ├── hubert_base.pt
//! ├── checkpoint_best_legacy_500.pt
//! └── pretrained/
//!     ├── D32k.pth  G32k.pth  f0D32k.pth  f0G32k.pth
//!     ├── D40k.pth  ...
//!     └── ...
//! ```
//!
//! # Usage
//! ```rust,ignore
//! use sdkwork_vc::hub::{AssetCatalogue, AssetFetcher};
//!
//! let catalogue = AssetCatalogue::from_config(&config);
//! let report = AssetFetcher::new().ensure_assets_present(&catalogue).await?;
//! ```

mod assets;
mod fetcher;

pub use assets::{AssetCatalogue, AssetKind, AssetRole, PretrainedAsset, SampleRateTier};
pub use fetcher::{AssetFetcher, FetchReport};
