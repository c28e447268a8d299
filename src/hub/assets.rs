//! Pretrained asset catalogue
//!
//! Every file the engine may need from the network: the pretrained base
//! weights for each (role, sample-rate tier) pair, plus the two embedder
//! weight files.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::embedder::EmbedderFamily;

/// Pretrained checkpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetRole {
    /// Discriminator
    D,
    /// Generator
    G,
    /// Pitch-aware discriminator
    F0D,
    /// Pitch-aware generator
    F0G,
}

impl AssetRole {
    pub const ALL: [AssetRole; 4] = [AssetRole::D, AssetRole::G, AssetRole::F0D, AssetRole::F0G];

    pub fn prefix(&self) -> &'static str {
        match self {
            AssetRole::D => "D",
            AssetRole::G => "G",
            AssetRole::F0D => "f0D",
            AssetRole::F0G => "f0G",
        }
    }
}

/// Supported target sample-rate tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SampleRateTier {
    Khz32,
    Khz40,
    Khz48,
}

impl SampleRateTier {
    pub const ALL: [SampleRateTier; 3] = [
        SampleRateTier::Khz32,
        SampleRateTier::Khz40,
        SampleRateTier::Khz48,
    ];

    pub fn hz(&self) -> u32 {
        match self {
            SampleRateTier::Khz32 => 32_000,
            SampleRateTier::Khz40 => 40_000,
            SampleRateTier::Khz48 => 48_000,
        }
    }

    /// Tag used in file names (`32k`)
    pub fn tag(&self) -> &'static str {
        match self {
            SampleRateTier::Khz32 => "32k",
            SampleRateTier::Khz40 => "40k",
            SampleRateTier::Khz48 => "48k",
        }
    }
}

impl fmt::Display for SampleRateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What an asset is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetKind {
    Pretrained {
        role: AssetRole,
        tier: SampleRateTier,
    },
    Embedder(EmbedderFamily),
}

/// One downloadable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PretrainedAsset {
    pub kind: AssetKind,
    pub url: String,
    pub destination: PathBuf,
}

impl PretrainedAsset {
    /// File name of the destination
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_present(&self) -> bool {
        self.destination.is_file()
    }
}

/// The full set of assets for one models directory
#[derive(Debug, Clone)]
pub struct AssetCatalogue {
    assets: Vec<PretrainedAsset>,
}

impl AssetCatalogue {
    /// Catalogue for `models_dir`, fetching from the two repositories given
    pub fn new(models_dir: &Path, pretrained_repo_url: &str, contentvec_url: &str) -> Self {
        let pretrained_repo_url = pretrained_repo_url.trim_end_matches('/');
        let contentvec_url = contentvec_url.trim_end_matches('/');
        let pretrained_dir = models_dir.join("pretrained");

        let mut assets = Vec::with_capacity(AssetRole::ALL.len() * SampleRateTier::ALL.len() + 2);
        for tier in SampleRateTier::ALL {
            for role in AssetRole::ALL {
                let name = format!("{}{}.pth", role.prefix(), tier.tag());
                assets.push(PretrainedAsset {
                    kind: AssetKind::Pretrained { role, tier },
                    url: format!("{}/{}", pretrained_repo_url, name),
                    destination: pretrained_dir.join(&name),
                });
            }
        }

        for (family, base_url) in [
            (EmbedderFamily::HubertBase, pretrained_repo_url),
            (EmbedderFamily::ContentVec, contentvec_url),
        ] {
            let name = family.weight_file();
            assets.push(PretrainedAsset {
                kind: AssetKind::Embedder(family),
                url: format!("{}/{}", base_url, name),
                destination: models_dir.join(name),
            });
        }

        Self { assets }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            &config.models_dir,
            &config.pretrained_repo_url,
            &config.contentvec_url,
        )
    }

    pub fn assets(&self) -> &[PretrainedAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets whose destination file does not exist yet
    pub fn missing(&self) -> Vec<&PretrainedAsset> {
        self.assets.iter().filter(|a| !a.is_present()).collect()
    }
}
