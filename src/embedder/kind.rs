//! Supported embedders and their logical aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::VcError;

/// Physical embedder weight file; aliases within one family share it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbedderFamily {
    HubertBase,
    ContentVec,
}

impl EmbedderFamily {
    /// Weight file name, relative to the models root
    pub fn weight_file(&self) -> &'static str {
        match self {
            EmbedderFamily::HubertBase => "hubert_base.pt",
            EmbedderFamily::ContentVec => "checkpoint_best_legacy_500.pt",
        }
    }
}

impl fmt::Display for EmbedderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedderFamily::HubertBase => write!(f, "hubert_base"),
            EmbedderFamily::ContentVec => write!(f, "contentvec"),
        }
    }
}

/// Which hidden layer is read and whether the final projection is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLayout {
    /// Layer 9 output passed through the final projection (256 wide)
    Projected,
    /// Layer 12 output, unprojected (768 wide)
    Raw,
}

impl OutputLayout {
    pub fn width(&self) -> usize {
        match self {
            OutputLayout::Projected => 256,
            OutputLayout::Raw => 768,
        }
    }

    pub fn layer(&self) -> usize {
        match self {
            OutputLayout::Projected => 9,
            OutputLayout::Raw => 12,
        }
    }
}

/// Logical embedder name as stored in checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbedderKind {
    #[serde(rename = "hubert_base")]
    HubertBase,
    #[serde(rename = "hubert_base768")]
    HubertBase768,
    #[serde(rename = "contentvec")]
    ContentVec,
    #[serde(rename = "contentvec768")]
    ContentVec768,
}

impl EmbedderKind {
    pub const ALL: [EmbedderKind; 4] = [
        EmbedderKind::HubertBase,
        EmbedderKind::HubertBase768,
        EmbedderKind::ContentVec,
        EmbedderKind::ContentVec768,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EmbedderKind::HubertBase => "hubert_base",
            EmbedderKind::HubertBase768 => "hubert_base768",
            EmbedderKind::ContentVec => "contentvec",
            EmbedderKind::ContentVec768 => "contentvec768",
        }
    }

    pub fn family(&self) -> EmbedderFamily {
        match self {
            EmbedderKind::HubertBase | EmbedderKind::HubertBase768 => EmbedderFamily::HubertBase,
            EmbedderKind::ContentVec | EmbedderKind::ContentVec768 => EmbedderFamily::ContentVec,
        }
    }

    pub fn layout(&self) -> OutputLayout {
        match self {
            EmbedderKind::HubertBase | EmbedderKind::ContentVec => OutputLayout::Projected,
            EmbedderKind::HubertBase768 | EmbedderKind::ContentVec768 => OutputLayout::Raw,
        }
    }

    /// Feature width the synthesizer receives
    pub fn output_width(&self) -> usize {
        self.layout().width()
    }
}

impl FromStr for EmbedderKind {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmbedderKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| VcError::UnsupportedEmbedder {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
