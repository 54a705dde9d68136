//! The static bundle descriptor table.
//!
//! Every asset bundle the device can carry is described once here: its
//! identity, which install variants want it, whether it is scoped to a CPU
//! architecture, where it lands on disk, and how aggressively failures roll
//! back. Both the installer and the restore agent consume this table, so a
//! bundle added here is automatically installable, backed up, and restorable.
//!
//! A bundle's destination directory is its identity: if the directory
//! exists, the bundle is considered installed and is never re-fetched
//! automatically. Forcing a refresh means relocating the live directory into
//! the bundle vault first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::PathsConfig;
use crate::core::GambitError;

/// Host CPU architectures with published bundle sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostArch {
    /// 64-bit ARM (the production device hardware)
    Aarch64,
    /// 64-bit x86 (development machines and the desktop build)
    X86_64,
}

impl HostArch {
    /// Detect the architecture of the running host.
    ///
    /// Anything without a published bundle set is rejected up front, before
    /// any network activity.
    pub fn detect() -> Result<Self, GambitError> {
        Self::from_name(std::env::consts::ARCH)
    }

    /// Parse an architecture name as used in bundle names and CLI arguments.
    pub fn from_name(name: &str) -> Result<Self, GambitError> {
        match name {
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            other => Err(GambitError::UnsupportedArchitecture {
                arch: other.to_string(),
            }),
        }
    }

    /// The canonical name used in bundle names and directory layout.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Install variants.
///
/// `small` covers the core playing stack; `lite` adds the retro-emulation
/// engines and narrated-replay audio on devices with the storage for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Architecture engine set plus universal weight/script bundles
    #[default]
    Small,
    /// Everything in `small` plus emulation, auxiliary engines, and audio
    Lite,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Self::Small),
            "lite" => Ok(Self::Lite),
            other => Err(format!("unknown variant '{other}' (expected 'small' or 'lite')")),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Small => "small",
            Self::Lite => "lite",
        })
    }
}

/// Bundle classes, matching the update reasons that refresh them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleClass {
    /// Engine binaries, weights, emulation, audio
    Engines,
    /// Opening books and game archives
    BooksGames,
}

/// Where a bundle lands relative to the configured roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    /// `<asset_root>/<arch>`
    ArchDir,
    /// `<asset_root>/<sub>`
    Sub(&'static str),
    /// `<asset_root>/<sub>/<arch>`
    SubArch(&'static str),
    /// The configured books root
    Books,
    /// The configured games root
    Games,
}

/// One row of the bundle table.
#[derive(Debug, Clone, Copy)]
pub struct BundleSpec {
    id: &'static str,
    class: BundleClass,
    dest: Destination,
    /// Bundle exists per-architecture; its name and URL carry the arch suffix.
    arch_scoped: bool,
    /// Installed by the `small` variant (everything is installed by `lite`).
    in_small: bool,
    /// Roll back from the vault when the download itself fails, not just
    /// when extraction fails. Set for the bundles the application cannot
    /// start without.
    restore_on_fetch_failure: bool,
}

/// The bundle table, in install order.
///
/// Order matters: the architecture engine set creates the asset root layout
/// that later bundles extract into, and installs are strictly sequential.
pub const BUNDLES: &[BundleSpec] = &[
    BundleSpec {
        id: "engines",
        class: BundleClass::Engines,
        dest: Destination::ArchDir,
        arch_scoped: true,
        in_small: true,
        restore_on_fetch_failure: true,
    },
    BundleSpec {
        id: "nn-weights",
        class: BundleClass::Engines,
        dest: Destination::Sub("nn"),
        arch_scoped: false,
        in_small: true,
        restore_on_fetch_failure: true,
    },
    BundleSpec {
        id: "engine-scripts",
        class: BundleClass::Engines,
        dest: Destination::Sub("scripts"),
        arch_scoped: false,
        in_small: true,
        restore_on_fetch_failure: false,
    },
    BundleSpec {
        id: "retro-emulation",
        class: BundleClass::Engines,
        dest: Destination::Sub("emulation"),
        arch_scoped: false,
        in_small: false,
        restore_on_fetch_failure: false,
    },
    BundleSpec {
        id: "retro-engines",
        class: BundleClass::Engines,
        dest: Destination::SubArch("retro"),
        arch_scoped: true,
        in_small: false,
        restore_on_fetch_failure: false,
    },
    BundleSpec {
        id: "replay-audio",
        class: BundleClass::Engines,
        dest: Destination::Sub("audio"),
        arch_scoped: false,
        in_small: false,
        restore_on_fetch_failure: false,
    },
    BundleSpec {
        id: "books",
        class: BundleClass::BooksGames,
        dest: Destination::Books,
        arch_scoped: false,
        in_small: true,
        restore_on_fetch_failure: false,
    },
    BundleSpec {
        id: "games",
        class: BundleClass::BooksGames,
        dest: Destination::Games,
        arch_scoped: false,
        in_small: true,
        restore_on_fetch_failure: false,
    },
];

impl BundleSpec {
    /// The class this bundle belongs to.
    pub const fn class(&self) -> BundleClass {
        self.class
    }

    /// Whether this bundle is scoped to a CPU architecture.
    pub const fn arch_scoped(&self) -> bool {
        self.arch_scoped
    }

    /// Whether a failed download (not just a failed extraction) rolls the
    /// bundle back from the vault.
    pub const fn restore_on_fetch_failure(&self) -> bool {
        self.restore_on_fetch_failure
    }

    /// The bundle's resolved name for an architecture, as used in archive
    /// names and the vault layout.
    pub fn name(&self, arch: HostArch) -> String {
        if self.arch_scoped {
            format!("{}-{}", self.id, arch.name())
        } else {
            self.id.to_string()
        }
    }

    /// Whether this bundle is part of the given variant.
    pub const fn in_variant(&self, variant: Variant) -> bool {
        match variant {
            Variant::Small => self.in_small,
            Variant::Lite => true,
        }
    }

    /// The archive URL for this bundle.
    pub fn source_url(&self, base_url: &str, arch: HostArch) -> String {
        format!("{}/{}.tar.gz", base_url.trim_end_matches('/'), self.name(arch))
    }

    /// The destination directory for this bundle.
    pub fn destination(&self, paths: &PathsConfig, arch: HostArch) -> PathBuf {
        match self.dest {
            Destination::ArchDir => paths.asset_root.join(arch.name()),
            Destination::Sub(sub) => paths.asset_root.join(sub),
            Destination::SubArch(sub) => paths.asset_root.join(sub).join(arch.name()),
            Destination::Books => paths.books_root.clone(),
            Destination::Games => paths.games_root.clone(),
        }
    }
}

/// Bundles of one class applicable to a variant, in install order.
pub fn bundles_for(class: BundleClass, variant: Variant) -> Vec<&'static BundleSpec> {
    BUNDLES
        .iter()
        .filter(|b| b.class == class && b.in_variant(variant))
        .collect()
}

/// Look up a bundle by resolved name (e.g. `engines-aarch64` or `books`).
pub fn find_bundle(name: &str, arch: HostArch) -> Option<&'static BundleSpec> {
    BUNDLES.iter().find(|b| b.name(arch) == name)
}
