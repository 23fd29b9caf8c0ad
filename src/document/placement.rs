//! Where a saved document and its assets land on disk.
//!
//! Markdown always keeps assets in a `<name>_assets` sidecar directory. HTML with
//! assets is bundled into a `<name>/` directory, unless it already lives in one,
//! so repeated saves do not nest `<name>/<name>/...`.

use std::path::{Path, PathBuf};

use super::{DocumentFormat, detect_format};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    Sidecar,
    Bundled,
    InPlace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlan {
    pub strategy: PlacementStrategy,
    /// Authoritative path of the written document; the editor adopts it.
    pub document: PathBuf,
    pub asset_dir: PathBuf,
    pub create_asset_dir: bool,
}

pub fn plan_save(requested: &Path, has_assets: bool) -> SavePlan {
    let dir = requested.parent().unwrap_or_else(|| Path::new(""));
    let file_name = requested.file_name().unwrap_or_default();
    let base_name = requested
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    if detect_format(requested) == DocumentFormat::Markdown {
        return SavePlan {
            strategy: PlacementStrategy::Sidecar,
            document: requested.to_path_buf(),
            asset_dir: dir.join(format!("{base_name}_assets")),
            create_asset_dir: has_assets,
        };
    }

    let parent_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if has_assets && !same_name(&parent_name, &base_name) {
        let bundle = dir.join(&base_name);
        SavePlan {
            strategy: PlacementStrategy::Bundled,
            document: bundle.join(file_name),
            asset_dir: bundle,
            create_asset_dir: true,
        }
    } else {
        SavePlan {
            strategy: PlacementStrategy::InPlace,
            document: requested.to_path_buf(),
            asset_dir: dir.to_path_buf(),
            create_asset_dir: false,
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
