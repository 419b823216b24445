//! Reference shape lookup: rendered views and point clouds of CAD models.

use crate::error::PoseError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const VIEW_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const POINT_CLOUD_EXTENSION: &str = "ply";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Rendered view images of one model, sorted by file name.
pub fn list_views(model_dir: &Path) -> Result<Vec<PathBuf>, PoseError> {
    if !model_dir.is_dir() {
        return Err(PoseError::dataset(format!(
            "render directory not found: {}",
            model_dir.display()
        )));
    }
    let mut views: Vec<PathBuf> = WalkDir::new(model_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, VIEW_EXTENSIONS))
        .collect();
    views.sort();
    Ok(views)
}

/// Pick `num_render` views spread over `tour` elevation rings.
///
/// The sorted views are split into `tour` consecutive rings of equal size and
/// `num_render / tour` views are taken evenly spaced in azimuth from each ring.
pub fn select_views(
    views: &[PathBuf],
    num_render: usize,
    tour: usize,
) -> Result<Vec<PathBuf>, PoseError> {
    if tour == 0 || num_render == 0 {
        return Err(PoseError::invalid_input(
            "num_render and tour must be positive",
        ));
    }
    if num_render % tour != 0 {
        return Err(PoseError::invalid_input(format!(
            "num_render ({num_render}) must be divisible by tour ({tour})"
        )));
    }
    if views.len() < num_render {
        return Err(PoseError::dataset(format!(
            "only {} rendered views available, {num_render} requested",
            views.len()
        )));
    }

    let ring_size = views.len() / tour;
    let per_ring = num_render / tour;
    let selected = (0..tour)
        .flat_map(|ring| {
            (0..per_ring).map(move |i| ring * ring_size + i * ring_size / per_ring)
        })
        .map(|idx| views[idx].clone())
        .collect();
    Ok(selected)
}

/// Model ids that have a render directory for this category.
pub fn list_render_models(category_dir: &Path) -> Vec<String> {
    let mut models: Vec<String> = WalkDir::new(category_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    models.sort();
    models
}

/// Model ids that have a point cloud for this category.
pub fn list_point_cloud_models(category_dir: &Path) -> Vec<String> {
    let mut models: Vec<String> = WalkDir::new(category_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), &[POINT_CLOUD_EXTENSION]))
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();
    models.sort();
    models
}

/// Point cloud file of a model.
pub fn point_cloud_path(category_dir: &Path, model_id: &str) -> PathBuf {
    category_dir.join(format!("{model_id}.{POINT_CLOUD_EXTENSION}"))
}
