// Read-only catalog of gallery videos, built once at startup

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];
const POSTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    /// File stem, unique within the gallery
    pub id: String,
    /// URL path relative to the server root, e.g. `gallery/dog.mp4`
    pub path: String,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoCatalog {
    videos: Vec<Video>,
}

impl VideoCatalog {
    pub fn new(mut videos: Vec<Video>) -> Self {
        videos.sort_by(|a, b| a.id.cmp(&b.id));
        Self { videos }
    }

    /// Scan `gallery_dir` for videos, pairing each with a same-stem image in
    /// `posters_dir` when one exists. A missing gallery directory yields an
    /// empty catalog.
    pub fn scan(
        gallery_dir: &Path,
        gallery_prefix: &str,
        posters_dir: &Path,
        posters_prefix: &str,
    ) -> Result<Self> {
        if !gallery_dir.is_dir() {
            warn!("Gallery directory {} not found, catalog is empty", gallery_dir.display());
            return Ok(Self::default());
        }

        let mut videos = Vec::new();
        for entry in std::fs::read_dir(gallery_dir)? {
            let path = entry?.path();
            if !path.is_file() || !has_extension(&path, VIDEO_EXTENSIONS) {
                continue;
            }
            let (Some(stem), Some(file_name)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.file_name().and_then(|s| s.to_str()),
            ) else {
                continue;
            };

            let poster_path = POSTER_EXTENSIONS.iter().find_map(|ext| {
                let poster = format!("{}.{}", stem, ext);
                posters_dir
                    .join(&poster)
                    .is_file()
                    .then(|| format!("{}/{}", posters_prefix, poster))
            });

            debug!("Catalog video {} (poster: {:?})", file_name, poster_path);
            videos.push(Video {
                id: stem.to_string(),
                path: format!("{}/{}", gallery_prefix, file_name),
                poster_path,
            });
        }

        Ok(Self::new(videos))
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn get(&self, id: &str) -> Option<&Video> {
        self.videos.iter().find(|v| v.id == id)
    }

    /// First video in id order
    pub fn default_video(&self) -> Option<&Video> {
        self.videos.first()
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
