// Gallery, poster and upload files served straight from disk

use crate::http::AppState;
use axum::Router;
use savi_core::config::AssetsConfig;
use tower_http::services::ServeDir;
use tracing::info;

/// One `ServeDir` per asset prefix. `ServeDir` rejects `..` segments and
/// answers 404 for anything outside its root.
pub fn asset_routes(assets: &AssetsConfig) -> Router<AppState> {
    let mounts = [
        (&assets.gallery_prefix, assets.gallery_dir()),
        (&assets.posters_prefix, assets.posters_dir()),
        (&assets.uploads_prefix, assets.uploads_dir()),
    ];

    mounts
        .into_iter()
        .fold(Router::new(), |router, (prefix, dir)| {
            info!("Serving /{} from {}", prefix, dir.display());
            router.nest_service(&format!("/{}", prefix), ServeDir::new(dir))
        })
}
