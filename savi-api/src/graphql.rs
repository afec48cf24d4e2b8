// GraphQL API over the video catalog and the engine's sessions

use async_graphql::{Context, EmptySubscription, Object, Result as GqlResult, Schema, SimpleObject, ID};
use savi_core::{Video as CatalogVideo, VideoCatalog};
use savi_inference::{InferenceEngine, SessionInfo};
use std::sync::Arc;
use tracing::info;

/// GraphQL schema root
pub type SaviSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema. The engine handle and catalog are the resolvers' context.
pub fn create_schema(engine: Arc<dyn InferenceEngine>, catalog: Arc<VideoCatalog>) -> SaviSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(engine)
        .data(catalog)
        .limit_complexity(1000)
        .limit_depth(10)
        .finish()
}

#[derive(SimpleObject, Debug, Clone)]
pub struct Video {
    pub id: ID,
    pub path: String,
    pub poster_path: Option<String>,
}

impl From<&CatalogVideo> for Video {
    fn from(video: &CatalogVideo) -> Self {
        Self {
            id: ID(video.id.clone()),
            path: video.path.clone(),
            poster_path: video.poster_path.clone(),
        }
    }
}

#[derive(SimpleObject, Debug, Clone)]
pub struct Session {
    pub session_id: ID,
    pub total_frames: Option<u64>,
    pub object_count: u32,
}

impl From<SessionInfo> for Session {
    fn from(info: SessionInfo) -> Self {
        Self {
            session_id: ID(info.session_id),
            total_frames: info.total_frames,
            object_count: u32::try_from(info.object_count).unwrap_or(u32::MAX),
        }
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All gallery videos
    async fn videos(&self, ctx: &Context<'_>) -> GqlResult<Vec<Video>> {
        let catalog = ctx.data::<Arc<VideoCatalog>>()?;
        Ok(catalog.videos().iter().map(Video::from).collect())
    }

    async fn video(&self, ctx: &Context<'_>, id: ID) -> GqlResult<Option<Video>> {
        let catalog = ctx.data::<Arc<VideoCatalog>>()?;
        Ok(catalog.get(id.as_str()).map(Video::from))
    }

    /// Video shown when the client has not picked one
    async fn default_video(&self, ctx: &Context<'_>) -> GqlResult<Option<Video>> {
        let catalog = ctx.data::<Arc<VideoCatalog>>()?;
        Ok(catalog.default_video().map(Video::from))
    }

    async fn session(&self, ctx: &Context<'_>, session_id: ID) -> GqlResult<Option<Session>> {
        let engine = ctx.data::<Arc<dyn InferenceEngine>>()?;
        Ok(engine.session(session_id.as_str()).map(Session::from))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Drop a session's engine state. Returns false for unknown sessions.
    async fn close_session(&self, ctx: &Context<'_>, session_id: ID) -> GqlResult<bool> {
        let engine = ctx.data::<Arc<dyn InferenceEngine>>()?;
        let closed = engine.close_session(session_id.as_str());
        info!("Close session {}: {}", session_id.as_str(), closed);
        Ok(closed)
    }
}
