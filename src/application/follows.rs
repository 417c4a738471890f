//! The follow graph: directed "user follows author" edges.
//!
//! Both transitions are idempotent: following twice leaves one edge,
//! unfollowing a missing edge is a no-op, and a self-follow is silently
//! ignored rather than rejected. The store enforces uniqueness per pair.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>) -> Self {
        Self { follows }
    }

    /// Create the edge unless it already exists or the user is the author.
    pub async fn follow(&self, user: Uuid, author: Uuid) -> Result<(), FollowError> {
        if user == author {
            debug!(target = "cortile::follows", %user, "ignoring self-follow");
            return Ok(());
        }

        let inserted = self.follows.insert_edge(user, author).await?;
        if !inserted {
            debug!(target = "cortile::follows", %user, %author, "edge already present");
        }
        Ok(())
    }

    /// Remove the edge if present.
    pub async fn unfollow(&self, user: Uuid, author: Uuid) -> Result<(), FollowError> {
        let removed = self.follows.delete_edge(user, author).await?;
        if !removed {
            debug!(target = "cortile::follows", %user, %author, "edge already absent");
        }
        Ok(())
    }

    pub async fn is_following(&self, viewer: Uuid, author: Uuid) -> Result<bool, FollowError> {
        Ok(self.follows.edge_exists(viewer, author).await?)
    }
}
