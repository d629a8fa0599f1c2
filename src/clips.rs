use crate::error::ServiceError;
use crate::models::{Clip, InteractionCounts, InteractionKind, NewClip};
use crate::storage::StateStore;
use chrono::Utc;
use std::sync::Arc;

pub struct ClipService {
    store: Arc<StateStore>,
    public_base_url: String,
}

impl ClipService {
    pub fn new(store: Arc<StateStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn list_clips(&self) -> Vec<Clip> {
        self.store.read(|store| store.clips.clone()).await
    }

    /// Records a clip for a file already written by the upload handler.
    pub async fn create_clip(&self, meta: NewClip, file_name: &str) -> Result<Clip, ServiceError> {
        let video_url = self.video_url(file_name);
        let now = Utc::now().timestamp_millis();

        let clip = self
            .store
            .mutate(|store| {
                let clip = Clip::new(next_clip_id(now, &store.clips), meta, video_url);
                store.clips.push(clip.clone());
                Ok::<_, ServiceError>(clip)
            })
            .await?;

        tracing::info!(id = %clip.id, title = %clip.title, uploader = %clip.uploader, "Clip created");
        Ok(clip)
    }

    /// Removes the clip if present. A missing id is not an error.
    pub async fn delete_clip(&self, id: &str) -> Result<(), ServiceError> {
        let removed = self
            .store
            .mutate(|store| {
                let before = store.clips.len();
                store.clips.retain(|c| c.id != id);
                Ok::<_, ServiceError>(before != store.clips.len())
            })
            .await?;

        tracing::info!(id = %id, removed, "Clip delete requested");
        Ok(())
    }

    pub async fn interact(
        &self,
        id: &str,
        kind: InteractionKind,
        username: Option<&str>,
    ) -> Result<InteractionCounts, ServiceError> {
        self.store
            .mutate(|store| {
                let clip = store
                    .clips
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or(ServiceError::ClipNotFound)?;
                apply_interaction(clip, kind, username)
            })
            .await
    }

    fn video_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, file_name)
    }
}

fn apply_interaction(
    clip: &mut Clip,
    kind: InteractionKind,
    username: Option<&str>,
) -> Result<InteractionCounts, ServiceError> {
    match kind {
        InteractionKind::View => clip.views += 1,
        InteractionKind::Like => {
            let username = username
                .filter(|u| !u.is_empty())
                .ok_or(ServiceError::Unauthorized)?;
            let liked = clip.likes.toggle(username);
            tracing::debug!(id = %clip.id, username = %username, liked, "Like toggled");
        }
        InteractionKind::Unknown => {}
    }

    Ok(InteractionCounts {
        views: clip.views,
        likes: clip.likes.len(),
    })
}

/// Millisecond timestamp, bumped past the newest existing id so ids stay
/// unique and increasing within a single millisecond.
fn next_clip_id(now_millis: i64, clips: &[Clip]) -> String {
    let newest = clips
        .iter()
        .filter_map(|c| c.id.parse::<i64>().ok())
        .max();

    match newest {
        Some(newest) if newest >= now_millis => (newest + 1).to_string(),
        _ => now_millis.to_string(),
    }
}
