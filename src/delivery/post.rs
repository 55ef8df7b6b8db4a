//! Feed post pipelines: a random line as a new post or as a reply.

use std::path::Path;

use chrono::Utc;
use tracing::info;

use super::random::{IndexSource, PostFile};
use super::{Credentials, Delivery, DeliveryError, DeliveryReport, Stage, StageTracker};
use crate::client::{AtpClient, PostRecord, ReplyRef};
use crate::identity::Identifier;
use crate::richtext::{self, mentions, CompiledText};

impl<C: AtpClient + ?Sized> Delivery<'_, C> {
    /// Post one randomly chosen line of `path`.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::PostFile`] before any network call, then the first
    /// failing stage's error.
    pub async fn post_random(
        &self,
        credentials: &Credentials,
        path: &Path,
        source: &mut dyn IndexSource,
    ) -> Result<DeliveryReport, DeliveryError> {
        let mut tracker = StageTracker::new("random");
        let result = self
            .run_post_random(credentials, path, source, &mut tracker)
            .await;
        tracker.finish(result)
    }

    /// Reply to `target`'s latest post with one randomly chosen line.
    ///
    /// The reply uses the target post as both thread root and parent.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::PostFile`] or an invalid identifier before any network
    /// call, [`DeliveryError::NoPosts`] if the target has never posted, then
    /// the first failing stage's error.
    pub async fn reply_random(
        &self,
        credentials: &Credentials,
        path: &Path,
        target: &str,
        source: &mut dyn IndexSource,
    ) -> Result<DeliveryReport, DeliveryError> {
        let mut tracker = StageTracker::new("random_reply");
        let result = self
            .run_reply_random(credentials, path, target, source, &mut tracker)
            .await;
        tracker.finish(result)
    }

    async fn run_post_random(
        &self,
        credentials: &Credentials,
        path: &Path,
        source: &mut dyn IndexSource,
        tracker: &mut StageTracker,
    ) -> Result<DeliveryReport, DeliveryError> {
        let posts = PostFile::load(path)?;

        self.authenticate(credentials).await?;
        tracker.advance(Stage::Authenticated);

        let text = self.compile_line(posts.pick(source)).await?;
        tracker.advance(Stage::TextCompiled);

        self.submit(text, None, tracker).await
    }

    async fn run_reply_random(
        &self,
        credentials: &Credentials,
        path: &Path,
        target: &str,
        source: &mut dyn IndexSource,
        tracker: &mut StageTracker,
    ) -> Result<DeliveryReport, DeliveryError> {
        let posts = PostFile::load(path)?;
        let target = Identifier::parse(target)?;

        self.authenticate(credentials).await?;
        tracker.advance(Stage::Authenticated);

        let latest = self
            .step(self.client().list_posts(&target, 1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeliveryError::NoPosts(target.to_string()))?;
        tracker.advance(Stage::ReplyTargetLocated);

        let text = self.compile_line(posts.pick(source)).await?;
        tracker.advance(Stage::TextCompiled);

        let reply = ReplyRef {
            root: latest.clone(),
            parent: latest,
        };
        self.submit(text, Some(reply), tracker).await
    }

    async fn compile_line(&self, line: &str) -> Result<CompiledText, DeliveryError> {
        let mut text = richtext::compile(line)?;
        self.step(mentions::resolve_mentions(&mut text, self.client()))
            .await?;
        Ok(text)
    }

    async fn submit(
        &self,
        text: CompiledText,
        reply: Option<ReplyRef>,
        tracker: &mut StageTracker,
    ) -> Result<DeliveryReport, DeliveryError> {
        let record = PostRecord {
            text,
            reply,
            created_at: Utc::now(),
        };
        let created = self.step(self.client().create_post(&record)).await?;
        tracker.advance(Stage::Submitted);

        info!(uri = %created.uri(), cid = created.cid(), "post created");
        Ok(DeliveryReport::PostCreated {
            uri: created.uri().clone(),
            cid: created.cid().to_owned(),
        })
    }
}
