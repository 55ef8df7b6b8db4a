//! Direct-message pipeline.

use tracing::info;

use super::{Credentials, Delivery, DeliveryError, DeliveryReport, Stage, StageTracker};
use crate::client::{AtpClient, MessageInput};
use crate::conversation;
use crate::embed;
use crate::identity;
use crate::richtext::{self, mentions};

/// A direct message as requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct DirectMessage {
    /// Markdown body.
    pub text: String,
    /// Raw recipient identifiers, handles or DIDs.
    pub recipients: Vec<String>,
    /// Optional `at://` URI of a record to embed.
    pub embed_uri: Option<String>,
    /// CID of the embedded record; required when `embed_uri` is set.
    pub embed_cid: Option<String>,
}

impl<C: AtpClient + ?Sized> Delivery<'_, C> {
    /// Send `message` to the conversation made of its recipients.
    ///
    /// Order: embed shape, authentication, recipients, text, conversation,
    /// submit. The message is sent once, only after every earlier stage
    /// succeeded.
    ///
    /// # Errors
    ///
    /// The first stage's [`DeliveryError`].
    pub async fn send_direct_message(
        &self,
        credentials: &Credentials,
        message: &DirectMessage,
    ) -> Result<DeliveryReport, DeliveryError> {
        let mut tracker = StageTracker::new("dm");
        let result = self.run_direct_message(credentials, message, &mut tracker).await;
        tracker.finish(result)
    }

    async fn run_direct_message(
        &self,
        credentials: &Credentials,
        message: &DirectMessage,
        tracker: &mut StageTracker,
    ) -> Result<DeliveryReport, DeliveryError> {
        let embed = embed::build(message.embed_uri.as_deref(), message.embed_cid.as_deref())?;
        tracker.advance(Stage::EmbedResolved);

        self.authenticate(credentials).await?;
        tracker.advance(Stage::Authenticated);

        let members = self
            .step(identity::resolve_all(&message.recipients, self.client()))
            .await?;
        tracker.advance(Stage::IdentitiesResolved);

        let mut text = richtext::compile(&message.text)?;
        self.step(mentions::resolve_mentions(&mut text, self.client()))
            .await?;
        tracker.advance(Stage::TextCompiled);

        let convo_id = self
            .step(conversation::locate(&members, self.client()))
            .await?;
        tracker.advance(Stage::ConversationLocated);

        let input = MessageInput { text, embed };
        let sent = self
            .step(self.client().send_message(&convo_id, &input))
            .await?;
        tracker.advance(Stage::Submitted);

        info!(convo_id = %convo_id, message_id = %sent.id, "message sent");
        Ok(DeliveryReport::MessageSent {
            convo_id,
            message_id: sent.id,
        })
    }
}
