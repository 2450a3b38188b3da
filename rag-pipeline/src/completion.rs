//! Completion model capability used to answer from an assembled prompt.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use crate::error::Result;
use crate::prompt::Prompt;

/// Answer text delivered piece by piece as the model generates it.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A language model that completes an assembled [`Prompt`].
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate the answer text for `prompt`.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Stream the answer text for `prompt`.
    ///
    /// The default implementation yields the whole
    /// [`complete`](Self::complete) result as a single piece.
    async fn complete_stream(&self, prompt: &Prompt) -> Result<TokenStream> {
        let text = self.complete(prompt).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }

    /// Name of the model.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    struct Fixed;

    #[async_trait]
    impl CompletionModel for Fixed {
        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            Ok("the whole answer".to_string())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn default_stream_yields_the_complete_answer_once() {
        let prompt = Prompt {
            system: "s".into(),
            user: "Question: q".into(),
            sources: Vec::new(),
            dropped: 0,
            summary_included: false,
        };
        let stream = Fixed.complete_stream(&prompt).await.unwrap();
        let pieces: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(pieces, vec!["the whole answer"]);
    }
}
