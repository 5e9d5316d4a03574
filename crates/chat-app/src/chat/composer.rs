use contextlink_api::ConversationId;

/// Lifecycle of the single-line composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposerState {
    #[default]
    Idle,
    Sending {
        conversation_id: ConversationId,
    },
}

/// Reason a submit or edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerRejection {
    EmptyDraft,
    AlreadySending { conversation_id: ConversationId },
}

pub type ComposerResult<T> = Result<T, ComposerRejection>;

/// Draft text plus the send lifecycle that gates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
    state: ComposerState,
}

impl Composer {
    /// Current input text, kept across failed sends.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Whether a send is in flight and for which conversation.
    pub fn state(&self) -> ComposerState {
        self.state
    }

    /// Input is disabled while a send is in flight.
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, ComposerState::Idle)
    }

    /// Replaces the draft; refused while sending.
    pub fn set_draft(&mut self, draft: impl Into<String>) -> ComposerResult<()> {
        self.ensure_idle()?;
        self.draft = draft.into();
        Ok(())
    }

    /// Moves `Idle -> Sending` and returns the content to post.
    ///
    /// The draft itself is kept until [`Composer::settle`] reports success.
    pub fn begin_submit(&mut self, conversation_id: ConversationId) -> ComposerResult<String> {
        self.ensure_idle()?;
        if self.draft.trim().is_empty() {
            return Err(ComposerRejection::EmptyDraft);
        }

        self.state = ComposerState::Sending { conversation_id };
        Ok(self.draft.clone())
    }

    /// Moves `Sending -> Idle`, clearing the draft only when the send succeeded.
    ///
    /// Returns the conversation the finished send belonged to, or `None` when
    /// nothing was in flight.
    pub fn settle(&mut self, succeeded: bool) -> Option<ConversationId> {
        let ComposerState::Sending { conversation_id } = self.state else {
            return None;
        };

        self.state = ComposerState::Idle;
        if succeeded {
            self.draft.clear();
        }
        Some(conversation_id)
    }

    fn ensure_idle(&self) -> ComposerResult<()> {
        match self.state {
            ComposerState::Idle => Ok(()),
            ComposerState::Sending { conversation_id } => {
                Err(ComposerRejection::AlreadySending { conversation_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE: ConversationId = ConversationId::new(3);

    #[test]
    fn whitespace_draft_is_rejected_without_state_change() {
        let mut composer = Composer::default();
        composer.set_draft("   \t").unwrap();

        assert_eq!(
            composer.begin_submit(ACTIVE),
            Err(ComposerRejection::EmptyDraft)
        );
        assert_eq!(composer.state(), ComposerState::Idle);
        assert!(composer.is_enabled());
    }

    #[test]
    fn second_submit_is_rejected_until_first_settles() {
        let mut composer = Composer::default();
        composer.set_draft("hello").unwrap();

        assert_eq!(composer.begin_submit(ACTIVE).unwrap(), "hello");
        assert!(!composer.is_enabled());
        assert_eq!(
            composer.begin_submit(ACTIVE),
            Err(ComposerRejection::AlreadySending {
                conversation_id: ACTIVE
            })
        );
        assert!(composer.set_draft("other").is_err());

        assert_eq!(composer.settle(true), Some(ACTIVE));
        assert!(composer.draft().is_empty());
        assert!(composer.is_enabled());
    }

    #[test]
    fn failed_send_keeps_draft() {
        let mut composer = Composer::default();
        composer.set_draft("keep me").unwrap();
        composer.begin_submit(ACTIVE).unwrap();

        assert_eq!(composer.settle(false), Some(ACTIVE));
        assert_eq!(composer.draft(), "keep me");
        assert_eq!(composer.settle(false), None);
    }
}
