//! Conversation-related types.

use codeact_model::ModelMessage;

/// Who authored a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Instructions and advisories from the agent itself.
    System,
    /// Inputs to the model: user messages and execution observations.
    User,
    /// Texts generated by the model.
    Assistant,
}

/// An item in the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub(crate) role: Role,
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) display: bool,
}

impl Item {
    /// Creates a new item.
    #[inline]
    pub fn new<N: Into<String>, C: Into<String>>(
        role: Role,
        name: N,
        content: C,
    ) -> Self {
        Self {
            role,
            name: name.into(),
            content: content.into(),
            display: true,
        }
    }

    /// Sets whether this item should be echoed to the transcript listener.
    #[inline]
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    /// Returns the role of the author.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the name of the speaker.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the text content.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns `true` if this item is meant to be shown.
    #[inline]
    pub fn display(&self) -> bool {
        self.display
    }

    #[inline]
    pub(crate) fn to_model_message(&self) -> ModelMessage {
        let content = self.content.clone();
        match self.role {
            Role::System => ModelMessage::System(content),
            Role::User => ModelMessage::User(content),
            Role::Assistant => ModelMessage::Assistant(content),
        }
    }
}

/// Represents a conversation.
///
/// The conversation is append-only: items are kept in insertion order and
/// never removed or deduplicated.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    items: Vec<Item>,
}

impl Conversation {
    /// Appends an item.
    #[inline]
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Returns all items in insertion order.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the latest item.
    #[inline]
    pub fn last(&self) -> Option<&Item> {
        self.items.last()
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the conversation has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Renders the whole history into model messages.
    pub fn to_messages(&self) -> Vec<ModelMessage> {
        self.items.iter().map(Item::to_model_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_messages_keeps_order() {
        let mut conversation = Conversation::default();
        conversation.push(Item::new(Role::System, "system", "rules"));
        conversation.push(Item::new(Role::User, "user", "hi"));
        conversation.push(Item::new(Role::User, "user", "hi"));
        conversation
            .push(Item::new(Role::Assistant, "bot", "hello").with_display(false));

        assert_eq!(conversation.len(), 4);
        assert!(!conversation.last().unwrap().display());
        assert_eq!(
            conversation.to_messages(),
            vec![
                ModelMessage::System("rules".to_owned()),
                ModelMessage::User("hi".to_owned()),
                ModelMessage::User("hi".to_owned()),
                ModelMessage::Assistant("hello".to_owned()),
            ]
        );
    }
}
