pub mod assignment;
pub mod message;
pub mod notification;
pub mod wire;

pub use assignment::*;
pub use message::*;
pub use notification::*;

use serde::Deserialize;

/// A page of results; the backend answers with a bare array or a Spring `Page` object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PageBody<T> {
    Items(Vec<T>),
    Paged {
        content: Vec<T>,
        #[serde(default)]
        last: Option<bool>,
    },
}

impl<T> PageBody<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            PageBody::Items(items) => items,
            PageBody::Paged { content, .. } => content,
        }
    }
}
