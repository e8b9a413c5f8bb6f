use thiserror::Error;

use super::types::{Item, ResponseSummary};

/// Raised by a pipeline to remove an item from the results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DropItem(pub String);

/// Post-processes every item a job produces.
pub trait ItemPipeline: Send + Sync {
    fn name(&self) -> &str;

    fn process_item(&self, item: Item, response: Option<&ResponseSummary>)
        -> Result<Item, DropItem>;
}

/// Drops items missing any of the configured fields.
#[derive(Debug, Clone)]
pub struct RequiredFieldsPipeline {
    fields: Vec<String>,
}

impl RequiredFieldsPipeline {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl ItemPipeline for RequiredFieldsPipeline {
    fn name(&self) -> &str {
        "required_fields"
    }

    fn process_item(
        &self,
        item: Item,
        _response: Option<&ResponseSummary>,
    ) -> Result<Item, DropItem> {
        for field in &self.fields {
            match item.get(field) {
                None | Some(serde_json::Value::Null) => {
                    return Err(DropItem(format!("Missing field: {}", field)))
                }
                Some(_) => {}
            }
        }
        Ok(item)
    }
}
