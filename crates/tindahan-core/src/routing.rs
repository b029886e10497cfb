//! # Replay Routing
//!
//! Maps an (entity, action) pair to the remote call that replays it.
//!
//! ## Routing Table
//! ```text
//! ┌──────────────┬─────────────────┬─────────────────┬─────────────────┐
//! │  entity      │  create         │  update         │  delete         │
//! ├──────────────┼─────────────────┼─────────────────┼─────────────────┤
//! │  product     │ CreateProduct   │ UpdateProduct   │ DeleteProduct   │
//! │  category    │ CreateCategory  │ UpdateCategory  │ DeleteCategory  │
//! │  inventory   │ AddStockMovement│ AddStockMovement│ (unsupported)   │
//! │  sale        │ CreateSale      │ (unsupported)   │ (unsupported)   │
//! │  report      │ (local only)    │ (unsupported)   │ (unsupported)   │
//! └──────────────┴─────────────────┴─────────────────┴─────────────────┘
//! ```
//!
//! Every cell is decided here with an exhaustive `match`, so adding an
//! entity type without deciding its routes fails to compile.

use serde::{Deserialize, Serialize};

use crate::types::{EntityType, MutationAction};

/// A remote API call that replays one queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayRoute {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    AddStockMovement,
    CreateSale,
}

impl ReplayRoute {
    /// The entity type this route belongs to.
    pub fn entity_type(&self) -> EntityType {
        match self {
            ReplayRoute::CreateProduct
            | ReplayRoute::UpdateProduct
            | ReplayRoute::DeleteProduct => EntityType::Product,
            ReplayRoute::CreateCategory
            | ReplayRoute::UpdateCategory
            | ReplayRoute::DeleteCategory => EntityType::Category,
            ReplayRoute::AddStockMovement => EntityType::Inventory,
            ReplayRoute::CreateSale => EntityType::Sale,
        }
    }

    /// True when the route addresses an existing record by `_id`.
    pub fn targets_existing(&self) -> bool {
        matches!(
            self,
            ReplayRoute::UpdateProduct
                | ReplayRoute::DeleteProduct
                | ReplayRoute::UpdateCategory
                | ReplayRoute::DeleteCategory
        )
    }

    /// True when the server answers with a newly created record.
    pub fn creates_record(&self) -> bool {
        matches!(
            self,
            ReplayRoute::CreateProduct
                | ReplayRoute::CreateCategory
                | ReplayRoute::AddStockMovement
                | ReplayRoute::CreateSale
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReplayRoute::CreateProduct => "create_product",
            ReplayRoute::UpdateProduct => "update_product",
            ReplayRoute::DeleteProduct => "delete_product",
            ReplayRoute::CreateCategory => "create_category",
            ReplayRoute::UpdateCategory => "update_category",
            ReplayRoute::DeleteCategory => "delete_category",
            ReplayRoute::AddStockMovement => "add_stock_movement",
            ReplayRoute::CreateSale => "create_sale",
        }
    }
}

impl std::fmt::Display for ReplayRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a queued mutation is handled by the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replayed against the remote API.
    Remote(ReplayRoute),
    /// Kept locally and never replayed (reports).
    LocalOnly,
    /// No remote counterpart exists; rejected before it reaches the queue.
    Unsupported,
}

impl Resolution {
    pub fn resolve(entity_type: EntityType, action: MutationAction) -> Self {
        use EntityType as E;
        use MutationAction as A;

        match (entity_type, action) {
            (E::Product, A::Create) => Resolution::Remote(ReplayRoute::CreateProduct),
            (E::Product, A::Update) => Resolution::Remote(ReplayRoute::UpdateProduct),
            (E::Product, A::Delete) => Resolution::Remote(ReplayRoute::DeleteProduct),
            (E::Category, A::Create) => Resolution::Remote(ReplayRoute::CreateCategory),
            (E::Category, A::Update) => Resolution::Remote(ReplayRoute::UpdateCategory),
            (E::Category, A::Delete) => Resolution::Remote(ReplayRoute::DeleteCategory),
            // Stock levels only move through movements.
            (E::Inventory, A::Create) | (E::Inventory, A::Update) => {
                Resolution::Remote(ReplayRoute::AddStockMovement)
            }
            (E::Inventory, A::Delete) => Resolution::Unsupported,
            (E::Sale, A::Create) => Resolution::Remote(ReplayRoute::CreateSale),
            (E::Sale, A::Update) | (E::Sale, A::Delete) => Resolution::Unsupported,
            (E::Report, A::Create) => Resolution::LocalOnly,
            (E::Report, A::Update) | (E::Report, A::Delete) => Resolution::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Resolution::Unsupported)
    }

    pub fn route(&self) -> Option<ReplayRoute> {
        match self {
            Resolution::Remote(route) => Some(*route),
            _ => None,
        }
    }
}
