//! # Validation Module
//!
//! Payload validation against the REST request bodies, run before a
//! mutation is queued or sent.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front-end forms                                              │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Interceptor / gateway (Rust)                                 │
//! │  └── THIS MODULE: shape checks before the queue write                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: REST API                                                     │
//! │  └── Authoritative checks at replay time                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A payload that passes here can still be rejected by the server; such a
//! mutation stays queued and is retried like any other replay failure.
//!
//! ## Usage
//! ```rust
//! use serde_json::json;
//! use tindahan_core::validation::validate_payload;
//! use tindahan_core::{EntityType, MutationAction};
//!
//! let movement = json!({"product": "p1", "type": "in", "quantity": 5, "reason": "restock"});
//! assert!(validate_payload(EntityType::Inventory, MutationAction::Create, &movement).is_ok());
//! ```

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::routing::Resolution;
use crate::types::{EntityType, MutationAction};
use crate::ID_FIELD;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MOVEMENT_TYPES: [&str; 3] = ["in", "out", "adjustment"];
const PAYMENT_METHODS: [&str; 3] = ["cash", "card", "qr"];

// =============================================================================
// Entry Point
// =============================================================================

/// Validates a mutation payload for the given entity and action.
///
/// Update payloads are partial: only the fields present are checked, but
/// the `_id` of the target record is required. Delete payloads only need
/// the `_id`. Unsupported pairs are not checked here; see
/// [`Resolution::resolve`].
pub fn validate_payload(
    entity_type: EntityType,
    action: MutationAction,
    payload: &Value,
) -> ValidationResult<()> {
    let fields = payload
        .as_object()
        .ok_or_else(|| ValidationError::invalid("payload", "must be a JSON object"))?;

    let targets_existing = Resolution::resolve(entity_type, action)
        .route()
        .map(|route| route.targets_existing())
        .unwrap_or(false);
    if targets_existing {
        required_str(fields, ID_FIELD)?;
    }

    match (entity_type, action) {
        (_, MutationAction::Delete) => Ok(()),
        (EntityType::Product, MutationAction::Create) => validate_product(fields, false),
        (EntityType::Product, MutationAction::Update) => validate_product(fields, true),
        (EntityType::Category, MutationAction::Create) => validate_category(fields, false),
        (EntityType::Category, MutationAction::Update) => validate_category(fields, true),
        (EntityType::Inventory, _) => validate_stock_movement(fields),
        (EntityType::Sale, _) => validate_sale(fields),
        // Reports are free-form local documents.
        (EntityType::Report, _) => Ok(()),
    }
}

// =============================================================================
// Entity Validators
// =============================================================================

/// Product body: `name`, `price`, `category`, `store`, optional `stock`.
pub fn validate_product(fields: &Map<String, Value>, partial: bool) -> ValidationResult<()> {
    check(fields, "name", partial, |v| name(v, "name"))?;
    check(fields, "price", partial, |v| non_negative(v, "price"))?;
    check(fields, "category", partial, |v| non_empty_str(v, "category"))?;
    check(fields, "store", partial, |v| non_empty_str(v, "store"))?;
    check(fields, "stock", true, |v| non_negative(v, "stock"))?;
    Ok(())
}

/// Category body: `name`, `store`.
pub fn validate_category(fields: &Map<String, Value>, partial: bool) -> ValidationResult<()> {
    check(fields, "name", partial, |v| name(v, "name"))?;
    check(fields, "store", partial, |v| non_empty_str(v, "store"))?;
    Ok(())
}

/// Stock movement body: `product`, `type`, `quantity`, `reason`.
pub fn validate_stock_movement(fields: &Map<String, Value>) -> ValidationResult<()> {
    required_str(fields, "product")?;
    let kind = required_str(fields, "type")?;
    one_of(kind, "type", &MOVEMENT_TYPES)?;
    positive(required(fields, "quantity")?, "quantity")?;
    required_str(fields, "reason")?;
    Ok(())
}

/// Sale body: `store`, non-empty `items`, `total`, `paymentMethod`.
///
/// ## Item Shape
/// ```text
/// { product: "<id>", quantity: 2, price: 25.0, modifiers: [...], discounts: [...] }
///              │             │
///              │             └── must be > 0
///              └── required
/// ```
pub fn validate_sale(fields: &Map<String, Value>) -> ValidationResult<()> {
    required_str(fields, "store")?;

    let items = required(fields, "items")?
        .as_array()
        .ok_or_else(|| ValidationError::invalid("items", "must be an array"))?;
    if items.is_empty() {
        return Err(ValidationError::required("items"));
    }
    for item in items {
        let item = item
            .as_object()
            .ok_or_else(|| ValidationError::invalid("items", "each item must be an object"))?;
        required(item, "product")?;
        positive(required(item, "quantity")?, "quantity")?;
    }

    non_negative(required(fields, "total")?, "total")?;
    let method = required_str(fields, "paymentMethod")?;
    one_of(method, "paymentMethod", &PAYMENT_METHODS)?;
    Ok(())
}

// =============================================================================
// Field Helpers
// =============================================================================

fn check(
    fields: &Map<String, Value>,
    field: &str,
    optional: bool,
    rule: impl Fn(&Value) -> ValidationResult<()>,
) -> ValidationResult<()> {
    match fields.get(field) {
        Some(value) => rule(value),
        None if optional => Ok(()),
        None => Err(ValidationError::required(field)),
    }
}

fn required<'a>(fields: &'a Map<String, Value>, field: &str) -> ValidationResult<&'a Value> {
    match fields.get(field) {
        Some(Value::Null) | None => Err(ValidationError::required(field)),
        Some(value) => Ok(value),
    }
}

fn required_str<'a>(fields: &'a Map<String, Value>, field: &str) -> ValidationResult<&'a str> {
    let value = required(fields, field)?;
    non_empty_str(value, field)?;
    Ok(value.as_str().unwrap_or_default())
}

fn non_empty_str(value: &Value, field: &str) -> ValidationResult<()> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        Some(_) => Err(ValidationError::required(field)),
        None => Err(ValidationError::invalid(field, "must be a string")),
    }
}

fn name(value: &Value, field: &str) -> ValidationResult<()> {
    non_empty_str(value, field)?;
    let len = value.as_str().map(|s| s.trim().chars().count()).unwrap_or(0);
    if len > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn number(value: &Value, field: &str) -> ValidationResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| ValidationError::invalid(field, "must be a number"))
}

fn non_negative(value: &Value, field: &str) -> ValidationResult<()> {
    if number(value, field)? < 0.0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn positive(value: &Value, field: &str) -> ValidationResult<()> {
    if number(value, field)? <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn one_of(value: &str, field: &str, allowed: &[&str]) -> ValidationResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::NotAllowed {
            field: field.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
