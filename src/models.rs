// Request and response models for the gateway surface

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard response envelope for all gateway operations
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    /// Structured data payload for the operation result
    pub data: Value,
    /// Human-readable summary of the operation result
    pub summary: String,
    /// Suggested follow-up operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Vec<String>>,
}

impl ToolResponse {
    pub fn new(data: Value, summary: impl Into<String>) -> Self {
        Self {
            data,
            summary: summary.into(),
            next: None,
        }
    }

    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = Some(next);
        self
    }
}

/// Input for a single stock item in batch purchase operations
#[derive(Debug, Clone, Deserialize)]
pub struct StockItemInput {
    pub product_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub best_before_date: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Input for consuming or spoiling a single stock item
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeItemInput {
    pub product_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub spoiled: bool,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Input for setting the absolute stock amount of a product
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItemInput {
    pub product_id: i64,
    pub new_amount: f64,
    #[serde(default)]
    pub best_before_date: Option<String>,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Input for purchasing stock through a barcode lookup
#[derive(Debug, Clone, Deserialize)]
pub struct BarcodePurchaseInput {
    pub amount: f64,
    #[serde(default)]
    pub best_before_date: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub location_id: Option<i64>,
}

/// Input for consuming stock through a barcode lookup
#[derive(Debug, Clone, Deserialize)]
pub struct BarcodeConsumeInput {
    pub amount: f64,
    #[serde(default)]
    pub spoiled: bool,
    #[serde(default)]
    pub location_id: Option<i64>,
}

/// Input linking a barcode to an existing product
#[derive(Debug, Clone, Deserialize)]
pub struct BarcodeLinkInput {
    pub barcode: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Input for adding one item to a shopping list
#[derive(Debug, Clone, Deserialize)]
pub struct ShoppingListItemInput {
    pub product_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Location entity used for lookups
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

/// Simplified product representation for search results
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub location_id: Option<i64>,
    pub qu_id_stock: Option<i64>,
    pub qu_id_purchase: Option<i64>,
    pub stock_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_skips_empty_next() {
        let envelope = ToolResponse::new(json!({"count": 3}), "3 products found");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"data": {"count": 3}, "summary": "3 products found"})
        );
    }

    #[test]
    fn test_envelope_with_next() {
        let envelope =
            ToolResponse::new(json!({}), "done").with_next(vec!["GET /v1/stock".to_string()]);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["next"], json!(["GET /v1/stock"]));
    }

    #[test]
    fn test_stock_item_defaults() {
        let item: StockItemInput =
            serde_json::from_str(r#"{"product_id": 4, "amount": 2.5}"#).unwrap();
        assert_eq!(item.product_id, 4);
        assert!(item.best_before_date.is_none());
        assert!(item.price.is_none());
    }

    #[test]
    fn test_consume_item_spoiled_default() {
        let item: ConsumeItemInput =
            serde_json::from_str(r#"{"product_id": 4, "amount": 1.0}"#).unwrap();
        assert!(!item.spoiled);
    }
}
