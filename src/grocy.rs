// Grocy domain client
//
// Thin, mechanical wrappers over the dispatcher: one method per upstream
// endpoint, each building a payload and forwarding it. All session and
// retry behavior lives in the dispatcher.

use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::models::{
    BarcodeConsumeInput, BarcodePurchaseInput, ConsumeItemInput, InventoryItemInput, Location,
    ProductSummary, StockItemInput,
};

pub struct GrocyClient {
    dispatcher: Arc<Dispatcher>,
}

impl GrocyClient {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    // System

    pub async fn system_info(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "system/info", &[], None)
            .await
    }

    pub async fn db_changed_time(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "system/db-changed-time", &[], None)
            .await
    }

    pub async fn system_config(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "system/config", &[], None)
            .await
    }

    // Products and master data

    /// All products with their current stock amounts joined in
    pub async fn all_products(&self) -> Result<Vec<ProductSummary>, GatewayError> {
        let products = self
            .dispatcher
            .dispatch(Method::GET, "objects/products", &[], None)
            .await?;
        let stock = self
            .dispatcher
            .dispatch(Method::GET, "stock", &[], None)
            .await?;
        Ok(summarize_products(&products, &stock))
    }

    /// Case-insensitive name search over the product list
    pub async fn search_products(&self, query: &str) -> Result<Vec<ProductSummary>, GatewayError> {
        let query = query.to_lowercase();
        let products = self.all_products().await?;
        Ok(products
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&query))
            .collect())
    }

    pub async fn create_product(&self, data: &Value) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::POST, "objects/products", &[], Some(data))
            .await
    }

    pub async fn update_product(&self, product_id: i64, data: &Value) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::PUT,
                &format!("objects/products/{product_id}"),
                &[],
                Some(data),
            )
            .await
    }

    pub async fn delete_product(&self, product_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/products/{product_id}"),
                &[],
                None,
            )
            .await
    }

    pub async fn locations(&self) -> Result<Vec<Location>, GatewayError> {
        let rows = self
            .dispatcher
            .dispatch(Method::GET, "objects/locations", &[], None)
            .await?;
        Ok(rows
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|row| {
                Some(Location {
                    id: field_as_i64(row, "id")?,
                    name: row.get("name")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    pub async fn delete_location(&self, location_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/locations/{location_id}"),
                &[],
                None,
            )
            .await
    }

    pub async fn quantity_units(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "objects/quantity_units", &[], None)
            .await
    }

    pub async fn create_quantity_unit(&self, data: &Value) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::POST, "objects/quantity_units", &[], Some(data))
            .await
    }

    pub async fn delete_quantity_unit(&self, qu_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/quantity_units/{qu_id}"),
                &[],
                None,
            )
            .await
    }

    pub async fn product_groups(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "objects/product_groups", &[], None)
            .await
    }

    pub async fn delete_product_group(&self, group_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/product_groups/{group_id}"),
                &[],
                None,
            )
            .await
    }

    /// Read rows from a generic /objects/{entity} endpoint (read-only)
    pub async fn inspect_entity(
        &self,
        entity: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::GET,
                &format!("objects/{entity}"),
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
                None,
            )
            .await
    }

    // Stock

    pub async fn stock_overview(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "stock", &[], None)
            .await
    }

    /// Volatile stock overview (expiring and missing products)
    pub async fn stock_volatile(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "stock/volatile", &[], None)
            .await
    }

    pub async fn product_stock_details(&self, product_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::GET,
                &format!("stock/products/{product_id}"),
                &[],
                None,
            )
            .await
    }

    pub async fn product_stock_history(
        &self,
        product_id: i64,
        limit: u32,
    ) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::GET,
                &format!("stock/products/{product_id}/log"),
                &[("limit", limit.to_string())],
                None,
            )
            .await
    }

    pub async fn add_stock(&self, item: &StockItemInput) -> Result<Value, GatewayError> {
        let mut payload = json!({
            "amount": item.amount,
            "transaction_type": "purchase",
        });
        if let Some(date) = &item.best_before_date {
            payload["best_before_date"] = json!(date);
        }
        if let Some(price) = item.price {
            payload["price"] = json!(price);
        }
        if let Some(location_id) = item.location_id {
            payload["location_id"] = json!(location_id);
        }

        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/products/{}/add", item.product_id),
                &[],
                Some(&payload),
            )
            .await
    }

    pub async fn consume_stock(&self, item: &ConsumeItemInput) -> Result<Value, GatewayError> {
        let mut payload = json!({
            "amount": item.amount,
            "transaction_type": "consume",
            "spoiled": item.spoiled,
        });
        if let Some(location_id) = item.location_id {
            payload["location_id"] = json!(location_id);
        }

        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/products/{}/consume", item.product_id),
                &[],
                Some(&payload),
            )
            .await
    }

    /// Set the absolute stock amount for a product
    pub async fn inventory_product(&self, item: &InventoryItemInput) -> Result<Value, GatewayError> {
        let mut payload = json!({"new_amount": item.new_amount});
        if let Some(date) = &item.best_before_date {
            payload["best_before_date"] = json!(date);
        }
        if let Some(location_id) = item.location_id {
            payload["location_id"] = json!(location_id);
        }
        if let Some(price) = item.price {
            payload["price"] = json!(price);
        }
        if let Some(note) = &item.note {
            payload["note"] = json!(note);
        }

        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/products/{}/inventory", item.product_id),
                &[],
                Some(&payload),
            )
            .await
    }

    pub async fn undo_booking(&self, booking_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/bookings/{booking_id}/undo"),
                &[],
                None,
            )
            .await
    }

    pub async fn undo_transaction(&self, transaction_id: &str) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/transactions/{transaction_id}/undo"),
                &[],
                None,
            )
            .await
    }

    // Barcodes

    pub async fn product_by_barcode(&self, barcode: &str) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::GET,
                &format!("stock/products/by-barcode/{barcode}"),
                &[],
                None,
            )
            .await
    }

    pub async fn add_stock_by_barcode(
        &self,
        barcode: &str,
        item: &BarcodePurchaseInput,
    ) -> Result<Value, GatewayError> {
        let mut payload = json!({
            "amount": item.amount,
            "transaction_type": "purchase",
        });
        if let Some(date) = &item.best_before_date {
            payload["best_before_date"] = json!(date);
        }
        if let Some(price) = item.price {
            payload["price"] = json!(price);
        }
        if let Some(location_id) = item.location_id {
            payload["location_id"] = json!(location_id);
        }

        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/products/by-barcode/{barcode}/add"),
                &[],
                Some(&payload),
            )
            .await
    }

    pub async fn consume_stock_by_barcode(
        &self,
        barcode: &str,
        item: &BarcodeConsumeInput,
    ) -> Result<Value, GatewayError> {
        let mut payload = json!({
            "amount": item.amount,
            "transaction_type": "consume",
            "spoiled": item.spoiled,
        });
        if let Some(location_id) = item.location_id {
            payload["location_id"] = json!(location_id);
        }

        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/products/by-barcode/{barcode}/consume"),
                &[],
                Some(&payload),
            )
            .await
    }

    pub async fn link_barcode(
        &self,
        product_id: i64,
        barcode: &str,
        note: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let mut payload = json!({"product_id": product_id, "barcode": barcode});
        if let Some(note) = note {
            payload["note"] = json!(note);
        }

        self.dispatcher
            .dispatch(Method::POST, "objects/product_barcodes", &[], Some(&payload))
            .await
    }

    // Shopping lists

    pub async fn shopping_lists(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(Method::GET, "objects/shopping_lists", &[], None)
            .await
    }

    /// Items for one shopping list
    ///
    /// Grocy keeps all rows in one table; filter by list id here.
    pub async fn shopping_list_items(&self, list_id: i64) -> Result<Vec<Value>, GatewayError> {
        let rows = self
            .dispatcher
            .dispatch(Method::GET, "objects/shopping_list", &[], None)
            .await?;
        Ok(rows
            .as_array()
            .into_iter()
            .flatten()
            .filter(|row| field_as_i64(row, "shopping_list_id") == Some(list_id))
            .cloned()
            .collect())
    }

    pub async fn add_shopping_list_item(
        &self,
        list_id: i64,
        product_id: i64,
        amount: f64,
        note: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let mut payload = json!({
            "product_id": product_id,
            "amount": amount,
            "shopping_list_id": list_id,
        });
        if let Some(note) = note {
            payload["note"] = json!(note);
        }

        self.dispatcher
            .dispatch(Method::POST, "objects/shopping_list", &[], Some(&payload))
            .await
    }

    pub async fn remove_shopping_list_item(&self, item_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/shopping_list/{item_id}"),
                &[],
                None,
            )
            .await
    }

    pub async fn clear_shopping_list(&self, list_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::POST,
                &format!("stock/shoppinglist/{list_id}/clear"),
                &[],
                None,
            )
            .await
    }

    /// Add all products below their minimum stock to the default list
    pub async fn add_missing_products(&self) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::POST,
                "stock/shoppinglist/add-missing-products",
                &[],
                None,
            )
            .await
    }

    pub async fn delete_shopping_list(&self, list_id: i64) -> Result<Value, GatewayError> {
        self.dispatcher
            .dispatch(
                Method::DELETE,
                &format!("objects/shopping_lists/{list_id}"),
                &[],
                None,
            )
            .await
    }
}

/// Join product rows with stock amounts into summaries
///
/// Grocy serializes numeric ids inconsistently (int or string depending on
/// the endpoint), so both forms are accepted.
fn summarize_products(products: &Value, stock: &Value) -> Vec<ProductSummary> {
    let mut stock_by_product: HashMap<i64, f64> = HashMap::new();
    for row in stock.as_array().into_iter().flatten() {
        let Some(product_id) = field_as_i64(row, "product_id") else {
            continue;
        };
        let amount = row.get("amount").and_then(value_as_f64).unwrap_or(0.0);
        stock_by_product.insert(product_id, amount);
    }

    products
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|p| {
            let id = field_as_i64(p, "id")?;
            Some(ProductSummary {
                id,
                name: p
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                location_id: field_as_i64(p, "location_id"),
                qu_id_stock: field_as_i64(p, "qu_id_stock"),
                qu_id_purchase: field_as_i64(p, "qu_id_purchase"),
                stock_amount: stock_by_product.get(&id).copied(),
            })
        })
        .collect()
}

fn field_as_i64(row: &Value, key: &str) -> Option<i64> {
    let value = row.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn value_as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_products_joins_stock() {
        let products = json!([
            {"id": 1, "name": "Milk", "location_id": 2, "qu_id_stock": 3, "qu_id_purchase": 3},
            {"id": "2", "name": "Bread"},
        ]);
        let stock = json!([
            {"product_id": "1", "amount": "4.5"},
            {"product_id": 99, "amount": 1.0},
        ]);

        let summaries = summarize_products(&products, &stock);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "Milk");
        assert_eq!(summaries[0].stock_amount, Some(4.5));
        assert_eq!(summaries[1].id, 2);
        assert_eq!(summaries[1].stock_amount, None);
    }

    #[test]
    fn test_summarize_products_skips_malformed_rows() {
        let products = json!([
            {"name": "no id"},
            {"id": "not-a-number", "name": "bad id"},
            {"id": 5, "name": "Eggs"},
        ]);
        let summaries = summarize_products(&products, &json!([]));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, 5);
    }

    #[test]
    fn test_field_as_i64_accepts_both_forms() {
        let row = json!({"a": 3, "b": "17", "c": "x"});
        assert_eq!(field_as_i64(&row, "a"), Some(3));
        assert_eq!(field_as_i64(&row, "b"), Some(17));
        assert_eq!(field_as_i64(&row, "c"), None);
        assert_eq!(field_as_i64(&row, "missing"), None);
    }
}
