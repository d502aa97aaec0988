use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::grocy::GrocyClient;
use crate::middleware;
use crate::models::{
    BarcodeConsumeInput, BarcodeLinkInput, BarcodePurchaseInput, ConsumeItemInput,
    InventoryItemInput, ShoppingListItemInput, StockItemInput, ToolResponse,
};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<GrocyClient>,
}

type Reply = Result<Json<ToolResponse>, GatewayError>;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(api_routes(state))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Health check routes (no upstream involved)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Gateway API routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // System
        .route("/v1/system/status", get(system_status))
        .route("/v1/system/config", get(system_config))
        // Products and master data
        .route("/v1/products", get(list_products).post(create_product))
        .route(
            "/v1/products/:id",
            put(update_product).delete(delete_product),
        )
        .route("/v1/products/:id/barcodes", post(link_product_barcode))
        .route("/v1/locations", get(list_locations))
        .route("/v1/locations/:id", delete(delete_location))
        .route(
            "/v1/quantity-units",
            get(list_quantity_units).post(create_quantity_unit),
        )
        .route("/v1/quantity-units/:id", delete(delete_quantity_unit))
        .route("/v1/product-groups", get(list_product_groups))
        .route("/v1/product-groups/:id", delete(delete_product_group))
        .route("/v1/master-data", get(master_data_overview))
        .route("/v1/objects/:entity", get(inspect_entity))
        // Stock
        .route("/v1/stock", get(stock_overview))
        .route("/v1/stock/volatile", get(stock_volatile))
        .route("/v1/stock/products/:id", get(product_stock_details))
        .route("/v1/stock/products/:id/history", get(product_stock_history))
        .route("/v1/stock/add", post(add_stock))
        .route("/v1/stock/consume", post(consume_stock))
        .route("/v1/stock/inventory", post(inventory_product))
        .route("/v1/stock/bookings/:id/undo", post(undo_booking))
        .route("/v1/stock/transactions/:id/undo", post(undo_transaction))
        .route("/v1/stock/barcode/:barcode", get(barcode_lookup))
        .route("/v1/stock/barcode/:barcode/add", post(barcode_add))
        .route("/v1/stock/barcode/:barcode/consume", post(barcode_consume))
        // Shopping lists
        .route("/v1/shopping-lists", get(list_shopping_lists))
        .route("/v1/shopping-lists/add-missing", post(add_missing_products))
        .route("/v1/shopping-lists/:id", delete(delete_shopping_list))
        .route(
            "/v1/shopping-lists/:id/items",
            get(shopping_list_items).post(add_shopping_list_item),
        )
        .route("/v1/shopping-lists/:id/clear", post(clear_shopping_list))
        .route(
            "/v1/shopping-list-items/:id",
            delete(remove_shopping_list_item),
        )
        .with_state(state)
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "grocy-gateway",
        "version": VERSION,
        "status": "ok",
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// System handlers

async fn system_status(State(state): State<AppState>) -> Reply {
    let info = state.client.system_info().await?;
    let db_changed = state.client.db_changed_time().await?;
    Ok(Json(ToolResponse::new(
        json!({"system": info, "db_changed": db_changed}),
        "Grocy is reachable",
    )))
}

async fn system_config(State(state): State<AppState>) -> Reply {
    let config = state.client.system_config().await?;
    Ok(Json(ToolResponse::new(config, "Grocy config settings")))
}

// Product handlers

#[derive(Deserialize)]
struct ProductQuery {
    query: Option<String>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> Reply {
    let products = match params.query.as_deref() {
        Some(query) if !query.is_empty() => state.client.search_products(query).await?,
        _ => state.client.all_products().await?,
    };
    let summary = format!("Found {} products", products.len());
    Ok(Json(ToolResponse::new(json!(products), summary)))
}

async fn create_product(State(state): State<AppState>, Json(data): Json<Value>) -> Reply {
    let created = state.client.create_product(&data).await?;
    Ok(Json(
        ToolResponse::new(created, "Product created")
            .with_next(vec!["POST /v1/stock/add".to_string()]),
    ))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(data): Json<Value>,
) -> Reply {
    let updated = state.client.update_product(id, &data).await?;
    Ok(Json(ToolResponse::new(updated, format!("Product {id} updated"))))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.delete_product(id).await?;
    Ok(Json(ToolResponse::new(result, format!("Product {id} deleted"))))
}

async fn link_product_barcode(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<BarcodeLinkInput>,
) -> Reply {
    let result = state
        .client
        .link_barcode(id, &input.barcode, input.note.as_deref())
        .await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Barcode {} linked to product {id}", input.barcode),
    )))
}

// Master data handlers

async fn list_locations(State(state): State<AppState>) -> Reply {
    let locations = state.client.locations().await?;
    let summary = format!("{} locations defined", locations.len());
    Ok(Json(ToolResponse::new(json!(locations), summary)))
}

async fn delete_location(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.delete_location(id).await?;
    Ok(Json(ToolResponse::new(result, format!("Location {id} deleted"))))
}

async fn list_quantity_units(State(state): State<AppState>) -> Reply {
    let units = state.client.quantity_units().await?;
    Ok(Json(ToolResponse::new(units, "Quantity units")))
}

async fn create_quantity_unit(State(state): State<AppState>, Json(data): Json<Value>) -> Reply {
    let created = state.client.create_quantity_unit(&data).await?;
    Ok(Json(ToolResponse::new(created, "Quantity unit created")))
}

async fn delete_quantity_unit(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.delete_quantity_unit(id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Quantity unit {id} deleted"),
    )))
}

async fn list_product_groups(State(state): State<AppState>) -> Reply {
    let groups = state.client.product_groups().await?;
    Ok(Json(ToolResponse::new(groups, "Product groups")))
}

async fn delete_product_group(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.delete_product_group(id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Product group {id} deleted"),
    )))
}

async fn master_data_overview(State(state): State<AppState>) -> Reply {
    let products = state.client.all_products().await?;
    let locations = state.client.locations().await?;
    let units = state.client.quantity_units().await?;
    let groups = state.client.product_groups().await?;

    let unit_count = units.as_array().map(Vec::len).unwrap_or(0);
    let group_count = groups.as_array().map(Vec::len).unwrap_or(0);
    let summary = format!(
        "{} products, {} locations, {} quantity units, {} product groups",
        products.len(),
        locations.len(),
        unit_count,
        group_count
    );

    Ok(Json(ToolResponse::new(
        json!({
            "products": products.len(),
            "locations": locations,
            "quantity_units": units,
            "product_groups": groups,
        }),
        summary,
    )))
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn inspect_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(page): Query<PageQuery>,
) -> Reply {
    let rows = state
        .client
        .inspect_entity(&entity, page.limit.unwrap_or(50), page.offset.unwrap_or(0))
        .await?;
    let count = rows.as_array().map(Vec::len).unwrap_or(0);
    Ok(Json(ToolResponse::new(
        rows,
        format!("{count} rows from {entity}"),
    )))
}

// Stock handlers

async fn stock_overview(State(state): State<AppState>) -> Reply {
    let stock = state.client.stock_overview().await?;
    let count = stock.as_array().map(Vec::len).unwrap_or(0);
    Ok(Json(ToolResponse::new(
        stock,
        format!("{count} products in stock"),
    )))
}

async fn stock_volatile(State(state): State<AppState>) -> Reply {
    let volatile = state.client.stock_volatile().await?;
    Ok(Json(ToolResponse::new(
        volatile,
        "Expiring and missing products",
    )))
}

async fn product_stock_details(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let details = state.client.product_stock_details(id).await?;
    Ok(Json(ToolResponse::new(
        details,
        format!("Stock details for product {id}"),
    )))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn product_stock_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> Reply {
    let history = state
        .client
        .product_stock_history(id, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(ToolResponse::new(
        history,
        format!("Stock history for product {id}"),
    )))
}

async fn add_stock(State(state): State<AppState>, Json(items): Json<Vec<StockItemInput>>) -> Reply {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut added = 0usize;

    // Per-item outcome so one bad row does not abort the batch
    for item in &items {
        match state.client.add_stock(item).await {
            Ok(result) => {
                added += 1;
                results.push(json!({"product_id": item.product_id, "ok": true, "result": result}));
            }
            Err(err) => {
                results.push(
                    json!({"product_id": item.product_id, "ok": false, "error": err.to_string()}),
                );
            }
        }
    }

    Ok(Json(ToolResponse::new(
        json!(results),
        format!("Added stock for {added} of {total} items"),
    )))
}

async fn consume_stock(
    State(state): State<AppState>,
    Json(items): Json<Vec<ConsumeItemInput>>,
) -> Reply {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut consumed = 0usize;

    for item in &items {
        match state.client.consume_stock(item).await {
            Ok(result) => {
                consumed += 1;
                results.push(json!({"product_id": item.product_id, "ok": true, "result": result}));
            }
            Err(err) => {
                results.push(
                    json!({"product_id": item.product_id, "ok": false, "error": err.to_string()}),
                );
            }
        }
    }

    Ok(Json(ToolResponse::new(
        json!(results),
        format!("Consumed stock for {consumed} of {total} items"),
    )))
}

async fn inventory_product(
    State(state): State<AppState>,
    Json(item): Json<InventoryItemInput>,
) -> Reply {
    let result = state.client.inventory_product(&item).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!(
            "Product {} inventoried to {}",
            item.product_id, item.new_amount
        ),
    )))
}

async fn undo_booking(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.undo_booking(id).await?;
    Ok(Json(ToolResponse::new(result, format!("Booking {id} undone"))))
}

async fn undo_transaction(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let result = state.client.undo_transaction(&id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Transaction {id} undone"),
    )))
}

async fn barcode_lookup(State(state): State<AppState>, Path(barcode): Path<String>) -> Reply {
    let product = state.client.product_by_barcode(&barcode).await?;
    Ok(Json(ToolResponse::new(
        product,
        format!("Product for barcode {barcode}"),
    )))
}

async fn barcode_add(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
    Json(input): Json<BarcodePurchaseInput>,
) -> Reply {
    let result = state.client.add_stock_by_barcode(&barcode, &input).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Added {} via barcode {barcode}", input.amount),
    )))
}

async fn barcode_consume(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
    Json(input): Json<BarcodeConsumeInput>,
) -> Reply {
    let result = state
        .client
        .consume_stock_by_barcode(&barcode, &input)
        .await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Consumed {} via barcode {barcode}", input.amount),
    )))
}

// Shopping list handlers

async fn list_shopping_lists(State(state): State<AppState>) -> Reply {
    let lists = state.client.shopping_lists().await?;
    let count = lists.as_array().map(Vec::len).unwrap_or(0);
    Ok(Json(ToolResponse::new(
        lists,
        format!("{count} shopping lists"),
    )))
}

async fn shopping_list_items(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let items = state.client.shopping_list_items(id).await?;
    let summary = format!("{} items on shopping list {id}", items.len());
    Ok(Json(ToolResponse::new(json!(items), summary)))
}

async fn add_shopping_list_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ShoppingListItemInput>,
) -> Reply {
    let result = state
        .client
        .add_shopping_list_item(id, input.product_id, input.amount, input.note.as_deref())
        .await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Product {} added to shopping list {id}", input.product_id),
    )))
}

async fn remove_shopping_list_item(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.remove_shopping_list_item(id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Shopping list item {id} removed"),
    )))
}

async fn clear_shopping_list(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.clear_shopping_list(id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Shopping list {id} cleared"),
    )))
}

async fn add_missing_products(State(state): State<AppState>) -> Reply {
    let result = state.client.add_missing_products().await?;
    Ok(Json(
        ToolResponse::new(result, "Missing products added to the default list")
            .with_next(vec!["GET /v1/shopping-lists".to_string()]),
    ))
}

async fn delete_shopping_list(State(state): State<AppState>, Path(id): Path<i64>) -> Reply {
    let result = state.client.delete_shopping_list(id).await?;
    Ok(Json(ToolResponse::new(
        result,
        format!("Shopping list {id} deleted"),
    )))
}
