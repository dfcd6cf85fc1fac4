//! # Seed Data Generator
//!
//! Populates a development database with orders, products and batches.
//!
//! ## Usage
//! ```bash
//! # Generate 50 orders (default)
//! cargo run -p tally-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p tally-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! Every order gets 1-3 items drawn from the catalog below; every product
//! gets one stock batch. Order statuses cycle through the full enumeration
//! so each console state has examples.

use chrono::{Duration, Utc};
use std::env;
use tally_core::{
    InventoryBatch, Order, OrderItem, OrderStatus, PaymentStatus, ProductStock,
};
use tally_db::{Database, DbConfig, NewOrder};
use uuid::Uuid;

/// (SKU, name, unit price in cents)
const CATALOG: &[(&str, &str, i64)] = &[
    ("TEE-BLK-M", "Logo Tee Black M", 2000),
    ("TEE-WHT-L", "Logo Tee White L", 2000),
    ("HOOD-GRY-M", "Zip Hoodie Grey M", 5500),
    ("MUG-12OZ", "Enamel Mug 12oz", 1450),
    ("CAP-NVY", "Dad Cap Navy", 2400),
    ("TOTE-NAT", "Canvas Tote", 1800),
    ("STKR-PACK", "Sticker Pack", 600),
    ("POSTER-A2", "Print A2", 3200),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of orders to generate (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tally Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!("Orders:   {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.orders().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} orders", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Products and one batch each
    let now = Utc::now();
    let mut product_ids = Vec::with_capacity(CATALOG.len());
    for (idx, (sku, name, _)) in CATALOG.iter().enumerate() {
        let product = ProductStock {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            stock_quantity: 20 + (idx as i64 * 7) % 40,
            low_stock_threshold: 5,
            updated_at: now,
        };
        db.inventory().insert_product(&product).await?;
        db.inventory()
            .insert_batch(&InventoryBatch {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                quantity_actual: product.stock_quantity,
                quantity_available: product.stock_quantity,
                low_stock_threshold: product.low_stock_threshold,
                updated_at: now,
            })
            .await?;
        product_ids.push(product.id);
    }
    println!("✓ Inserted {} products with batches", CATALOG.len());

    let start = std::time::Instant::now();
    let mut generated = 0;
    for seed in 0..count {
        let order = generate_order(seed, &product_ids);
        if let Err(e) = db.orders().insert(&order).await {
            eprintln!("Failed to insert {}: {}", order.order.order_number, e);
            continue;
        }
        generated += 1;
    }

    println!();
    println!("✓ Generated {} orders in {:?}", generated, start.elapsed());
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates one order with deterministic pseudo-random content.
fn generate_order(seed: usize, product_ids: &[String]) -> NewOrder {
    let created_at = Utc::now() - Duration::hours(seed as i64);
    let id = Uuid::new_v4().to_string();
    let status = OrderStatus::ALL[seed % OrderStatus::ALL.len()];
    let payment_status = match status {
        OrderStatus::PendingPayment => PaymentStatus::Unpaid,
        OrderStatus::Failed => PaymentStatus::Failed,
        _ => PaymentStatus::Paid,
    };

    let line_count = 1 + seed % 3;
    let items: Vec<OrderItem> = (0..line_count)
        .map(|line| {
            let idx = (seed * 5 + line * 3) % CATALOG.len();
            let (_, name, unit_price_cents) = CATALOG[idx];
            let quantity = 1 + ((seed + line) % 3) as i64;
            OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: id.clone(),
                product_id: product_ids[idx].clone(),
                name: name.to_string(),
                unit_price_cents,
                quantity,
                line_total_cents: unit_price_cents * quantity,
            }
        })
        .collect();

    let subtotal_cents: i64 = items.iter().map(|item| item.line_total_cents).sum();
    let shipping_cents = if subtotal_cents >= 5000 { 0 } else { 595 };
    // 8.25% tax, rounded half-up in integer cents
    let tax_cents = (subtotal_cents * 825 + 5000) / 10000;

    NewOrder {
        order: Order {
            id: id.clone(),
            order_number: format!("{}", 10001 + seed),
            status,
            payment_status,
            subtotal_cents,
            shipping_cents,
            tax_cents,
            total_cents: subtotal_cents + shipping_cents + tax_cents,
            refunded_total_cents: 0,
            payment_reference: payment_status
                .is_paid()
                .then(|| format!("pi_dev_{:06}", seed)),
            customer_email: Some(format!("customer{}@example.com", seed)),
            created_at,
            updated_at: created_at,
        },
        items,
        actor_id: "seed".to_string(),
    }
}
