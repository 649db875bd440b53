//! Stock reservation.
//!
//! Each line is a single conditional decrement; the condition is the
//! concurrency guard. A failed line aborts the caller's transaction, which
//! discards the decrements already applied for earlier lines.

use tracing::warn;
use crate::domain::aggregates::OrderLine;
use crate::error::{AppError, Result};
use crate::store::StoreTx;

pub async fn reserve(tx: &mut dyn StoreTx, lines: &[OrderLine]) -> Result<()> {
    for line in lines {
        if !tx.decrement_stock(line.product_id, line.variant_id, line.quantity).await? {
            warn!(product_id = %line.product_id, variant_id = ?line.variant_id, quantity = line.quantity, "insufficient stock");
            return Err(AppError::InsufficientStock {
                product_id: line.product_id, variant_id: line.variant_id, name: line.name.clone(), requested: line.quantity,
            });
        }
    }
    Ok(())
}

/// Returns reserved stock to the pool.
pub async fn release(tx: &mut dyn StoreTx, lines: &[OrderLine]) -> Result<()> {
    for line in lines {
        tx.increment_stock(line.product_id, line.variant_id, line.quantity).await?;
    }
    Ok(())
}
