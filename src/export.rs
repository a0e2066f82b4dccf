//! CSV export of a room's trade/fill/PnL history on shutdown, grounded in
//! the three-file-per-room layout the original gateway writes.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::engine::Engine;
use crate::types::UserId;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error writing export: {0}")]
    Io(#[from] io::Error),
    #[error("csv error writing export: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, serde::Serialize)]
struct TradeRow {
    timestamp: String,
    instrument_id: u32,
    buyer_id: UserId,
    seller_id: UserId,
    price: f64,
    quantity: u64,
    buy_order_id: u64,
    sell_order_id: u64,
}

#[derive(Debug, serde::Serialize)]
struct FillRow {
    timestamp: String,
    order_id: u64,
    user_id: UserId,
    instrument_id: u32,
    side: String,
    price: f64,
    quantity: u64,
}

#[derive(Debug, serde::Serialize)]
struct PnlRow {
    user_id: UserId,
    user_name: String,
    total_pnl: f64,
    positions: String,
}

/// Writes `trades_<ts>.csv`, `fills_<ts>.csv`, and `pnl_<ts>.csv` into
/// `exports/<room_code>/`. `user_names` supplies display names for the PnL
/// rows (the engine itself has no notion of a user's name).
pub fn export_room(
    base_dir: &Path,
    room_code: &str,
    engine: &Engine,
    user_names: &std::collections::HashMap<UserId, String>,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> Result<(), ExportError> {
    let dir: PathBuf = base_dir.join(room_code);
    std::fs::create_dir_all(&dir)?;
    let suffix = timestamp.format("%Y%m%d%H%M%S");

    {
        let mut w = csv::Writer::from_path(dir.join(format!("trades_{suffix}.csv")))?;
        for t in engine.trades() {
            w.serialize(TradeRow {
                timestamp: t.timestamp.to_rfc3339(),
                instrument_id: t.instrument_id,
                buyer_id: t.buyer_id,
                seller_id: t.seller_id,
                price: crate::message::to_display(t.price),
                quantity: t.quantity,
                buy_order_id: t.buy_order_id,
                sell_order_id: t.sell_order_id,
            })?;
        }
        w.flush()?;
    }

    {
        let mut w = csv::Writer::from_path(dir.join(format!("fills_{suffix}.csv")))?;
        for f in engine.fills() {
            w.serialize(FillRow {
                timestamp: f.timestamp.to_rfc3339(),
                order_id: f.order_id,
                user_id: f.user_id,
                instrument_id: f.instrument_id,
                side: f.side.to_string(),
                price: crate::message::to_display(f.price),
                quantity: f.quantity,
            })?;
        }
        w.flush()?;
    }

    {
        let mut w = csv::Writer::from_path(dir.join(format!("pnl_{suffix}.csv")))?;
        for user_id in user_names.keys().copied() {
            let positions = engine.positions_of_user(user_id);
            let total_pnl: f64 = positions.iter().map(|(_, _, pnl)| pnl).sum();
            let positions_str = positions
                .iter()
                .map(|(inst, pos, _)| format!("{inst}:{}", pos.net_qty))
                .collect::<Vec<_>>()
                .join(";");
            w.serialize(PnlRow {
                user_id,
                user_name: user_names.get(&user_id).cloned().unwrap_or_default(),
                total_pnl,
                positions: positions_str,
            })?;
        }
        w.flush()?;
    }

    info!(room_code, dir = %dir.display(), "exported room data");
    Ok(())
}
