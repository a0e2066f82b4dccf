//! Instrument definitions and the per-room registry of them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{InstrumentId, InstrumentKind, Price};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    #[error("symbol {0} already exists in this room")]
    DuplicateSymbol(String),

    #[error("reference instrument {0} does not exist")]
    UnknownReference(InstrumentId),

    #[error("reference instrument {0} is not a scalar")]
    ReferenceNotScalar(InstrumentId),

    #[error("options require a reference_id and strike")]
    MissingOptionFields,
}

/// A tradable instrument: a scalar underlying, or a call/put deriving from
/// one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub kind: InstrumentKind,
    pub tick_size: Price,
    pub lot_size: crate::types::Qty,
    pub tick_value: f64,
    pub reference_id: Option<InstrumentId>,
    pub strike: Option<Price>,
    pub halted: bool,
    pub settlement: Option<Price>,
}

impl Instrument {
    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    /// Intrinsic payoff at underlying value `spot`, for options only.
    pub fn intrinsic(&self, spot: Price) -> Price {
        let strike = self.strike.unwrap_or(0);
        match self.kind {
            InstrumentKind::Call => (spot - strike).max(0),
            InstrumentKind::Put => (strike - spot).max(0),
            InstrumentKind::Scalar => spot,
        }
    }
}

/// Specification for adding a new instrument (the `add_instrument` wire op).
#[derive(Debug, Clone)]
pub struct NewInstrument {
    pub symbol: String,
    pub kind: InstrumentKind,
    pub tick_size: Price,
    pub lot_size: crate::types::Qty,
    pub tick_value: f64,
    pub reference_id: Option<InstrumentId>,
    pub strike: Option<Price>,
}

/// Per-room table of instruments, keyed by id, with a symbol uniqueness
/// index.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<InstrumentId, Instrument>,
    symbols: HashMap<String, InstrumentId>,
    next_id: InstrumentId,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, spec: NewInstrument) -> Result<InstrumentId, InstrumentError> {
        if self.symbols.contains_key(&spec.symbol) {
            return Err(InstrumentError::DuplicateSymbol(spec.symbol));
        }
        if spec.kind.is_option() {
            let reference_id = spec.reference_id.ok_or(InstrumentError::MissingOptionFields)?;
            spec.strike.ok_or(InstrumentError::MissingOptionFields)?;
            let reference = self
                .instruments
                .get(&reference_id)
                .ok_or(InstrumentError::UnknownReference(reference_id))?;
            if reference.kind != InstrumentKind::Scalar {
                return Err(InstrumentError::ReferenceNotScalar(reference_id));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let instrument = Instrument {
            instrument_id: id,
            symbol: spec.symbol.clone(),
            kind: spec.kind,
            tick_size: spec.tick_size,
            lot_size: spec.lot_size,
            tick_value: spec.tick_value,
            reference_id: spec.reference_id,
            strike: spec.strike,
            halted: false,
            settlement: None,
        };
        self.symbols.insert(spec.symbol, id);
        self.instruments.insert(id, instrument);
        Ok(id)
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    pub fn get_mut(&mut self, id: InstrumentId) -> Option<&mut Instrument> {
        self.instruments.get_mut(&id)
    }

    pub fn set_halted(&mut self, id: InstrumentId, halted: bool) -> Option<()> {
        self.instruments.get_mut(&id).map(|inst| inst.halted = halted)
    }

    pub fn set_tick_size(&mut self, id: InstrumentId, tick_size: Price) -> Option<()> {
        self.instruments.get_mut(&id).map(|inst| inst.tick_size = tick_size)
    }

    pub fn settle(&mut self, id: InstrumentId, value: Price) -> Option<()> {
        self.instruments.get_mut(&id).map(|inst| inst.settlement = Some(value))
    }

    pub fn list(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    /// Options whose `reference_id` points at `scalar_id` (used for
    /// settlement cascades).
    pub fn options_referencing(&self, scalar_id: InstrumentId) -> Vec<InstrumentId> {
        self.instruments
            .values()
            .filter(|i| i.kind.is_option() && i.reference_id == Some(scalar_id))
            .map(|i| i.instrument_id)
            .collect()
    }
}
