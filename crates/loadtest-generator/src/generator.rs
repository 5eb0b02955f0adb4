//! Main payload generator for producing request documents.

use crate::generators::numeric::{generate_decimal_range, generate_int_range};
use crate::generators::{IdSource, RequestMix, SequentialIds, TransIdMode, TransIdPool};
use exchange_types::{
    Account, Action, Cancel, CreateElement, CreateRequest, Order, Payload, Query, RequestKind,
    Symbol, SymbolAccount, TransactionRequest,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Symbols the generator trades in.
pub const SYMBOLS: [&str; 5] = ["SPY", "AAPL", "GOOG", "MSFT", "TSLA"];

const MAX_ACCOUNTS: usize = 3;
const MAX_SYMBOLS: usize = 2;
const MIN_SYMBOL_ACCOUNTS: usize = 1;
const MAX_SYMBOL_ACCOUNTS: usize = 3;
const MIN_ACTIONS: usize = 1;
const MAX_ACTIONS: usize = 5;
const MIN_ORDER_AMOUNT: i64 = -100;
const MAX_ORDER_AMOUNT: i64 = 100;
const MIN_SHARES: i64 = 1;
const MAX_SHARES: i64 = 1000;

/// How often the id source is asked again after a collision within one payload.
const MAX_ID_ATTEMPTS: usize = 16;

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The id source kept returning ids already used in the payload.
    #[error("Id source returned duplicate id '{id}' after {attempts} attempts")]
    DuplicateId { id: String, attempts: usize },
}

/// Something that can hand out request payloads.
///
/// [`PayloadGenerator`] is the real implementation; virtual clients only
/// depend on this trait.
pub trait PayloadSource: Send {
    /// Pick the kind of the next request.
    fn choose_kind(&mut self, mix: &RequestMix) -> RequestKind;

    /// Build a payload of the given kind.
    fn generate(&mut self, kind: RequestKind) -> Result<Payload, GeneratorError>;
}

/// Payload generator that produces randomized request documents.
///
/// The generator draws all randomness from `rng`, so the same seed and
/// id source reproduce the same payload sequence.
pub struct PayloadGenerator<R = StdRng> {
    /// Random number generator
    rng: R,
    /// Source of account id tokens
    ids: Box<dyn IdSource>,
    /// Transaction ids and their correlation history
    trans_ids: TransIdPool,
    /// Number of payloads generated so far
    index: u64,
}

impl PayloadGenerator<StdRng> {
    /// Create a new generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> PayloadGenerator<R> {
    /// Create a generator that draws from the given random source.
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            ids: Box::new(SequentialIds::default()),
            trans_ids: TransIdPool::new(TransIdMode::default()),
            index: 0,
        }
    }

    /// Replace the account id source.
    pub fn with_ids(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Choose how query and cancel ids relate to order ids.
    pub fn with_trans_id_mode(mut self, mode: TransIdMode) -> Self {
        self.trans_ids = TransIdPool::new(mode);
        self
    }

    /// Number of payloads generated so far.
    pub fn current_index(&self) -> u64 {
        self.index
    }

    /// Generate a `<create>` request.
    ///
    /// Produces 0-3 accounts and 0-2 symbols, each symbol crediting 1-3
    /// accounts, and shuffles all of them into one sequence. Every account
    /// id in the result is distinct.
    pub fn generate_create(&mut self) -> Result<CreateRequest, GeneratorError> {
        let mut used = HashSet::new();
        let mut elements = Vec::new();

        let account_count = self.rng.gen_range(0..=MAX_ACCOUNTS);
        for _ in 0..account_count {
            let id = self.unique_id(&mut used)?;
            let balance = generate_decimal_range(
                &mut self.rng,
                Decimal::new(1000, 0),
                Decimal::new(100_000, 0),
            );
            elements.push(CreateElement::Account(Account { id, balance }));
        }

        let symbol_count = self.rng.gen_range(0..=MAX_SYMBOLS);
        for _ in 0..symbol_count {
            let name = self.pick_symbol();
            let holders = self
                .rng
                .gen_range(MIN_SYMBOL_ACCOUNTS..=MAX_SYMBOL_ACCOUNTS);
            let mut accounts = Vec::with_capacity(holders);
            for _ in 0..holders {
                let id = self.unique_id(&mut used)?;
                let shares = generate_int_range(&mut self.rng, MIN_SHARES, MAX_SHARES) as u32;
                accounts.push(SymbolAccount { id, shares });
            }
            elements.push(CreateElement::Symbol(Symbol { name, accounts }));
        }

        elements.shuffle(&mut self.rng);
        self.index += 1;

        Ok(CreateRequest { elements })
    }

    /// Generate a `<transactions>` request.
    ///
    /// Produces an account id and 1-5 actions chosen uniformly from order,
    /// query and cancel, then shuffles the actions.
    pub fn generate_transaction(&mut self) -> Result<TransactionRequest, GeneratorError> {
        let account_id = self.ids.next_id(&mut self.rng);

        let action_count = self.rng.gen_range(MIN_ACTIONS..=MAX_ACTIONS);
        let mut actions = Vec::with_capacity(action_count);
        let mut issued = Vec::new();

        for _ in 0..action_count {
            let action = match self.rng.gen_range(0..3u8) {
                0 => {
                    let symbol = self.pick_symbol();
                    let amount =
                        generate_int_range(&mut self.rng, MIN_ORDER_AMOUNT, MAX_ORDER_AMOUNT) as i32;
                    let limit = generate_decimal_range(
                        &mut self.rng,
                        Decimal::new(10, 0),
                        Decimal::new(100, 0),
                    );
                    let trans_id = self.trans_ids.issue(&mut self.rng);
                    issued.push(trans_id.clone());
                    Action::Order(Order {
                        symbol,
                        amount,
                        limit,
                        trans_id,
                    })
                }
                1 => Action::Query(Query {
                    trans_id: self.trans_ids.reference(&mut self.rng, &issued),
                }),
                _ => Action::Cancel(Cancel {
                    trans_id: self.trans_ids.reference(&mut self.rng, &issued),
                }),
            };
            actions.push(action);
        }

        actions.shuffle(&mut self.rng);
        self.index += 1;

        Ok(TransactionRequest {
            account_id,
            actions,
        })
    }

    /// Generate a payload of the given kind.
    pub fn generate(&mut self, kind: RequestKind) -> Result<Payload, GeneratorError> {
        match kind {
            RequestKind::Create => self.generate_create().map(Payload::Create),
            RequestKind::Transaction => self.generate_transaction().map(Payload::Transaction),
        }
    }

    /// Pick the next request kind from `mix`.
    pub fn choose_kind(&mut self, mix: &RequestMix) -> RequestKind {
        mix.pick(&mut self.rng)
    }

    fn pick_symbol(&mut self) -> String {
        let idx = self.rng.gen_range(0..SYMBOLS.len());
        SYMBOLS[idx].to_string()
    }

    fn unique_id(&mut self, used: &mut HashSet<String>) -> Result<String, GeneratorError> {
        let mut id = String::new();
        for _ in 0..MAX_ID_ATTEMPTS {
            id = self.ids.next_id(&mut self.rng);
            if used.insert(id.clone()) {
                return Ok(id);
            }
        }
        Err(GeneratorError::DuplicateId {
            id,
            attempts: MAX_ID_ATTEMPTS,
        })
    }
}

impl<R: Rng + Send> PayloadSource for PayloadGenerator<R> {
    fn choose_kind(&mut self, mix: &RequestMix) -> RequestKind {
        PayloadGenerator::choose_kind(self, mix)
    }

    fn generate(&mut self, kind: RequestKind) -> Result<Payload, GeneratorError> {
        PayloadGenerator::generate(self, kind)
    }
}
