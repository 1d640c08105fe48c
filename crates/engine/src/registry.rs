//! The set of operations served by normalizer logic rather than passed
//! straight through to the venue connector.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizerMethod {
    Positions,
    Position,
    Markets,
    Market,
    Ticker,
    Symbols,
    Balances,
    BalanceUsd,
    FreeBalanceUsd,
    TotalBalanceUsd,
    Orders,
    Cancel,
    CancelAll,
    GetMarketById,
    GetMarketBySymbol,
    GetMarketByIdOrSymbol,
    CreateOrder,
    CustomParams,
    Leverage,
}

impl NormalizerMethod {
    pub const ALL: [NormalizerMethod; 19] = [
        NormalizerMethod::Positions,
        NormalizerMethod::Position,
        NormalizerMethod::Markets,
        NormalizerMethod::Market,
        NormalizerMethod::Ticker,
        NormalizerMethod::Symbols,
        NormalizerMethod::Balances,
        NormalizerMethod::BalanceUsd,
        NormalizerMethod::FreeBalanceUsd,
        NormalizerMethod::TotalBalanceUsd,
        NormalizerMethod::Orders,
        NormalizerMethod::Cancel,
        NormalizerMethod::CancelAll,
        NormalizerMethod::GetMarketById,
        NormalizerMethod::GetMarketBySymbol,
        NormalizerMethod::GetMarketByIdOrSymbol,
        NormalizerMethod::CreateOrder,
        NormalizerMethod::CustomParams,
        NormalizerMethod::Leverage,
    ];

    /// Name used for dispatch, cache keys, and stats.
    pub fn name(&self) -> &'static str {
        match self {
            NormalizerMethod::Positions => "positions",
            NormalizerMethod::Position => "position",
            NormalizerMethod::Markets => "markets",
            NormalizerMethod::Market => "market",
            NormalizerMethod::Ticker => "ticker",
            NormalizerMethod::Symbols => "symbols",
            NormalizerMethod::Balances => "balances",
            NormalizerMethod::BalanceUsd => "balance_usd",
            NormalizerMethod::FreeBalanceUsd => "free_balance_usd",
            NormalizerMethod::TotalBalanceUsd => "total_balance_usd",
            NormalizerMethod::Orders => "orders",
            NormalizerMethod::Cancel => "cancel",
            NormalizerMethod::CancelAll => "cancel_all",
            NormalizerMethod::GetMarketById => "get_market_by_id",
            NormalizerMethod::GetMarketBySymbol => "get_market_by_symbol",
            NormalizerMethod::GetMarketByIdOrSymbol => "get_market_by_id_or_symbol",
            NormalizerMethod::CreateOrder => "create_order",
            NormalizerMethod::CustomParams => "custom_params",
            NormalizerMethod::Leverage => "leverage",
        }
    }

    /// Resolve a method name. Camel-case spellings (`cancelAll`,
    /// `getMarketByIdOrSymbol`) are accepted as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let snake = to_snake_case(name);
        Self::ALL.into_iter().find(|m| m.name() == snake)
    }
}

impl fmt::Display for NormalizerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
