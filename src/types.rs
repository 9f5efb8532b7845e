//! Core data structures shared across the detection pipeline
//!
//! Tokens, pair keys, DEX descriptors, pool snapshots (V2 reserves and
//! V3 sqrtPrice/liquidity), and the opportunity record emitted to the sink.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Rough volatility class of a token. Drives the per-pair slippage
/// allowance in the profit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenClass {
    Stable,
    Native,
    BlueChip,
    Volatile,
    Meme,
}

impl TokenClass {
    /// Base slippage allowance as a fraction (0.001 = 0.1%).
    pub fn slippage_allowance(&self) -> f64 {
        match self {
            TokenClass::Stable => 0.001,
            TokenClass::Native => 0.003,
            TokenClass::BlueChip => 0.005,
            TokenClass::Volatile => 0.010,
            TokenClass::Meme => 0.015,
        }
    }
}

impl Default for TokenClass {
    fn default() -> Self {
        TokenClass::Volatile
    }
}

/// A token tracked on one chain. Immutable for the lifetime of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    #[serde(default)]
    pub class: TokenClass,
}

impl Token {
    pub fn new(symbol: &str, address: Address, decimals: u8, class: TokenClass) -> Self {
        Self {
            symbol: symbol.to_string(),
            address,
            decimals,
            class,
        }
    }

    /// 10^decimals as a U256 multiplier.
    pub fn one(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals))
    }
}

/// Canonical identity of an unordered market pair.
///
/// Symbols are ordered lexicographically so that WETH/USDC and USDC/WETH
/// produce the same key. The on-chain token0/token1 orientation is carried
/// separately on each pool edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                first: a.to_string(),
                second: b.to_string(),
            }
        } else {
            Self {
                first: b.to_string(),
                second: a.to_string(),
            }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    /// True if `symbol` is one of the two legs.
    pub fn contains(&self, symbol: &str) -> bool {
        self.first == symbol || self.second == symbol
    }

    /// The other leg, if `symbol` is one of the two.
    pub fn other(&self, symbol: &str) -> Option<&str> {
        if self.first == symbol {
            Some(&self.second)
        } else if self.second == symbol {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

impl Serialize for PairKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// AMM family a DEX belongs to. Determines which snapshot shape its pools
/// carry and which pricing kernel applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DexFamily {
    /// Uniswap-V2 style constant product (x * y = k) with a flat fee.
    ConstantProductV2,
    /// Uniswap-V3 style concentrated liquidity (sqrtPriceX96 + in-range L).
    ConcentratedV3,
    /// Solidly forks. Volatile pools price like V2; stable pools use the
    /// x3y + xy3 curve.
    Solidly,
    /// Curve-style stable pools. Priced via the stable-curve invariant.
    StableCurve,
    /// Balancer weighted pools. 50/50 pools price like V2.
    Balancer,
}

impl DexFamily {
    /// True if pools of this family carry a two-reserve snapshot.
    pub fn is_reserve_based(&self) -> bool {
        !matches!(self, DexFamily::ConcentratedV3)
    }

    /// True if the stable-curve invariant applies instead of x*y=k.
    pub fn is_stable_curve(&self) -> bool {
        matches!(self, DexFamily::StableCurve)
    }
}

impl fmt::Display for DexFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DexFamily::ConstantProductV2 => write!(f, "v2"),
            DexFamily::ConcentratedV3 => write!(f, "v3"),
            DexFamily::Solidly => write!(f, "solidly"),
            DexFamily::StableCurve => write!(f, "stable-curve"),
            DexFamily::Balancer => write!(f, "balancer"),
        }
    }
}

/// One DEX deployment on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexDescriptor {
    pub name: String,
    pub family: DexFamily,
    /// Swap fee as a fraction (0.003 = 0.30%). Validated into [0, 0.1].
    pub fee: f64,
    #[serde(default)]
    pub factory: Address,
    #[serde(default)]
    pub router: Address,
    /// V3 fee tier in hundredths of a bip (500 = 0.05%). None for non-V3.
    #[serde(default)]
    pub fee_tier: Option<u32>,
}

impl DexDescriptor {
    pub fn new(name: &str, family: DexFamily, fee: f64) -> Self {
        Self {
            name: name.to_string(),
            family,
            fee,
            factory: Address::ZERO,
            router: Address::ZERO,
            fee_tier: None,
        }
    }

    pub fn with_fee_tier(mut self, tier: u32) -> Self {
        self.fee_tier = Some(tier);
        self
    }
}

/// Shared handle to a DEX descriptor. Edges reference the descriptor rather
/// than cloning it per pool.
pub type DexRef = Arc<DexDescriptor>;

/// Reserve snapshot of a two-reserve pool (V2, solidly, balancer 50/50).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Snapshot {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block: u64,
}

impl V2Snapshot {
    pub fn new(reserve0: U256, reserve1: U256, block: u64) -> Self {
        Self {
            reserve0,
            reserve1,
            block,
        }
    }

    /// Admissible pools have both reserves strictly positive.
    pub fn is_admissible(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }
}

/// One initialized tick in a V3 pool's tick table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEntry {
    pub tick: i32,
    /// Net liquidity change when crossing this tick left to right.
    pub liquidity_net: i128,
}

/// Concentrated-liquidity snapshot of a V3 pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Snapshot {
    /// sqrt(price) as a Q64.96 fixed point number.
    pub sqrt_price_x96: U256,
    /// In-range liquidity.
    pub liquidity: u128,
    pub tick: i32,
    /// Fee tier in hundredths of a bip (500 = 0.05%).
    pub fee_tier: u32,
    pub block: u64,
    /// Initialized ticks sorted ascending, when the source supplies them.
    /// Absent table forces the single-range estimate path.
    pub ticks: Option<Vec<TickEntry>>,
}

impl V3Snapshot {
    pub fn new(sqrt_price_x96: U256, liquidity: u128, tick: i32, fee_tier: u32, block: u64) -> Self {
        Self {
            sqrt_price_x96,
            liquidity,
            tick,
            fee_tier,
            block,
            ticks: None,
        }
    }

    pub fn is_admissible(&self) -> bool {
        self.liquidity > 0 && !self.sqrt_price_x96.is_zero()
    }

    /// Fee as a fraction (fee_tier 500 -> 0.0005).
    pub fn fee_fraction(&self) -> f64 {
        self.fee_tier as f64 / 1_000_000.0
    }
}

/// Snapshot of one pool, tagged by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSnapshot {
    V2(V2Snapshot),
    V3(V3Snapshot),
}

impl PoolSnapshot {
    pub fn block(&self) -> u64 {
        match self {
            PoolSnapshot::V2(s) => s.block,
            PoolSnapshot::V3(s) => s.block,
        }
    }

    pub fn is_admissible(&self) -> bool {
        match self {
            PoolSnapshot::V2(s) => s.is_admissible(),
            PoolSnapshot::V3(s) => s.is_admissible(),
        }
    }

    pub fn as_v2(&self) -> Option<&V2Snapshot> {
        match self {
            PoolSnapshot::V2(s) => Some(s),
            PoolSnapshot::V3(_) => None,
        }
    }

    pub fn as_v3(&self) -> Option<&V3Snapshot> {
        match self {
            PoolSnapshot::V3(s) => Some(s),
            PoolSnapshot::V2(_) => None,
        }
    }
}

/// Output of a pricing kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_out: U256,
    /// True when the quote left the modeled range (V3 swap crossing out of
    /// the known ticks). Estimated quotes get a profit discount downstream.
    pub estimated: bool,
}

impl Quote {
    pub fn exact(amount_out: U256) -> Self {
        Self {
            amount_out,
            estimated: false,
        }
    }

    pub fn estimated(amount_out: U256) -> Self {
        Self {
            amount_out,
            estimated: true,
        }
    }

    pub fn zero() -> Self {
        Self::exact(U256::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_out.is_zero()
    }
}

/// Variant tag of a detected opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpportunityKind {
    TwoDex,
    TriangularSingleDex,
    TriangularCrossDex,
    MultiHop,
    V2V3,
    Stable,
    LsdProtocolDex,
    LsdCrossDex,
    JitArb,
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OpportunityKind::TwoDex => "two-dex",
            OpportunityKind::TriangularSingleDex => "triangular-single-dex",
            OpportunityKind::TriangularCrossDex => "triangular-cross-dex",
            OpportunityKind::MultiHop => "multi-hop",
            OpportunityKind::V2V3 => "v2v3",
            OpportunityKind::Stable => "stable",
            OpportunityKind::LsdProtocolDex => "lsd-protocol-dex",
            OpportunityKind::LsdCrossDex => "lsd-cross-dex",
            OpportunityKind::JitArb => "jit-arb",
        };
        write!(f, "{}", s)
    }
}

/// What the execution simulator recommends for an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Execute,
    ExecuteWithCaution,
    Evaluate,
    Skip,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Recommendation::Execute => "EXECUTE",
            Recommendation::ExecuteWithCaution => "EXECUTE_WITH_CAUTION",
            Recommendation::Evaluate => "EVALUATE",
            Recommendation::Skip => "SKIP",
        };
        write!(f, "{}", s)
    }
}

/// Score band of an opportunity (from the 0..100 composite score).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreTier {
    Excellent,
    Good,
    Acceptable,
    Marginal,
    Poor,
}

impl ScoreTier {
    /// Band edges at 80 / 60 / 40 / 20.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ScoreTier::Excellent
        } else if score >= 60.0 {
            ScoreTier::Good
        } else if score >= 40.0 {
            ScoreTier::Acceptable
        } else if score >= 20.0 {
            ScoreTier::Marginal
        } else {
            ScoreTier::Poor
        }
    }
}

/// MEV exposure and execution-probability assessment attached to every
/// emitted opportunity. Filled by the execution simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MevAssessment {
    pub competitor_count: u32,
    pub win_probability: f64,
    pub frontrun_risk: f64,
    pub backrun_risk: f64,
    pub sandwich_risk: f64,
    /// Composite risk in [0, 1].
    pub risk_score: f64,
    /// Expected loss to MEV in USD, capped at the opportunity's profit.
    pub potential_loss_usd: f64,
    /// Blocks since detection divided by chain block time.
    pub staleness_factor: f64,
    /// Weighted success probability in [0, 1].
    pub success_probability: f64,
    /// probability * profit - (1 - probability) * gas - potential MEV loss.
    pub risk_adjusted_ev_usd: f64,
}

/// One hop of an opportunity path.
#[derive(Debug, Clone)]
pub struct Hop {
    pub from: String,
    pub to: String,
    pub dex: String,
    pub pool: Address,
}

impl Hop {
    pub fn new(from: &str, to: &str, dex: &str, pool: Address) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            dex: dex.to_string(),
            pool,
        }
    }
}

/// A detected, sized, and scored arbitrage opportunity.
///
/// Created once per detection pass, enriched by the profit model, execution
/// simulator, and scorer, then handed to the sink and dropped.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub chain_id: u64,
    /// Token symbols along the path. Cycles end at their start token.
    pub path: Vec<String>,
    pub hops: Vec<Hop>,
    /// Input in base-token raw units.
    pub amount_in: U256,
    /// Expected final output in base-token raw units.
    pub expected_out: U256,
    /// expected_out - amount_in, floored at zero, in base-token raw units.
    pub gross_profit: U256,
    pub spread_percent: f64,
    pub net_profit_usd: f64,
    pub gas_cost_usd: f64,
    /// Smallest USD-valued liquidity along the path.
    pub min_liquidity_usd: f64,
    pub timestamp: u64,
    /// Block number of the freshest edge used.
    pub block_number: u64,
    pub score: f64,
    pub tier: ScoreTier,
    pub recommendation: Recommendation,
    pub mev: MevAssessment,
    /// Success-probability derived confidence in [0, 1].
    pub confidence: f64,
    pub flash_loan_available: bool,
    /// True if any hop used an estimated (range-crossing) V3 quote.
    pub estimated_quote: bool,
    /// LSD only: opportunity fell inside the post-oracle-report rebase window.
    pub rebase_window: bool,
}

impl Opportunity {
    /// Bare opportunity as produced by a detector. Scoring fields start at
    /// their neutral values and are filled by the downstream pipeline.
    pub fn new(kind: OpportunityKind, chain_id: u64, path: Vec<String>, hops: Vec<Hop>) -> Self {
        Self {
            kind,
            chain_id,
            path,
            hops,
            amount_in: U256::ZERO,
            expected_out: U256::ZERO,
            gross_profit: U256::ZERO,
            spread_percent: 0.0,
            net_profit_usd: 0.0,
            gas_cost_usd: 0.0,
            min_liquidity_usd: 0.0,
            timestamp: now_unix(),
            block_number: 0,
            score: 0.0,
            tier: ScoreTier::Poor,
            recommendation: Recommendation::Evaluate,
            mev: MevAssessment::default(),
            confidence: 0.0,
            flash_loan_available: true,
            estimated_quote: false,
            rebase_window: false,
        }
    }

    /// Pair key of the first hop. Multi-hop paths key on their entry market.
    pub fn entry_pair(&self) -> Option<PairKey> {
        self.hops.first().map(|h| PairKey::new(&h.from, &h.to))
    }

    /// Cycle sanity: ends where it begins, no intermediate repeats.
    pub fn is_valid_cycle(&self) -> bool {
        if self.path.len() < 3 {
            return false;
        }
        if self.path.first() != self.path.last() {
            return false;
        }
        let inner = &self.path[..self.path.len() - 1];
        for (i, tok) in inner.iter().enumerate() {
            if inner[i + 1..].contains(tok) {
                return false;
            }
        }
        true
    }
}

/// Seconds since the unix epoch.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
